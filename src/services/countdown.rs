//! Countdown timer for an attempt in progress.
//!
//! Two cooperating loops in one task: a one-second decrement loop that
//! derives remaining time from wall-clock deltas (so delayed ticks never
//! accumulate drift), and a periodic flush loop that persists the value
//! whenever it lags the stored one by at least the configured threshold.
//! Expiry is signalled exactly once; persistence failures are logged and
//! counted but never interrupt the countdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::repositories;

/// Destination of periodic remaining-time flushes.
#[async_trait]
pub trait RemainingTimeSink: Send + Sync {
    async fn persist_remaining(&self, attempt_id: &str, seconds: i64) -> anyhow::Result<()>;
}

/// Flushes into the attempt row; refuses once the attempt is finalized.
pub struct PgRemainingTimeSink {
    pool: PgPool,
}

impl PgRemainingTimeSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemainingTimeSink for PgRemainingTimeSink {
    async fn persist_remaining(&self, attempt_id: &str, seconds: i64) -> anyhow::Result<()> {
        let updated = repositories::attempts::update_remaining_time(
            &self.pool,
            attempt_id,
            seconds,
            primitive_now_utc(),
        )
        .await?;

        if !updated {
            anyhow::bail!("attempt {attempt_id} is submitted or missing");
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CountdownConfig {
    pub tick: Duration,
    pub flush_interval: Duration,
    pub flush_threshold_seconds: i64,
}

impl CountdownConfig {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            tick: Duration::from_secs(1),
            flush_interval: Duration::from_secs(settings.exam().timer_flush_interval_seconds),
            flush_threshold_seconds: settings.exam().timer_flush_threshold_seconds as i64,
        }
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            flush_interval: Duration::from_secs(5),
            flush_threshold_seconds: 5,
        }
    }
}

/// Handle to a running countdown. [`Countdown::stop`] cancels both loops;
/// dropping the handle cancels them as well, since the cancel channel
/// closes.
pub struct Countdown {
    remaining: watch::Receiver<i64>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Countdown {
    /// Starts the countdown in state `Running`. `on_expiry` is invoked
    /// exactly once, when remaining time reaches zero; it is never invoked
    /// after `stop`. Callers must not start a countdown for a submitted
    /// attempt.
    pub fn spawn<F>(
        attempt_id: String,
        initial_seconds: i64,
        config: CountdownConfig,
        sink: Arc<dyn RemainingTimeSink>,
        on_expiry: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let initial_seconds = initial_seconds.max(0);
        let (remaining_tx, remaining_rx) = watch::channel(initial_seconds);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = tokio::spawn(run_countdown(
            attempt_id,
            initial_seconds,
            config,
            sink,
            remaining_tx,
            cancel_rx,
            Box::new(on_expiry),
        ));

        Self { remaining: remaining_rx, cancel: cancel_tx, task }
    }

    pub fn remaining_seconds(&self) -> i64 {
        *self.remaining.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the decrement and flush loops. No writes happen after this
    /// returns.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.task.await;
    }
}

async fn run_countdown(
    attempt_id: String,
    initial_seconds: i64,
    config: CountdownConfig,
    sink: Arc<dyn RemainingTimeSink>,
    remaining_tx: watch::Sender<i64>,
    mut cancel_rx: watch::Receiver<bool>,
    on_expiry: Box<dyn FnOnce() + Send>,
) {
    let started = Instant::now();
    let mut tick = interval(config.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flush_tick = interval(config.flush_interval);
    flush_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_flushed = initial_seconds;
    let mut on_expiry = Some(on_expiry);

    loop {
        tokio::select! {
            biased;

            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    break;
                }
            }

            _ = tick.tick() => {
                let remaining = remaining_now(started, initial_seconds);
                let _ = remaining_tx.send(remaining);

                if remaining == 0 {
                    if last_flushed != 0 {
                        flush(&*sink, &attempt_id, 0, &mut last_flushed).await;
                    }
                    if let Some(hook) = on_expiry.take() {
                        hook();
                    }
                    break;
                }
            }

            _ = flush_tick.tick() => {
                let remaining = remaining_now(started, initial_seconds);
                if last_flushed - remaining >= config.flush_threshold_seconds {
                    flush(&*sink, &attempt_id, remaining, &mut last_flushed).await;
                }
            }
        }
    }
}

fn remaining_now(started: Instant, initial_seconds: i64) -> i64 {
    (initial_seconds - started.elapsed().as_secs() as i64).max(0)
}

async fn flush(
    sink: &dyn RemainingTimeSink,
    attempt_id: &str,
    remaining: i64,
    last_flushed: &mut i64,
) {
    match sink.persist_remaining(attempt_id, remaining).await {
        Ok(()) => *last_flushed = remaining,
        Err(err) => {
            // Transient by contract: the countdown continues and the store
            // resumes at most one flush interval behind.
            metrics::counter!("timer_flush_failures_total").increment(1);
            tracing::warn!(attempt_id, remaining, error = %err, "Failed to persist remaining time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::advance;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<i64>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self { calls: Mutex::new(Vec::new()), fail: true }
        }

        fn values(&self) -> Vec<i64> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemainingTimeSink for RecordingSink {
        async fn persist_remaining(&self, _attempt_id: &str, seconds: i64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(seconds);
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(())
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_secs(secs: u64) {
        for _ in 0..secs {
            advance(Duration::from_secs(1)).await;
            settle().await;
        }
    }

    fn expiry_counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = {
            let fired = fired.clone();
            move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        };
        (fired, hook)
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_time_is_monotonic_and_reaches_zero() {
        let sink = Arc::new(RecordingSink::default());
        let (fired, hook) = expiry_counter();
        let countdown = Countdown::spawn(
            "attempt-1".to_string(),
            5,
            CountdownConfig::default(),
            sink,
            hook,
        );
        settle().await;

        let mut observed = vec![countdown.remaining_seconds()];
        for _ in 0..6 {
            advance_secs(1).await;
            observed.push(countdown.remaining_seconds());
        }

        for pair in observed.windows(2) {
            assert!(pair[1] <= pair[0], "remaining increased: {observed:?}");
        }
        assert!(observed.iter().all(|seconds| *seconds >= 0));
        assert_eq!(*observed.last().unwrap(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_fires_exactly_once_and_flushes_zero() {
        let sink = Arc::new(RecordingSink::default());
        let (fired, hook) = expiry_counter();
        let countdown = Countdown::spawn(
            "attempt-2".to_string(),
            3,
            CountdownConfig::default(),
            sink.clone(),
            hook,
        );
        settle().await;

        advance_secs(10).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(countdown.is_finished());
        assert_eq!(sink.values().last(), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_only_when_threshold_is_reached() {
        let sink = Arc::new(RecordingSink::default());
        let (_fired, hook) = expiry_counter();
        let countdown = Countdown::spawn(
            "attempt-3".to_string(),
            60,
            CountdownConfig::default(),
            sink.clone(),
            hook,
        );
        settle().await;

        // Flush checks run at 5s intervals; each should see a >= 5s delta.
        advance_secs(12).await;
        let values = sink.values();
        assert!(!values.is_empty(), "expected at least one flush");
        let mut previous = 60;
        for value in &values {
            assert!(previous - value >= 5, "flushed {value} after {previous}");
            previous = *value;
        }

        countdown.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failures_do_not_stop_the_countdown() {
        let sink = Arc::new(RecordingSink::failing());
        let (fired, hook) = expiry_counter();
        let countdown = Countdown::spawn(
            "attempt-4".to_string(),
            8,
            CountdownConfig::default(),
            sink.clone(),
            hook,
        );
        settle().await;

        advance_secs(12).await;

        assert!(countdown.is_finished());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!sink.values().is_empty(), "flushes were attempted");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_both_loops_without_expiry() {
        let sink = Arc::new(RecordingSink::default());
        let (fired, hook) = expiry_counter();
        let countdown = Countdown::spawn(
            "attempt-5".to_string(),
            120,
            CountdownConfig::default(),
            sink.clone(),
            hook,
        );
        settle().await;

        advance_secs(7).await;
        countdown.stop().await;
        let flushes_at_stop = sink.values().len();

        advance_secs(30).await;

        assert_eq!(sink.values().len(), flushes_at_stop, "no writes after cancellation");
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_initial_seconds_expires_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let (fired, hook) = expiry_counter();
        let countdown = Countdown::spawn(
            "attempt-6".to_string(),
            0,
            CountdownConfig::default(),
            sink,
            hook,
        );

        settle().await;
        advance_secs(1).await;

        assert!(countdown.is_finished());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
