//! Server-side close-out for attempts whose countdown hit zero but whose
//! client never delivered the expiry submit (crash, lost connectivity).
//! Attempts with remaining time still on the clock are left alone so an
//! abandoned attempt stays resumable.

use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::repositories;
use crate::services::attempts::{self, SubmitMode};

pub(crate) async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick =
        interval(Duration::from_secs(state.settings().exam().expiry_sweep_interval_seconds));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = close_expired_attempts(&state).await {
                    tracing::error!(error = %err, "close_expired_attempts failed");
                }
            }
        }
    }
}

async fn close_expired_attempts(state: &AppState) -> anyhow::Result<()> {
    let expired = repositories::attempts::list_expired_ids(state.db()).await?;

    for attempt_id in expired {
        // One by one: a failure on one attempt (e.g. the unique-index guard
        // firing for a duplicate pair) must not block the rest.
        match attempts::submit_attempt(state.db(), &attempt_id, SubmitMode::Expiry).await {
            Ok(_) => tracing::info!(attempt_id, "Auto-submitted expired attempt"),
            Err(err) => {
                tracing::warn!(attempt_id, error = %err, "Failed to auto-submit expired attempt");
            }
        }
    }

    Ok(())
}
