use std::sync::{Mutex, MutexGuard, OnceLock};

use sqlx::PgPool;

/// Serializes tests that read or mutate process environment variables.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn set_test_env() {
    dotenvy::dotenv().ok();

    std::env::set_var("PREPHALL_ENV", "test");
    std::env::set_var("PREPHALL_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", "test-secret");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("PROJECT_NAME");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("QUESTIONS_PER_ATTEMPT");
    std::env::remove_var("SINGLE_ATTEMPT_IN_FLIGHT");
    std::env::remove_var("TIMER_FLUSH_INTERVAL_SECONDS");
    std::env::remove_var("TIMER_FLUSH_THRESHOLD_SECONDS");
}

/// Database-backed tests opt in through PREPHALL_TEST_DATABASE_URL and are
/// skipped when it is not configured.
pub(crate) fn test_database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("PREPHALL_TEST_DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

pub(crate) async fn connect_test_db(url: &str) -> PgPool {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(url)
        .await
        .expect("connect test database");

    sqlx::migrate!("./migrations").run(&pool).await.expect("apply migrations");
    pool
}
