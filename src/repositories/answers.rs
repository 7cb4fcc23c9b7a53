use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Answer;
use crate::db::types::AnswerOption;

const COLUMNS: &str = "id, attempt_id, question_id, selected_option, created_at, updated_at";

pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) selected_option: AnswerOption,
    pub(crate) now: PrimitiveDateTime,
}

/// Single-statement upsert keyed by (attempt, question): at most one row per
/// pair, last write wins. No read-then-write window.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    params: UpsertAnswer<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO answers (id, attempt_id, question_id, selected_option, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$5)
         ON CONFLICT (attempt_id, question_id)
         DO UPDATE SET selected_option = EXCLUDED.selected_option,
                       updated_at = EXCLUDED.updated_at",
    )
    .bind(params.id)
    .bind(params.attempt_id)
    .bind(params.question_id)
    .bind(params.selected_option)
    .bind(params.now)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!("SELECT {COLUMNS} FROM answers WHERE attempt_id = $1"))
        .bind(attempt_id)
        .fetch_all(pool)
        .await
}
