use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::db::types::AnswerOption;

const COLUMNS: &str = "\
    id, user_id, subject_id, total_questions, time_remaining_seconds, \
    submitted_at, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

/// The eligibility predicate: only *submitted* attempts count.
pub(crate) async fn has_submitted_for_subject(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    subject_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM attempts
            WHERE user_id = $1 AND subject_id = $2 AND submitted_at IS NOT NULL
        )",
    )
    .bind(user_id)
    .bind(subject_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_in_flight(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    subject_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE user_id = $1 AND subject_id = $2 AND submitted_at IS NULL
         ORDER BY created_at DESC
         LIMIT 1"
    ))
    .bind(user_id)
    .bind(subject_id)
    .fetch_optional(executor)
    .await
}

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) total_questions: i32,
    pub(crate) time_remaining_seconds: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttempt<'_>,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO attempts (
            id, user_id, subject_id, total_questions, time_remaining_seconds,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.subject_id)
    .bind(params.total_questions)
    .bind(params.time_remaining_seconds)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}

pub(crate) struct SnapshotEntry<'a> {
    pub(crate) id: String,
    pub(crate) question_id: &'a str,
    pub(crate) question_order: i32,
}

/// Inserts the full ordered snapshot in one statement; run inside the same
/// transaction as the attempt insert so a failure leaves nothing behind.
pub(crate) async fn insert_snapshot(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    entries: &[SnapshotEntry<'_>],
) -> Result<(), sqlx::Error> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO attempt_questions (id, attempt_id, question_id, question_order) ",
    );
    builder.push_values(entries, |mut row, entry| {
        row.push_bind(entry.id.as_str())
            .push_bind(attempt_id)
            .push_bind(entry.question_id)
            .push_bind(entry.question_order);
    });

    builder.build().execute(executor).await?;
    Ok(())
}

pub(crate) async fn snapshot_contains(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM attempt_questions WHERE attempt_id = $1 AND question_id = $2
        )",
    )
    .bind(attempt_id)
    .bind(question_id)
    .fetch_one(executor)
    .await
}

/// Snapshot question joined with its current bank row and the student's
/// answer, in presentation order. Feeds both the resume and the result path.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SnapshotQuestionRow {
    pub(crate) question_id: String,
    pub(crate) question_order: i32,
    pub(crate) question_text: String,
    pub(crate) option_a: String,
    pub(crate) option_b: String,
    pub(crate) option_c: String,
    pub(crate) option_d: String,
    pub(crate) correct_option: AnswerOption,
    pub(crate) explanation: Option<String>,
    pub(crate) selected_option: Option<AnswerOption>,
}

pub(crate) async fn list_snapshot_with_answers(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<SnapshotQuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, SnapshotQuestionRow>(
        "SELECT aq.question_id,
                aq.question_order,
                q.question_text,
                q.option_a,
                q.option_b,
                q.option_c,
                q.option_d,
                q.correct_option,
                q.explanation,
                a.selected_option
         FROM attempt_questions aq
         JOIN questions q ON q.id = aq.question_id
         LEFT JOIN answers a
           ON a.attempt_id = aq.attempt_id AND a.question_id = aq.question_id
         WHERE aq.attempt_id = $1
         ORDER BY aq.question_order",
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

/// Clamped flush target for the countdown: the stored value never increases
/// and never goes negative, and a finalized attempt is never touched.
pub(crate) async fn update_remaining_time(
    pool: &PgPool,
    id: &str,
    seconds: i64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts
         SET time_remaining_seconds = LEAST(time_remaining_seconds, GREATEST($1, 0)::int),
             updated_at = $2
         WHERE id = $3 AND submitted_at IS NULL",
    )
    .bind(seconds)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Finalizes the attempt; a second call matches zero rows and the original
/// timestamp survives.
pub(crate) async fn mark_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET submitted_at = $1, updated_at = $1
         WHERE id = $2 AND submitted_at IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_all(
    pool: &PgPool,
    skip: i64,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts ORDER BY created_at DESC OFFSET $1 LIMIT $2"
    ))
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_all(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM attempts").fetch_one(pool).await
}

/// Attempts whose persisted countdown hit zero but were never finalized;
/// the sweeper submits them one by one.
pub(crate) async fn list_expired_ids(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM attempts WHERE submitted_at IS NULL AND time_remaining_seconds = 0",
    )
    .fetch_all(pool)
    .await
}
