use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Question;
use crate::db::types::AnswerOption;

const COLUMNS: &str = "\
    id, subject_id, question_text, option_a, option_b, option_c, option_d, \
    correct_option, explanation, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_ids_by_subject(
    executor: impl sqlx::PgExecutor<'_>,
    subject_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM questions WHERE subject_id = $1")
        .bind(subject_id)
        .fetch_all(executor)
        .await
}

pub(crate) async fn count_by_subject(
    executor: impl sqlx::PgExecutor<'_>,
    subject_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE subject_id = $1")
        .bind(subject_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn list_by_subject(
    pool: &PgPool,
    subject_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE subject_id = $1 ORDER BY created_at"
    ))
    .bind(subject_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) question_text: &'a str,
    pub(crate) option_a: &'a str,
    pub(crate) option_b: &'a str,
    pub(crate) option_c: &'a str,
    pub(crate) option_d: &'a str,
    pub(crate) correct_option: AnswerOption,
    pub(crate) explanation: Option<&'a str>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, subject_id, question_text, option_a, option_b, option_c, option_d,
            correct_option, explanation, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.subject_id)
    .bind(params.question_text)
    .bind(params.option_a)
    .bind(params.option_b)
    .bind(params.option_c)
    .bind(params.option_d)
    .bind(params.correct_option)
    .bind(params.explanation)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}

pub(crate) struct UpdateQuestion<'a> {
    pub(crate) question_text: &'a str,
    pub(crate) option_a: &'a str,
    pub(crate) option_b: &'a str,
    pub(crate) option_c: &'a str,
    pub(crate) option_d: &'a str,
    pub(crate) correct_option: AnswerOption,
    pub(crate) explanation: Option<&'a str>,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateQuestion<'_>,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "UPDATE questions SET
            question_text = $1,
            option_a = $2,
            option_b = $3,
            option_c = $4,
            option_d = $5,
            correct_option = $6,
            explanation = $7,
            updated_at = $8
         WHERE id = $9
         RETURNING {COLUMNS}",
    ))
    .bind(params.question_text)
    .bind(params.option_a)
    .bind(params.option_b)
    .bind(params.option_c)
    .bind(params.option_d)
    .bind(params.correct_option)
    .bind(params.explanation)
    .bind(params.updated_at)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
