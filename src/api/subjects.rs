use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::attempts;
use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::exam::{
    QuestionResponse, QuestionsUpload, SubjectCreate, SubjectResponse, SubjectUpdate,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all_subjects).post(create_subject))
        .route(
            "/:subject_id",
            get(get_subject).patch(update_subject).delete(delete_subject),
        )
        .route("/:subject_id/eligibility", get(attempts::check_eligibility))
        .route("/:subject_id/attempts", post(attempts::start_attempt))
        .route("/:subject_id/questions", get(list_questions).post(upload_questions))
}

async fn list_all_subjects(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectResponse>>, ApiError> {
    let subjects = repositories::subjects::list_all(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subjects"))?;

    Ok(Json(subjects.into_iter().map(SubjectResponse::from_db).collect()))
}

async fn get_subject(
    Path(subject_id): Path<String>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubjectResponse>, ApiError> {
    let subject = repositories::subjects::find_by_id(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?
        .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))?;

    Ok(Json(SubjectResponse::from_db(subject)))
}

async fn create_subject(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubjectCreate>,
) -> Result<(StatusCode, Json<SubjectResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = repositories::exams::find_by_id(state.db(), &payload.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;
    if exam.is_none() {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    let now = primitive_now_utc();
    let subject = repositories::subjects::create(
        state.db(),
        repositories::subjects::CreateSubject {
            id: &Uuid::new_v4().to_string(),
            exam_id: &payload.exam_id,
            name: &payload.name,
            time_limit_minutes: payload.time_limit_minutes,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create subject"))?;

    Ok((StatusCode::CREATED, Json(SubjectResponse::from_db(subject))))
}

async fn update_subject(
    Path(subject_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubjectUpdate>,
) -> Result<Json<SubjectResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let subject = repositories::subjects::update(
        state.db(),
        &subject_id,
        repositories::subjects::UpdateSubject {
            name: payload.name,
            time_limit_minutes: payload.time_limit_minutes,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update subject"))?
    .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))?;

    Ok(Json(SubjectResponse::from_db(subject)))
}

async fn delete_subject(
    Path(subject_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::subjects::delete_by_id(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete subject"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Subject not found".to_string()))
    }
}

async fn list_questions(
    Path(subject_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let questions = repositories::questions::list_by_subject(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    Ok(Json(questions.into_iter().map(QuestionResponse::from_db).collect()))
}

/// Bulk question upload from the admin question-bank screen. The text
/// parsing happens client-side; the API receives structured questions and
/// writes them in one transaction.
async fn upload_questions(
    Path(subject_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<QuestionsUpload>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let subject = repositories::subjects::find_by_id(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?;
    if subject.is_none() {
        return Err(ApiError::NotFound("Subject not found".to_string()));
    }

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let mut created = 0usize;
    for question in &payload.questions {
        repositories::questions::create(
            &mut *tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                subject_id: &subject_id,
                question_text: &question.question_text,
                option_a: &question.option_a,
                option_b: &question.option_b,
                option_c: &question.option_c,
                option_d: &question.option_d,
                correct_option: question.correct_option,
                explanation: question.explanation.as_deref(),
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
        created += 1;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Questions uploaded successfully",
            "created": created
        })),
    ))
}
