use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::{require_attempt_access, CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::attempt::{
    AttemptListResponse, AttemptResponse, AttemptResultResponse, AttemptWithQuestionsResponse,
    EligibilityResponse, ExamQuestionResponse, SaveAnswerRequest, UpdateTimeRequest,
};
use crate::services::attempts::{self, StartOptions, SubmitMode};

/// Heartbeat writes allowed per flush window; two covers a periodic flush
/// racing the final flush at expiry.
const HEARTBEAT_RATE_LIMIT: u64 = 2;

#[derive(Debug, Deserialize)]
struct ListAttemptsQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_attempts))
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/answers", put(save_answer))
        .route("/:attempt_id/time", put(update_time))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/result", get(get_result))
}

/// Eligibility Gate pre-check for the subject list. Best effort only; the
/// store's partial unique index is the authoritative guard.
pub(crate) async fn check_eligibility(
    Path(subject_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<EligibilityResponse>, ApiError> {
    let subject = repositories::subjects::find_by_id(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?;
    if subject.is_none() {
        return Err(ApiError::NotFound("Subject not found".to_string()));
    }

    let can_start = attempts::can_start_attempt(state.db(), &user.id, &subject_id).await?;

    Ok(Json(EligibilityResponse { subject_id, can_start }))
}

pub(crate) async fn start_attempt(
    Path(subject_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    let exam = state.settings().exam();
    let options = StartOptions {
        questions_per_attempt: exam.questions_per_attempt,
        single_attempt_in_flight: exam.single_attempt_in_flight,
    };

    let attempt = attempts::start_attempt(state.db(), options, &user.id, &subject_id).await?;

    Ok((StatusCode::CREATED, Json(AttemptResponse::from_db(attempt))))
}

/// Resume payload. A submitted attempt is returned as-is so the client can
/// redirect to the result view instead of starting a timer.
async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptWithQuestionsResponse>, ApiError> {
    let (attempt, rows) = attempts::get_attempt_with_questions(state.db(), &attempt_id).await?;
    require_attempt_access(&user, &attempt.user_id)?;

    Ok(Json(AttemptWithQuestionsResponse {
        attempt: AttemptResponse::from_db(attempt),
        questions: rows.into_iter().map(ExamQuestionResponse::from_row).collect(),
    }))
}

async fn save_answer(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;
    require_attempt_access(&user, &attempt.user_id)?;

    attempts::save_answer(
        state.db(),
        &attempt_id,
        &payload.question_id,
        &payload.selected_option,
    )
    .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Countdown flush target. Failures here are transient from the client's
/// point of view; it keeps counting down and retries on the next interval.
async fn update_time(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateTimeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;
    require_attempt_access(&user, &attempt.user_id)?;

    let window = state.settings().exam().timer_flush_interval_seconds.max(1);
    let rate_key = format!("rl:heartbeat:{attempt_id}");
    let allowed = state
        .redis()
        .rate_limit(&rate_key, HEARTBEAT_RATE_LIMIT, window)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Heartbeat rate limit exceeded"));
    }

    attempts::persist_remaining_time(state.db(), &attempt_id, payload.seconds).await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;
    require_attempt_access(&user, &attempt.user_id)?;

    let attempt = attempts::submit_attempt(state.db(), &attempt_id, SubmitMode::Manual).await?;

    Ok(Json(AttemptResponse::from_db(attempt)))
}

async fn get_result(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResultResponse>, ApiError> {
    let result = attempts::get_result(state.db(), &attempt_id).await?;
    require_attempt_access(&user, &result.attempt.user_id)?;

    Ok(Json(AttemptResultResponse::from_result(result)))
}

/// Admin dashboard listing of all attempts, newest first.
async fn list_attempts(
    Query(query): Query<ListAttemptsQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<AttemptListResponse>, ApiError> {
    let items = repositories::attempts::list_all(state.db(), query.skip, query.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempts"))?;
    let total = repositories::attempts::count_all(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;

    Ok(Json(AttemptListResponse {
        items: items.into_iter().map(AttemptResponse::from_db).collect(),
        total,
        skip: query.skip,
        limit: query.limit,
    }))
}
