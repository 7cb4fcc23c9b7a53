use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::Attempt;
use crate::db::types::AnswerOption;
use crate::repositories::attempts::SnapshotQuestionRow;
use crate::services::attempts::AttemptResult;
use crate::services::scoring::ScoredQuestion;

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) subject_id: String,
    pub(crate) total_questions: i32,
    pub(crate) time_remaining_seconds: i32,
    pub(crate) submitted_at: Option<String>,
    pub(crate) created_at: String,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            user_id: attempt.user_id,
            subject_id: attempt.subject_id,
            total_questions: attempt.total_questions,
            time_remaining_seconds: attempt.time_remaining_seconds,
            submitted_at: attempt.submitted_at.map(format_primitive),
            created_at: format_primitive(attempt.created_at),
        }
    }
}

/// In-progress view of a snapshot question. Deliberately omits the correct
/// option and explanation; those only ship in the review payload.
#[derive(Debug, Serialize)]
pub(crate) struct ExamQuestionResponse {
    pub(crate) question_id: String,
    pub(crate) question_order: i32,
    pub(crate) question_text: String,
    pub(crate) option_a: String,
    pub(crate) option_b: String,
    pub(crate) option_c: String,
    pub(crate) option_d: String,
    pub(crate) selected_option: Option<AnswerOption>,
}

impl ExamQuestionResponse {
    pub(crate) fn from_row(row: SnapshotQuestionRow) -> Self {
        Self {
            question_id: row.question_id,
            question_order: row.question_order,
            question_text: row.question_text,
            option_a: row.option_a,
            option_b: row.option_b,
            option_c: row.option_c,
            option_d: row.option_d,
            selected_option: row.selected_option,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptWithQuestionsResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) questions: Vec<ExamQuestionResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveAnswerRequest {
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    #[serde(alias = "selectedOption")]
    pub(crate) selected_option: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateTimeRequest {
    pub(crate) seconds: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct EligibilityResponse {
    pub(crate) subject_id: String,
    pub(crate) can_start: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewQuestionResponse {
    pub(crate) question_id: String,
    pub(crate) question_order: i32,
    pub(crate) question_text: String,
    pub(crate) option_a: String,
    pub(crate) option_b: String,
    pub(crate) option_c: String,
    pub(crate) option_d: String,
    pub(crate) selected_option: Option<AnswerOption>,
    pub(crate) correct_option: AnswerOption,
    pub(crate) is_correct: bool,
    pub(crate) explanation: Option<String>,
}

impl ReviewQuestionResponse {
    pub(crate) fn from_scored(scored: ScoredQuestion) -> Self {
        let row = scored.row;
        Self {
            question_id: row.question_id,
            question_order: row.question_order,
            question_text: row.question_text,
            option_a: row.option_a,
            option_b: row.option_b,
            option_c: row.option_c,
            option_d: row.option_d,
            selected_option: row.selected_option,
            correct_option: row.correct_option,
            is_correct: scored.is_correct,
            explanation: row.explanation,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResultResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) score: u32,
    pub(crate) correct_count: u32,
    pub(crate) total_questions: u32,
    pub(crate) questions: Vec<ReviewQuestionResponse>,
}

impl AttemptResultResponse {
    pub(crate) fn from_result(result: AttemptResult) -> Self {
        Self {
            attempt: AttemptResponse::from_db(result.attempt),
            score: result.score.percentage,
            correct_count: result.score.correct_count,
            total_questions: result.score.total_questions,
            questions: result
                .questions
                .into_iter()
                .map(ReviewQuestionResponse::from_scored)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptListResponse {
    pub(crate) items: Vec<AttemptResponse>,
    pub(crate) total: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}
