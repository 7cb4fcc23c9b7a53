use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Exam, Question, Subject};
use crate::db::types::AnswerOption;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, max = 255))]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) created_at: String,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam) -> Self {
        Self {
            id: exam.id,
            name: exam.name,
            description: exam.description,
            created_at: format_primitive(exam.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubjectCreate {
    #[serde(alias = "examId")]
    pub(crate) exam_id: String,
    #[validate(length(min = 1, max = 255))]
    pub(crate) name: String,
    #[serde(alias = "timeLimitMinutes")]
    #[validate(range(min = 1, max = 600, message = "must be between 1 and 600 minutes"))]
    pub(crate) time_limit_minutes: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubjectUpdate {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    #[serde(alias = "timeLimitMinutes")]
    #[validate(range(min = 1, max = 600, message = "must be between 1 and 600 minutes"))]
    pub(crate) time_limit_minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubjectResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) name: String,
    pub(crate) time_limit_minutes: i32,
    pub(crate) created_at: String,
}

impl SubjectResponse {
    pub(crate) fn from_db(subject: Subject) -> Self {
        Self {
            id: subject.id,
            exam_id: subject.exam_id,
            name: subject.name,
            time_limit_minutes: subject.time_limit_minutes,
            created_at: format_primitive(subject.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[validate(length(min = 1))]
    pub(crate) question_text: String,
    #[validate(length(min = 1))]
    pub(crate) option_a: String,
    #[validate(length(min = 1))]
    pub(crate) option_b: String,
    #[validate(length(min = 1))]
    pub(crate) option_c: String,
    #[validate(length(min = 1))]
    pub(crate) option_d: String,
    pub(crate) correct_option: AnswerOption,
    #[serde(default)]
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionsUpload {
    #[validate(length(min = 1, message = "at least one question is required"), nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

/// Full replace, matching the admin edit form which always sends every
/// field.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionUpdate {
    #[validate(length(min = 1))]
    pub(crate) question_text: String,
    #[validate(length(min = 1))]
    pub(crate) option_a: String,
    #[validate(length(min = 1))]
    pub(crate) option_b: String,
    #[validate(length(min = 1))]
    pub(crate) option_c: String,
    #[validate(length(min = 1))]
    pub(crate) option_d: String,
    pub(crate) correct_option: AnswerOption,
    #[serde(default)]
    pub(crate) explanation: Option<String>,
}

/// Admin view of a question; includes the correct option and explanation.
/// The exam-taking payload lives in `schemas::attempt` and withholds both.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) subject_id: String,
    pub(crate) question_text: String,
    pub(crate) option_a: String,
    pub(crate) option_b: String,
    pub(crate) option_c: String,
    pub(crate) option_d: String,
    pub(crate) correct_option: AnswerOption,
    pub(crate) explanation: Option<String>,
    pub(crate) created_at: String,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            subject_id: question.subject_id,
            question_text: question.question_text,
            option_a: question.option_a,
            option_b: question.option_b,
            option_c: question.option_c,
            option_d: question.option_d,
            correct_option: question.correct_option,
            explanation: question.explanation,
            created_at: format_primitive(question.created_at),
        }
    }
}
