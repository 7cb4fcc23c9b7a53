//! Attempt lifecycle: eligibility, generation, answers, submission, scoring.

use std::str::FromStr;

use rand::thread_rng;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::Attempt;
use crate::db::types::AnswerOption;
use crate::repositories;
use crate::repositories::attempts::{CreateAttempt, SnapshotEntry, SnapshotQuestionRow};
use crate::services::sampling;
use crate::services::scoring::{self, AttemptScore, ScoredQuestion};

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("a submitted attempt already exists for this subject")]
    AlreadyAttempted,
    #[error("subject has {available} questions but {required} are required")]
    InsufficientQuestions { available: usize, required: usize },
    #[error("invalid answer option: {0}")]
    InvalidOption(String),
    #[error("attempt has already been submitted")]
    AttemptAlreadySubmitted,
    #[error("question does not belong to this attempt")]
    QuestionNotInAttempt,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StartOptions {
    pub(crate) questions_per_attempt: u32,
    pub(crate) single_attempt_in_flight: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum SubmitMode {
    Manual,
    Expiry,
}

impl SubmitMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Expiry => "expiry",
        }
    }
}

/// The Eligibility Gate: pure read, true iff the user has no submitted
/// attempt for the subject. Unsubmitted attempts do not count.
pub(crate) async fn can_start_attempt(
    pool: &PgPool,
    user_id: &str,
    subject_id: &str,
) -> Result<bool, AttemptError> {
    let attempted =
        repositories::attempts::has_submitted_for_subject(pool, user_id, subject_id).await?;
    Ok(!attempted)
}

/// Generates a new attempt: re-checks eligibility, samples the question
/// quota without replacement, seeds the countdown from the subject's time
/// limit, and writes the attempt plus its ordered snapshot in one
/// transaction so a partial snapshot is never visible.
pub(crate) async fn start_attempt(
    pool: &PgPool,
    options: StartOptions,
    user_id: &str,
    subject_id: &str,
) -> Result<Attempt, AttemptError> {
    if repositories::attempts::has_submitted_for_subject(pool, user_id, subject_id).await? {
        return Err(AttemptError::AlreadyAttempted);
    }

    if options.single_attempt_in_flight {
        if let Some(existing) =
            repositories::attempts::find_in_flight(pool, user_id, subject_id).await?
        {
            tracing::debug!(attempt_id = %existing.id, "Resuming attempt already in flight");
            return Ok(existing);
        }
    }

    let time_limit_minutes = repositories::subjects::find_time_limit_minutes(pool, subject_id)
        .await?
        .ok_or(AttemptError::NotFound("Subject"))?;

    let question_ids = repositories::questions::list_ids_by_subject(pool, subject_id).await?;
    let required = options.questions_per_attempt as usize;
    if question_ids.len() < required {
        return Err(AttemptError::InsufficientQuestions {
            available: question_ids.len(),
            required,
        });
    }

    let sampled = sampling::sample_distinct(question_ids, required, &mut thread_rng());

    let now = primitive_now_utc();
    let attempt_id = Uuid::new_v4().to_string();
    let entries: Vec<SnapshotEntry<'_>> = sampled
        .iter()
        .enumerate()
        .map(|(index, question_id)| SnapshotEntry {
            id: Uuid::new_v4().to_string(),
            question_id: question_id.as_str(),
            question_order: index as i32 + 1,
        })
        .collect();

    let mut tx = pool.begin().await?;
    let attempt = repositories::attempts::create(
        &mut *tx,
        CreateAttempt {
            id: &attempt_id,
            user_id,
            subject_id,
            total_questions: required as i32,
            time_remaining_seconds: time_limit_minutes * 60,
            created_at: now,
            updated_at: now,
        },
    )
    .await?;
    repositories::attempts::insert_snapshot(&mut *tx, &attempt.id, &entries).await?;
    tx.commit().await?;

    metrics::counter!("attempts_started_total").increment(1);
    tracing::info!(attempt_id = %attempt.id, subject_id, "Attempt started");

    Ok(attempt)
}

/// Answer Ledger write: validates the option, refuses writes against a
/// finalized attempt or a question outside the snapshot, then upserts.
pub(crate) async fn save_answer(
    pool: &PgPool,
    attempt_id: &str,
    question_id: &str,
    option: &str,
) -> Result<(), AttemptError> {
    let selected = AnswerOption::from_str(option)
        .map_err(|invalid| AttemptError::InvalidOption(invalid.0))?;

    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt"))?;
    if attempt.is_submitted() {
        return Err(AttemptError::AttemptAlreadySubmitted);
    }

    if !repositories::attempts::snapshot_contains(pool, attempt_id, question_id).await? {
        return Err(AttemptError::QuestionNotInAttempt);
    }

    repositories::answers::upsert(
        pool,
        repositories::answers::UpsertAnswer {
            id: &Uuid::new_v4().to_string(),
            attempt_id,
            question_id,
            selected_option: selected,
            now: primitive_now_utc(),
        },
    )
    .await?;

    Ok(())
}

/// Timer flush target. The stored value is clamped so it never increases.
pub(crate) async fn persist_remaining_time(
    pool: &PgPool,
    attempt_id: &str,
    seconds: i64,
) -> Result<(), AttemptError> {
    let updated = repositories::attempts::update_remaining_time(
        pool,
        attempt_id,
        seconds,
        primitive_now_utc(),
    )
    .await?;

    if updated {
        return Ok(());
    }

    match repositories::attempts::find_by_id(pool, attempt_id).await? {
        Some(_) => Err(AttemptError::AttemptAlreadySubmitted),
        None => Err(AttemptError::NotFound("Attempt")),
    }
}

/// Finalizes the attempt. A repeat call is a no-op that leaves the original
/// timestamp untouched, which also deduplicates a manual submit racing the
/// timer's expiry submit.
pub(crate) async fn submit_attempt(
    pool: &PgPool,
    attempt_id: &str,
    mode: SubmitMode,
) -> Result<Attempt, AttemptError> {
    let now = primitive_now_utc();
    let updated = match repositories::attempts::mark_submitted(pool, attempt_id, now).await {
        Ok(updated) => updated,
        // The partial unique index rejects a second submitted attempt for
        // the same (user, subject) pair.
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(AttemptError::AlreadyAttempted);
        }
        Err(err) => return Err(err.into()),
    };

    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt"))?;

    if updated {
        metrics::counter!("attempts_submitted_total", "mode" => mode.as_str()).increment(1);
        tracing::info!(attempt_id, mode = mode.as_str(), "Attempt submitted");
    } else {
        tracing::debug!(attempt_id, "Attempt already submitted; submit is a no-op");
    }

    Ok(attempt)
}

/// Resume payload: the attempt plus its snapshot questions in ordinal order
/// with the student's current selections.
pub(crate) async fn get_attempt_with_questions(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<(Attempt, Vec<SnapshotQuestionRow>), AttemptError> {
    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt"))?;
    let rows = repositories::attempts::list_snapshot_with_answers(pool, attempt_id).await?;
    Ok((attempt, rows))
}

pub(crate) struct AttemptResult {
    pub(crate) attempt: Attempt,
    pub(crate) questions: Vec<ScoredQuestion>,
    pub(crate) score: AttemptScore,
}

/// Scoring Engine read path: recomputed on demand from persisted state
/// only, so repeated calls with unchanged rows return identical results.
pub(crate) async fn get_result(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<AttemptResult, AttemptError> {
    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt"))?;
    let rows = repositories::attempts::list_snapshot_with_answers(pool, attempt_id).await?;
    let (questions, score) = scoring::score_rows(rows);

    Ok(AttemptResult { attempt, questions, score })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use sqlx::PgPool;
    use uuid::Uuid;

    use super::*;
    use crate::db::types::UserRole;
    use crate::services::countdown::{PgRemainingTimeSink, RemainingTimeSink};
    use crate::test_support;

    const OPTIONS: StartOptions =
        StartOptions { questions_per_attempt: 40, single_attempt_in_flight: false };

    async fn seed_subject(pool: &PgPool, question_count: usize) -> (String, String) {
        let now = primitive_now_utc();
        let user_id = Uuid::new_v4().to_string();
        repositories::users::create(
            pool,
            repositories::users::CreateUser {
                id: &user_id,
                email: &format!("{user_id}@example.com"),
                hashed_password: "not-a-real-hash".to_string(),
                full_name: "Test Student",
                role: UserRole::Student,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .expect("insert user");

        let exam = repositories::exams::create(
            pool,
            repositories::exams::CreateExam {
                id: &Uuid::new_v4().to_string(),
                name: &format!("Exam {user_id}"),
                description: None,
                created_by: &user_id,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .expect("insert exam");

        let subject = repositories::subjects::create(
            pool,
            repositories::subjects::CreateSubject {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam.id,
                name: "Mathematics",
                time_limit_minutes: 60,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .expect("insert subject");

        for index in 0..question_count {
            repositories::questions::create(
                pool,
                repositories::questions::CreateQuestion {
                    id: &Uuid::new_v4().to_string(),
                    subject_id: &subject.id,
                    question_text: &format!("Question {index}"),
                    option_a: "Option A",
                    option_b: "Option B",
                    option_c: "Option C",
                    option_d: "Option D",
                    correct_option: AnswerOption::C,
                    explanation: None,
                    created_at: now,
                    updated_at: now,
                },
            )
            .await
            .expect("insert question");
        }

        (user_id, subject.id)
    }

    #[tokio::test]
    async fn attempt_lifecycle_end_to_end() {
        let Some(url) = test_support::test_database_url() else {
            eprintln!("skipping: PREPHALL_TEST_DATABASE_URL not set");
            return;
        };
        let pool = test_support::connect_test_db(&url).await;
        let (user_id, subject_id) = seed_subject(&pool, 50).await;

        let attempt = start_attempt(&pool, OPTIONS, &user_id, &subject_id).await.expect("start");
        assert_eq!(attempt.total_questions, 40);
        assert_eq!(attempt.time_remaining_seconds, 3600);
        assert!(attempt.submitted_at.is_none());

        let (_, rows) =
            get_attempt_with_questions(&pool, &attempt.id).await.expect("resume payload");
        assert_eq!(rows.len(), 40);
        let ordinals: Vec<i32> = rows.iter().map(|row| row.question_order).collect();
        assert_eq!(ordinals, (1..=40).collect::<Vec<i32>>());
        let distinct: HashSet<&str> = rows.iter().map(|row| row.question_id.as_str()).collect();
        assert_eq!(distinct.len(), 40);

        // Last write wins for the same question.
        let first_question = rows[0].question_id.clone();
        save_answer(&pool, &attempt.id, &first_question, "B").await.expect("save B");
        save_answer(&pool, &attempt.id, &first_question, "C").await.expect("save C");
        let answers =
            repositories::answers::list_by_attempt(&pool, &attempt.id).await.expect("answers");
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].selected_option, AnswerOption::C);

        let err = save_answer(&pool, &attempt.id, &first_question, "E").await.unwrap_err();
        assert!(matches!(err, AttemptError::InvalidOption(_)));

        let stray_question = Uuid::new_v4().to_string();
        let err = save_answer(&pool, &attempt.id, &stray_question, "A").await.unwrap_err();
        assert!(matches!(err, AttemptError::QuestionNotInAttempt));

        // The stored countdown only ever moves down.
        persist_remaining_time(&pool, &attempt.id, 3000).await.expect("flush");
        persist_remaining_time(&pool, &attempt.id, 3500).await.expect("stale flush");
        let current =
            repositories::attempts::fetch_one_by_id(&pool, &attempt.id).await.expect("fetch");
        assert_eq!(current.time_remaining_seconds, 3000);

        // The countdown's store binding goes through the same clamped path.
        let sink = PgRemainingTimeSink::new(pool.clone());
        sink.persist_remaining(&attempt.id, 2990).await.expect("sink flush");
        let current =
            repositories::attempts::fetch_one_by_id(&pool, &attempt.id).await.expect("fetch");
        assert_eq!(current.time_remaining_seconds, 2990);

        let submitted =
            submit_attempt(&pool, &attempt.id, SubmitMode::Manual).await.expect("submit");
        let stamp = submitted.submitted_at.expect("submitted_at set");
        let again =
            submit_attempt(&pool, &attempt.id, SubmitMode::Manual).await.expect("second submit");
        assert_eq!(again.submitted_at, Some(stamp), "repeat submit must not move the timestamp");

        let err = save_answer(&pool, &attempt.id, &first_question, "A").await.unwrap_err();
        assert!(matches!(err, AttemptError::AttemptAlreadySubmitted));
        let err = persist_remaining_time(&pool, &attempt.id, 100).await.unwrap_err();
        assert!(matches!(err, AttemptError::AttemptAlreadySubmitted));
        assert!(
            sink.persist_remaining(&attempt.id, 50).await.is_err(),
            "sink refuses a finalized attempt"
        );
        let answers =
            repositories::answers::list_by_attempt(&pool, &attempt.id).await.expect("answers");
        assert_eq!(answers[0].selected_option, AnswerOption::C, "rejected write left no trace");

        let result = get_result(&pool, &attempt.id).await.expect("result");
        assert_eq!(result.score.total_questions, 40);
        let scored_first = result
            .questions
            .iter()
            .find(|question| question.row.question_id == first_question)
            .expect("first question in result");
        assert_eq!(scored_first.row.selected_option, Some(AnswerOption::C));
        assert_eq!(
            scored_first.is_correct,
            scored_first.row.correct_option == AnswerOption::C
        );
        let recomputed = result.questions.iter().filter(|question| question.is_correct).count();
        assert_eq!(result.score.correct_count, recomputed as u32);

        let result_again = get_result(&pool, &attempt.id).await.expect("result again");
        assert_eq!(result_again.score, result.score);

        assert!(!can_start_attempt(&pool, &user_id, &subject_id).await.expect("gate"));
        let err = start_attempt(&pool, OPTIONS, &user_id, &subject_id).await.unwrap_err();
        assert!(matches!(err, AttemptError::AlreadyAttempted));
    }

    #[tokio::test]
    async fn insufficient_questions_blocks_and_writes_nothing() {
        let Some(url) = test_support::test_database_url() else {
            eprintln!("skipping: PREPHALL_TEST_DATABASE_URL not set");
            return;
        };
        let pool = test_support::connect_test_db(&url).await;
        let (user_id, subject_id) = seed_subject(&pool, 39).await;

        let err = start_attempt(&pool, OPTIONS, &user_id, &subject_id).await.unwrap_err();
        assert!(matches!(
            err,
            AttemptError::InsufficientQuestions { available: 39, required: 40 }
        ));

        let leftover = repositories::attempts::find_in_flight(&pool, &user_id, &subject_id)
            .await
            .expect("query attempts");
        assert!(leftover.is_none(), "no attempt row may exist after a failed start");
    }

    #[tokio::test]
    async fn unsubmitted_attempt_does_not_block_a_new_one() {
        let Some(url) = test_support::test_database_url() else {
            eprintln!("skipping: PREPHALL_TEST_DATABASE_URL not set");
            return;
        };
        let pool = test_support::connect_test_db(&url).await;
        let (user_id, subject_id) = seed_subject(&pool, 40).await;

        let first = start_attempt(&pool, OPTIONS, &user_id, &subject_id).await.expect("first");
        assert!(can_start_attempt(&pool, &user_id, &subject_id).await.expect("gate"));

        let second = start_attempt(&pool, OPTIONS, &user_id, &subject_id).await.expect("second");
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn single_in_flight_mode_resumes_the_open_attempt() {
        let Some(url) = test_support::test_database_url() else {
            eprintln!("skipping: PREPHALL_TEST_DATABASE_URL not set");
            return;
        };
        let pool = test_support::connect_test_db(&url).await;
        let (user_id, subject_id) = seed_subject(&pool, 40).await;

        let options =
            StartOptions { questions_per_attempt: 40, single_attempt_in_flight: true };
        let first = start_attempt(&pool, options, &user_id, &subject_id).await.expect("first");
        let second = start_attempt(&pool, options, &user_id, &subject_id).await.expect("second");
        assert_eq!(first.id, second.id, "single-in-flight mode returns the open attempt");
    }
}
