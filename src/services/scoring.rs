use crate::db::types::AnswerOption;
use crate::repositories::attempts::SnapshotQuestionRow;

/// A snapshot question with its scoring verdict attached.
#[derive(Debug)]
pub(crate) struct ScoredQuestion {
    pub(crate) row: SnapshotQuestionRow,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttemptScore {
    pub(crate) correct_count: u32,
    pub(crate) total_questions: u32,
    pub(crate) percentage: u32,
}

pub(crate) fn is_correct(selected: Option<AnswerOption>, correct: AnswerOption) -> bool {
    selected == Some(correct)
}

/// Pure function of the snapshot rows: same input, same output. An unanswered
/// question is never correct.
pub(crate) fn score_rows(rows: Vec<SnapshotQuestionRow>) -> (Vec<ScoredQuestion>, AttemptScore) {
    let total_questions = rows.len() as u32;
    let mut correct_count = 0;

    let questions: Vec<ScoredQuestion> = rows
        .into_iter()
        .map(|row| {
            let verdict = is_correct(row.selected_option, row.correct_option);
            if verdict {
                correct_count += 1;
            }
            ScoredQuestion { row, is_correct: verdict }
        })
        .collect();

    let score = AttemptScore {
        correct_count,
        total_questions,
        percentage: percentage(correct_count, total_questions),
    };

    (questions, score)
}

/// Round-half-up percentage in integer arithmetic, so 12.5 becomes 13.
pub(crate) fn percentage(correct_count: u32, total_questions: u32) -> u32 {
    if total_questions == 0 {
        return 0;
    }

    let correct = correct_count as u64;
    let total = total_questions as u64;
    ((correct * 200 + total) / (2 * total)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        order: i32,
        correct: AnswerOption,
        selected: Option<AnswerOption>,
    ) -> SnapshotQuestionRow {
        SnapshotQuestionRow {
            question_id: format!("q-{order}"),
            question_order: order,
            question_text: format!("Question {order}"),
            option_a: "a".to_string(),
            option_b: "b".to_string(),
            option_c: "c".to_string(),
            option_d: "d".to_string(),
            correct_option: correct,
            explanation: None,
            selected_option: selected,
        }
    }

    #[test]
    fn unanswered_questions_are_never_correct() {
        assert!(!is_correct(None, AnswerOption::A));
        assert!(is_correct(Some(AnswerOption::C), AnswerOption::C));
        assert!(!is_correct(Some(AnswerOption::B), AnswerOption::C));
    }

    #[test]
    fn score_counts_exact_matches_only() {
        let rows = vec![
            row(1, AnswerOption::A, Some(AnswerOption::A)),
            row(2, AnswerOption::B, Some(AnswerOption::C)),
            row(3, AnswerOption::D, None),
            row(4, AnswerOption::C, Some(AnswerOption::C)),
        ];

        let (questions, score) = score_rows(rows);

        assert_eq!(score.correct_count, 2);
        assert_eq!(score.total_questions, 4);
        assert_eq!(score.percentage, 50);
        let verdicts: Vec<bool> = questions.iter().map(|q| q.is_correct).collect();
        assert_eq!(verdicts, vec![true, false, false, true]);
    }

    #[test]
    fn scoring_is_deterministic() {
        let make = || {
            vec![
                row(1, AnswerOption::A, Some(AnswerOption::A)),
                row(2, AnswerOption::B, None),
                row(3, AnswerOption::C, Some(AnswerOption::D)),
            ]
        };

        let (_, first) = score_rows(make());
        let (_, second) = score_rows(make());
        assert_eq!(first, second);
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13); // 12.5 rounds up
        assert_eq!(percentage(27, 40), 68); // 67.5 rounds up
        assert_eq!(percentage(0, 40), 0);
        assert_eq!(percentage(40, 40), 100);
        assert_eq!(percentage(0, 0), 0);
    }
}
