use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DrillError, Result};
use crate::stimulus::StimulusPool;

/// What the test-taker produced for one stimulus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Response {
    Choice(usize),
    Story(String),
}

impl Response {
    pub fn as_story(&self) -> Option<&str> {
        match self {
            Response::Story(text) => Some(text),
            Response::Choice(_) => None,
        }
    }

    /// Stories must carry text when submitted by hand
    pub fn validate_submission(&self) -> Result<()> {
        match self {
            Response::Story(text) if text.trim().is_empty() => Err(DrillError::EmptyResponse),
            _ => Ok(()),
        }
    }
}

/// Responses keyed by stimulus id. Recording twice overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSheet {
    responses: HashMap<String, Response>,
}

impl ResponseSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `response`, returning whatever it replaced
    pub fn record<S: Into<String>>(&mut self, stimulus_id: S, response: Response) -> Option<Response> {
        self.responses.insert(stimulus_id.into(), response)
    }

    pub fn clear(&mut self, stimulus_id: &str) -> Option<Response> {
        self.responses.remove(stimulus_id)
    }

    pub fn get(&self, stimulus_id: &str) -> Option<&Response> {
        self.responses.get(stimulus_id)
    }

    pub fn is_answered(&self, stimulus_id: &str) -> bool {
        self.responses.contains_key(stimulus_id)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// Correct option per question id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerKey(HashMap<String, usize>);

impl AnswerKey {
    pub fn from_pool(pool: &StimulusPool) -> Self {
        Self(
            pool.iter()
                .filter_map(|s| s.as_question().map(|q| (q.id.clone(), q.correct_option_index)))
                .collect(),
        )
    }

    pub fn get(&self, stimulus_id: &str) -> Option<usize> {
        self.0.get(stimulus_id).copied()
    }
}

/// Unanswered is its own outcome, distinct from a wrong answer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionOutcome {
    Correct,
    Incorrect,
    Unanswered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub stimulus_id: String,
    pub selected: Option<usize>,
    pub correct_answer: usize,
    pub outcome: QuestionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub unanswered_count: usize,
    pub total_count: usize,
    pub percentage: u32,
    pub breakdown: Vec<QuestionResult>,
}

pub fn percentage(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * correct as f64 / total as f64).round() as u32
}

/// Score every stimulus in `pool` that has an entry in `key`, in pool order.
/// Unanswered items count against the percentage.
pub fn score(pool: &StimulusPool, responses: &ResponseSheet, key: &AnswerKey) -> Score {
    let breakdown: Vec<QuestionResult> = pool
        .iter()
        .filter_map(|s| key.get(s.id()).map(|correct| (s.id(), correct)))
        .map(|(id, correct)| {
            let selected = match responses.get(id) {
                Some(Response::Choice(i)) => Some(*i),
                _ => None,
            };
            let outcome = match (responses.get(id), selected) {
                (None, _) => QuestionOutcome::Unanswered,
                (Some(_), Some(i)) if i == correct => QuestionOutcome::Correct,
                (Some(_), _) => QuestionOutcome::Incorrect,
            };
            QuestionResult {
                stimulus_id: id.to_string(),
                selected,
                correct_answer: correct,
                outcome,
            }
        })
        .collect();

    let count = |o: QuestionOutcome| breakdown.iter().filter(|r| r.outcome == o).count();
    let correct_count = count(QuestionOutcome::Correct);
    let total_count = breakdown.len();

    Score {
        correct_count,
        incorrect_count: count(QuestionOutcome::Incorrect),
        unanswered_count: count(QuestionOutcome::Unanswered),
        total_count,
        percentage: percentage(correct_count, total_count),
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::TestKind;
    use crate::stimulus::{Question, Stimulus};
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn question(id: &str, correct: usize) -> Stimulus {
        Stimulus::question(Question {
            id: id.into(),
            image_ref: None,
            text: Some(format!("question {id}")),
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option_index: correct,
        })
    }

    fn quiz(answers: &[usize]) -> StimulusPool {
        let stimuli = answers
            .iter()
            .enumerate()
            .map(|(i, &c)| question(&format!("q{i}"), c))
            .collect();
        StimulusPool::new(TestKind::Oir, stimuli).unwrap()
    }

    #[test]
    fn recording_overwrites() {
        let mut sheet = ResponseSheet::new();
        assert_eq!(sheet.record("q0", Response::Choice(1)), None);
        assert_eq!(sheet.record("q0", Response::Choice(3)), Some(Response::Choice(1)));
        sheet.record("q0", Response::Choice(2));

        assert_eq!(sheet.len(), 1);
        assert_eq!(sheet.get("q0"), Some(&Response::Choice(2)));
    }

    #[test]
    fn unanswered_is_separate_from_incorrect() {
        let pool = quiz(&[1, 0, 2, 3]);
        let mut sheet = ResponseSheet::new();
        sheet.record("q0", Response::Choice(1));
        sheet.record("q1", Response::Choice(3));

        let score = score(&pool, &sheet, &AnswerKey::from_pool(&pool));
        assert_eq!(score.correct_count, 1);
        assert_eq!(score.incorrect_count, 1);
        assert_eq!(score.unanswered_count, 2);
        assert_eq!(score.total_count, 4);
        assert_eq!(score.percentage, 25);
        assert_eq!(score.breakdown[2].outcome, QuestionOutcome::Unanswered);
        assert_eq!(score.breakdown[1].selected, Some(3));
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn story_instead_of_choice_is_incorrect() {
        let pool = quiz(&[0]);
        let mut sheet = ResponseSheet::new();
        sheet.record("q0", Response::Story("a".into()));
        let score = score(&pool, &sheet, &AnswerKey::from_pool(&pool));
        assert_eq!(score.incorrect_count, 1);
    }

    #[test]
    fn blank_story_fails_submission_check() {
        assert_matches!(
            Response::Story("  \n".into()).validate_submission(),
            Err(DrillError::EmptyResponse)
        );
        assert!(Response::Story("He rallied the villagers".into())
            .validate_submission()
            .is_ok());
        assert!(Response::Choice(0).validate_submission().is_ok());
    }

    #[test]
    fn response_serializes_tagged() {
        let json = serde_json::to_value(Response::Choice(2)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "choice", "value": 2}));
    }

    proptest! {
        #[test]
        fn counts_always_add_up(
            answers in proptest::collection::vec(0usize..4, 1..40),
            picks in proptest::collection::vec(proptest::option::of(0usize..4), 1..40),
        ) {
            let pool = quiz(&answers);
            let mut sheet = ResponseSheet::new();
            for (i, pick) in picks.iter().enumerate().take(answers.len()) {
                if let Some(p) = pick {
                    sheet.record(format!("q{i}"), Response::Choice(*p));
                }
            }
            let s = score(&pool, &sheet, &AnswerKey::from_pool(&pool));
            prop_assert_eq!(s.correct_count + s.incorrect_count + s.unanswered_count, s.total_count);
            prop_assert_eq!(s.total_count, answers.len());
            prop_assert_eq!(s.percentage, percentage(s.correct_count, s.total_count));
        }
    }
}
