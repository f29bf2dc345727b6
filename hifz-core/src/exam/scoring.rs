//! Weighted exam scoring.
//!
//! Scores are pure functions of the question set and configuration, so
//! rescoring frozen questions reproduces the stored result exactly.

use serde::{Deserialize, Serialize};

use super::{ExamQuestion, QuestionType};
use crate::config::ExamScoringConfig;
use crate::error::{Error, Result};

/// Scores produced at completion. Percentages are rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// `None` when the exam had no current-part questions.
    pub current_part_score: Option<f64>,
    /// `None` when the exam had no cumulative questions.
    pub cumulative_score: Option<f64>,
    pub final_score: f64,
    pub passed: bool,
}

/// Score a question set.
///
/// Each component is `100 * sum(achieved) / sum(max)` over its questions.
/// The final score is the weighted average of the components present; with
/// a single component it equals that component.
pub fn score_questions(questions: &[ExamQuestion], config: &ExamScoringConfig) -> Result<ScoreCard> {
    config.validate()?;
    if questions.is_empty() {
        return Err(Error::IncompleteQuestions("exam has no questions".to_string()));
    }
    for question in questions {
        if question.max_score == 0 {
            return Err(Error::IncompleteQuestions(format!(
                "question {} has no max score",
                question.id
            )));
        }
        if question.achieved_score > question.max_score {
            return Err(Error::IncompleteQuestions(format!(
                "question {} scored {} of {}",
                question.id, question.achieved_score, question.max_score
            )));
        }
    }

    let current = component(questions, QuestionType::CurrentPart);
    let cumulative = component(questions, QuestionType::Cumulative);

    let final_score = match (current, cumulative) {
        (Some(current), Some(cumulative)) => {
            let current_weight = f64::from(config.current_part_weight);
            let cumulative_weight = f64::from(config.cumulative_weight);
            (current * current_weight + cumulative * cumulative_weight)
                / (current_weight + cumulative_weight)
        }
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => {
            return Err(Error::IncompleteQuestions("exam has no questions".to_string()));
        }
    };
    let final_score = round2(final_score);

    Ok(ScoreCard {
        current_part_score: current.map(round2),
        cumulative_score: cumulative.map(round2),
        final_score,
        passed: final_score >= config.pass_threshold,
    })
}

/// Unrounded percentage over the questions of one type.
fn component(questions: &[ExamQuestion], kind: QuestionType) -> Option<f64> {
    let (achieved, max) = questions
        .iter()
        .filter(|q| q.question_type == kind)
        .fold((0u64, 0u64), |(achieved, max), q| {
            (achieved + u64::from(q.achieved_score), max + u64::from(q.max_score))
        });
    if max == 0 {
        None
    } else {
        Some(100.0 * achieved as f64 / max as f64)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
