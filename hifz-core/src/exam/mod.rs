//! Memorization exams.
//!
//! An exam tests one juz (the current part) and optionally a set of earlier
//! juz (cumulative questions). It is created pending, collects questions and
//! answers, then completes exactly once, at which point its scores freeze.

mod engine;
mod scoring;

pub use engine::{CompletionOutcome, ExamScoringEngine, RewardOutcome};
pub use scoring::{ScoreCard, score_questions};

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ExamScoringConfig;
use crate::error::{Error, Result};
use crate::types::{ExamId, JUZ_COUNT, QuestionId, StudentId, TenantId, TransactionId, UserId};

/// Current status of an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    /// Accepting questions and answers
    Pending,
    /// Scored and frozen (terminal state)
    Completed,
}

impl ExamStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of the curriculum a question tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    /// The juz being examined
    CurrentPart,
    /// A previously memorized juz listed in the exam's tested parts
    Cumulative,
}

impl QuestionType {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentPart => "CURRENT_PART",
            Self::Cumulative => "CUMULATIVE",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CURRENT_PART" => Some(Self::CurrentPart),
            "CUMULATIVE" => Some(Self::Cumulative),
            _ => None,
        }
    }
}

/// Request to open a new exam.
#[derive(Debug, Clone)]
pub struct CreateExam {
    pub tenant_id: TenantId,
    pub student_id: StudentId,
    pub juz_number: u8,
    pub tested_parts: BTreeSet<u8>,
    pub examiner_id: Option<UserId>,
    /// Defaults to today (UTC).
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// A memorization exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub tenant_id: TenantId,
    pub student_id: StudentId,
    pub examiner_id: Option<UserId>,
    pub date: NaiveDate,
    pub juz_number: u8,
    /// 1-based count of exams for this student and juz, in any status.
    pub attempt_number: u32,
    pub tested_parts: BTreeSet<u8>,
    pub status: ExamStatus,
    pub current_part_score: Option<f64>,
    pub cumulative_score: Option<f64>,
    pub final_score: Option<f64>,
    pub passed: Option<bool>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Weights, threshold and reward policy the exam was completed under.
    pub scoring: Option<ExamScoringConfig>,
    /// ID reserved for the reward transaction. The reward is settled once a
    /// ledger entry with this ID exists.
    pub reward_transaction_id: Option<TransactionId>,
}

impl Exam {
    /// Check if the exam still accepts questions and answers.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ExamStatus::Pending
    }

    /// Fail with `InvalidTransition` unless the exam is pending.
    pub(crate) fn ensure_pending(&self, action: &'static str) -> Result<()> {
        match self.status {
            ExamStatus::Pending => Ok(()),
            ExamStatus::Completed => Err(Error::InvalidTransition {
                status: self.status,
                action,
            }),
        }
    }

    /// The score card frozen at completion, if completed.
    #[must_use]
    pub fn score_card(&self) -> Option<ScoreCard> {
        match (self.status, self.final_score, self.passed) {
            (ExamStatus::Completed, Some(final_score), Some(passed)) => Some(ScoreCard {
                current_part_score: self.current_part_score,
                cumulative_score: self.cumulative_score,
                final_score,
                passed,
            }),
            _ => None,
        }
    }
}

/// One question of an exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: QuestionId,
    pub exam_id: ExamId,
    pub question_type: QuestionType,
    /// For current-part questions this is the exam's own juz.
    pub question_juz_number: Option<u8>,
    pub mistakes_count: u32,
    pub max_score: u32,
    pub achieved_score: u32,
}

/// Fail unless `juz` is a valid juz number.
pub(crate) fn validate_juz(juz: u8) -> Result<()> {
    if (1..=JUZ_COUNT).contains(&juz) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "juz number {juz} outside 1..={JUZ_COUNT}"
        )))
    }
}
