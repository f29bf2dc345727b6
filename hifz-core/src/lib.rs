//! Points ledger and memorization exam scoring for hifz circles.
//!
//! # Architecture
//!
//! - **Rules** ([`RuleRegistry`]) map a tenant's outcome keys to signed points
//! - **Ledger** ([`LedgerService`]) appends transactions and keeps each
//!   student's total equal to the sum of their non-reversed entries
//! - **Exams** ([`ExamScoringEngine`]) score multi-part exams with configured
//!   weights and post the pass reward to the ledger
//! - **Triggers** ([`EventTriggers`]) turn circle events into the calls above
//!
//! Storage sits behind [`storage::RuleStore`], [`storage::LedgerStore`] and
//! [`storage::ExamStore`], implemented in memory and on libSQL.

mod activity;
mod app;
mod config;
mod error;
mod exam;
mod ledger;
mod locks;
mod rules;
pub mod storage;
mod triggers;
mod types;

// Wiring
pub use app::Hifz;

// Configuration
pub use config::{
    DEFAULT_CUMULATIVE_WEIGHT, DEFAULT_CURRENT_PART_WEIGHT, DEFAULT_PASS_THRESHOLD,
    ExamScoringConfig, HifzConfig, RuleDefaults,
};

// Errors
pub use error::{Error, Result};

// Rules
pub use rules::{PointRule, RuleKey, RuleRegistry};

// Ledger
pub use ledger::{
    AmountSource, AwardRequest, LedgerService, PointTransaction, RepairEntry, SourceType,
    StudentAggregate,
};

// Exams
pub use exam::{
    CompletionOutcome, CreateExam, Exam, ExamQuestion, ExamScoringEngine, ExamStatus,
    QuestionType, RewardOutcome, ScoreCard, score_questions,
};

// Activity and triggers
pub use activity::{AttendanceStatus, Recitation, RecitationQuality, RecitationType};
pub use triggers::EventTriggers;

// Concurrency
pub use locks::KeyedLocks;

// IDs
pub use types::{
    ExamId, JUZ_COUNT, PAGE_COUNT, QuestionId, RuleId, SURAH_COUNT, SessionId, StudentId,
    TenantId, TransactionId, UserId,
};
