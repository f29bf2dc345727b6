//! Error types for hifz-core.

use thiserror::Error;

use crate::exam::ExamStatus;
use crate::rules::RuleKey;
use crate::storage::StorageError;
use crate::types::{TenantId, TransactionId};

/// Result type for ledger and exam operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the ledger and exam services.
#[derive(Debug, Error)]
pub enum Error {
    /// Input outside its allowed domain (page, juz, score sign, rule category).
    #[error("validation error: {0}")]
    Validation(String),

    /// No active rule for the key in this tenant.
    #[error("no active rule {key} for tenant {tenant}")]
    RuleNotFound { tenant: TenantId, key: RuleKey },

    /// The exam is not in a state that permits the action.
    #[error("cannot {action} exam in {status} state")]
    InvalidTransition {
        status: ExamStatus,
        action: &'static str,
    },

    /// The transaction carries a reversal marker already.
    #[error("transaction already reversed: {0}")]
    AlreadyReversed(TransactionId),

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Achieved score outside `0..=max`.
    #[error("score {achieved} out of range 0..={max}")]
    ScoreOutOfRange { achieved: u32, max: u32 },

    /// Exam questions cannot produce a score.
    #[error("incomplete questions: {0}")]
    IncompleteQuestions(String),

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
