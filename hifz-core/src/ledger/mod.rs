//! Points ledger: append-only signed transactions plus a per-student total.
//!
//! A transaction is never deleted. Reversal stamps `reversed_at` and removes
//! the amount from the student's total in the same storage unit, so the
//! total always equals the sum of non-reversed amounts.

mod service;

pub use service::{LedgerService, RepairEntry};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rules::RuleKey;
use crate::types::{SessionId, StudentId, TenantId, TransactionId, UserId};

/// What triggered a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Recitation,
    Attendance,
    Exam,
    ManualReward,
    ManualPenalty,
}

impl SourceType {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recitation => "RECITATION",
            Self::Attendance => "ATTENDANCE",
            Self::Exam => "EXAM",
            Self::ManualReward => "MANUAL_REWARD",
            Self::ManualPenalty => "MANUAL_PENALTY",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECITATION" => Some(Self::Recitation),
            "ATTENDANCE" => Some(Self::Attendance),
            "EXAM" => Some(Self::Exam),
            "MANUAL_REWARD" => Some(Self::ManualReward),
            "MANUAL_PENALTY" => Some(Self::ManualPenalty),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an award's amount comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSource {
    /// Look the amount up in the tenant's rules.
    Rule(RuleKey),
    /// Use this amount as given.
    Explicit(i64),
}

/// A request to post one ledger entry.
#[derive(Debug, Clone)]
pub struct AwardRequest {
    pub student_id: StudentId,
    pub tenant_id: TenantId,
    pub source_type: SourceType,
    pub amount: AmountSource,
    pub reason: String,
    pub session_id: Option<SessionId>,
    pub awarded_by: Option<UserId>,
}

impl AwardRequest {
    /// Check that the amount source agrees with the source type.
    ///
    /// Rule keys must belong to the source type. Manual rewards must be
    /// positive, manual penalties negative, and explicit amounts non-zero.
    pub fn validate(&self) -> Result<()> {
        match self.amount {
            AmountSource::Rule(key) => {
                if key.source_type() != self.source_type {
                    return Err(Error::validation(format!(
                        "rule {key} cannot be used for {} transactions",
                        self.source_type
                    )));
                }
            }
            AmountSource::Explicit(0) => {
                return Err(Error::validation("explicit amount must be non-zero"));
            }
            AmountSource::Explicit(points) => match self.source_type {
                SourceType::ManualReward if points < 0 => {
                    return Err(Error::validation("manual reward must be positive"));
                }
                SourceType::ManualPenalty if points > 0 => {
                    return Err(Error::validation("manual penalty must be negative"));
                }
                SourceType::Recitation
                | SourceType::Attendance
                | SourceType::Exam
                | SourceType::ManualReward
                | SourceType::ManualPenalty => {}
            },
        }
        if self.reason.trim().is_empty() {
            return Err(Error::validation("reason must not be empty"));
        }
        Ok(())
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: TransactionId,
    pub student_id: StudentId,
    pub amount: i64,
    pub reason: String,
    pub source_type: SourceType,
    pub session_id: Option<SessionId>,
    pub awarded_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    /// Set once when the entry is reversed.
    pub reversed_at: Option<DateTime<Utc>>,
}

impl PointTransaction {
    /// Whether the entry still counts toward the student's total.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.reversed_at.is_none()
    }
}

/// A student's running point total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAggregate {
    pub student_id: StudentId,
    pub total_points: i64,
}
