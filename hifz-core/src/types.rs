//! Identifier types shared across the ledger and exam modules.
//!
//! Tenant, student, session and user identifiers come from the roster and are
//! trusted as-is. Rule, transaction, exam and question identifiers are minted
//! here as UUIDv7 so they sort by creation time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new ID with a UUIDv7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

uuid_id!(
    /// A mosque. Partitions point rules.
    TenantId
);
uuid_id!(
    /// A student enrolled in a circle.
    StudentId
);
uuid_id!(
    /// A circle session (class meeting).
    SessionId
);
uuid_id!(
    /// A staff member: examiner, teacher or administrator.
    UserId
);
uuid_id!(
    /// A point rule.
    RuleId
);
uuid_id!(
    /// A ledger entry.
    TransactionId
);
uuid_id!(
    /// A memorization exam.
    ExamId
);
uuid_id!(
    /// A question within an exam.
    QuestionId
);

/// Number of juz in the memorization curriculum.
pub const JUZ_COUNT: u8 = 30;

/// Number of pages in the standard mushaf.
pub const PAGE_COUNT: u16 = 604;

/// Number of surahs.
pub const SURAH_COUNT: u16 = 114;
