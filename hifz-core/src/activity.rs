//! Circle activity that earns or costs points: recitations and attendance.
//!
//! These are facts owned by the roster; the ledger only needs their outcome
//! to pick a rule key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rules::RuleKey;
use crate::types::{PAGE_COUNT, SURAH_COUNT, SessionId, StudentId};

/// Examiner's grade for a recitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecitationQuality {
    Excellent,
    VeryGood,
    Good,
    Acceptable,
    Poor,
}

impl RecitationQuality {
    /// The rule key rewarding or penalizing this grade.
    #[must_use]
    pub fn rule_key(&self) -> RuleKey {
        match self {
            Self::Excellent => RuleKey::RecitationExcellent,
            Self::VeryGood => RuleKey::RecitationVeryGood,
            Self::Good => RuleKey::RecitationGood,
            Self::Acceptable => RuleKey::RecitationAcceptable,
            Self::Poor => RuleKey::RecitationPoor,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::VeryGood => "VERY_GOOD",
            Self::Good => "GOOD",
            Self::Acceptable => "ACCEPTABLE",
            Self::Poor => "POOR",
        }
    }
}

impl fmt::Display for RecitationQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the student recited new material or revised old material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecitationType {
    NewLesson,
    Review,
}

impl RecitationType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewLesson => "NEW_LESSON",
            Self::Review => "REVIEW",
        }
    }
}

/// A graded recitation heard during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recitation {
    pub id: uuid::Uuid,
    pub student_id: StudentId,
    pub session_id: SessionId,
    pub page_number: u16,
    pub quality: RecitationQuality,
    pub recitation_type: RecitationType,
    pub mistakes_count: u32,
    pub surah_id: Option<u16>,
}

impl Recitation {
    /// Check page and surah bounds.
    pub fn validate(&self) -> Result<()> {
        if !(1..=PAGE_COUNT).contains(&self.page_number) {
            return Err(Error::validation(format!(
                "page number {} outside 1..={PAGE_COUNT}",
                self.page_number
            )));
        }
        if let Some(surah) = self.surah_id
            && !(1..=SURAH_COUNT).contains(&surah)
        {
            return Err(Error::validation(format!(
                "surah {surah} outside 1..={SURAH_COUNT}"
            )));
        }
        Ok(())
    }
}

/// A student's attendance mark for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Excused,
}

impl AttendanceStatus {
    /// The rule key for this mark.
    #[must_use]
    pub fn rule_key(&self) -> RuleKey {
        match self {
            Self::Present => RuleKey::AttendancePresent,
            Self::Late => RuleKey::AttendanceLate,
            Self::Absent => RuleKey::AttendanceAbsent,
            Self::Excused => RuleKey::AttendanceExcused,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "PRESENT",
            Self::Late => "LATE",
            Self::Absent => "ABSENT",
            Self::Excused => "EXCUSED",
        }
    }
}
