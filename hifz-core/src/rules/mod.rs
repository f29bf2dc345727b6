//! Point rules: tenant-scoped mapping from an outcome key to a signed amount.

mod registry;

pub use registry::RuleRegistry;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::SourceType;
use crate::types::{RuleId, TenantId};

/// Closed catalog of outcome keys.
///
/// Each key belongs to exactly one [`SourceType`]. Manual adjustments carry
/// explicit amounts and have no key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKey {
    RecitationExcellent,
    RecitationVeryGood,
    RecitationGood,
    RecitationAcceptable,
    RecitationPoor,
    AttendancePresent,
    AttendanceLate,
    AttendanceAbsent,
    AttendanceExcused,
    ExamPassed,
    ExamFailed,
}

impl RuleKey {
    /// Every key in catalog order.
    pub const ALL: [RuleKey; 11] = [
        Self::RecitationExcellent,
        Self::RecitationVeryGood,
        Self::RecitationGood,
        Self::RecitationAcceptable,
        Self::RecitationPoor,
        Self::AttendancePresent,
        Self::AttendanceLate,
        Self::AttendanceAbsent,
        Self::AttendanceExcused,
        Self::ExamPassed,
        Self::ExamFailed,
    ];

    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecitationExcellent => "RECITATION_EXCELLENT",
            Self::RecitationVeryGood => "RECITATION_VERY_GOOD",
            Self::RecitationGood => "RECITATION_GOOD",
            Self::RecitationAcceptable => "RECITATION_ACCEPTABLE",
            Self::RecitationPoor => "RECITATION_POOR",
            Self::AttendancePresent => "ATTENDANCE_PRESENT",
            Self::AttendanceLate => "ATTENDANCE_LATE",
            Self::AttendanceAbsent => "ATTENDANCE_ABSENT",
            Self::AttendanceExcused => "ATTENDANCE_EXCUSED",
            Self::ExamPassed => "EXAM_PASSED",
            Self::ExamFailed => "EXAM_FAILED",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == s)
    }

    /// The transaction category this key produces.
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::RecitationExcellent
            | Self::RecitationVeryGood
            | Self::RecitationGood
            | Self::RecitationAcceptable
            | Self::RecitationPoor => SourceType::Recitation,
            Self::AttendancePresent
            | Self::AttendanceLate
            | Self::AttendanceAbsent
            | Self::AttendanceExcused => SourceType::Attendance,
            Self::ExamPassed | Self::ExamFailed => SourceType::Exam,
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant's policy for one outcome key.
///
/// `(tenant_id, key)` is unique. Positive points reward, negative points
/// penalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub key: RuleKey,
    pub description: String,
    pub points: i64,
    pub is_active: bool,
}

impl PointRule {
    /// Create a new active rule.
    #[must_use]
    pub fn new(tenant_id: TenantId, key: RuleKey, description: String, points: i64) -> Self {
        Self {
            id: RuleId::new(),
            tenant_id,
            key,
            description,
            points,
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_key_parse_round_trips_every_key() {
        for key in RuleKey::ALL {
            assert_eq!(RuleKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(RuleKey::parse("RECITATION_SUPERB"), None);
    }

    #[test]
    fn rule_key_serde_matches_storage_form() {
        let json = serde_json::to_string(&RuleKey::RecitationVeryGood).unwrap();
        assert_eq!(json, "\"RECITATION_VERY_GOOD\"");
    }

    #[test]
    fn rule_keys_map_to_their_source_type() {
        assert_eq!(RuleKey::RecitationPoor.source_type(), SourceType::Recitation);
        assert_eq!(RuleKey::AttendanceLate.source_type(), SourceType::Attendance);
        assert_eq!(RuleKey::ExamPassed.source_type(), SourceType::Exam);
    }
}
