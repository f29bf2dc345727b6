//! Engine configuration.
//!
//! Exam weights and the pass threshold are explicit settings rather than
//! constants baked into the scoring code. Rule defaults seed a tenant's
//! point rules on first use.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rules::RuleKey;

/// Default weight of the current-part component, in percent.
pub const DEFAULT_CURRENT_PART_WEIGHT: u32 = 70;

/// Default weight of the cumulative component, in percent.
pub const DEFAULT_CUMULATIVE_WEIGHT: u32 = 30;

/// Default minimum final score for a pass.
pub const DEFAULT_PASS_THRESHOLD: f64 = 80.0;

/// Top-level configuration for the ledger and exam engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HifzConfig {
    #[serde(default)]
    pub exam: ExamScoringConfig,

    #[serde(default)]
    pub rules: RuleDefaults,
}

/// Weighting and pass/fail policy for exam completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExamScoringConfig {
    /// Relative weight of the current-part score
    pub current_part_weight: u32,

    /// Relative weight of the cumulative score
    pub cumulative_weight: u32,

    /// Final scores at or above this value pass
    pub pass_threshold: f64,

    /// Also post an `EXAM_FAILED` ledger entry when an exam fails
    pub award_on_fail: bool,
}

impl Default for ExamScoringConfig {
    fn default() -> Self {
        Self {
            current_part_weight: DEFAULT_CURRENT_PART_WEIGHT,
            cumulative_weight: DEFAULT_CUMULATIVE_WEIGHT,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            award_on_fail: false,
        }
    }
}

impl ExamScoringConfig {
    /// Reject configurations that cannot score an exam.
    pub fn validate(&self) -> Result<()> {
        if self.current_part_weight == 0 && self.cumulative_weight == 0 {
            return Err(Error::validation("exam weights must not both be zero"));
        }
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(Error::validation(format!(
                "pass threshold {} outside 0..=100",
                self.pass_threshold
            )));
        }
        Ok(())
    }
}

/// Default points per outcome key, used to seed a tenant's rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleDefaults {
    pub recitation_excellent: i64,
    pub recitation_very_good: i64,
    pub recitation_good: i64,
    pub recitation_acceptable: i64,
    pub recitation_poor: i64,
    pub attendance_present: i64,
    pub attendance_late: i64,
    pub attendance_absent: i64,
    pub attendance_excused: i64,
    pub exam_passed: i64,
    pub exam_failed: i64,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            recitation_excellent: 10,
            recitation_very_good: 8,
            recitation_good: 5,
            recitation_acceptable: 2,
            recitation_poor: -2,
            attendance_present: 5,
            attendance_late: 2,
            attendance_absent: -5,
            attendance_excused: 0,
            exam_passed: 50,
            exam_failed: 0,
        }
    }
}

impl RuleDefaults {
    /// Configured points for a key.
    #[must_use]
    pub fn points_for(&self, key: RuleKey) -> i64 {
        match key {
            RuleKey::RecitationExcellent => self.recitation_excellent,
            RuleKey::RecitationVeryGood => self.recitation_very_good,
            RuleKey::RecitationGood => self.recitation_good,
            RuleKey::RecitationAcceptable => self.recitation_acceptable,
            RuleKey::RecitationPoor => self.recitation_poor,
            RuleKey::AttendancePresent => self.attendance_present,
            RuleKey::AttendanceLate => self.attendance_late,
            RuleKey::AttendanceAbsent => self.attendance_absent,
            RuleKey::AttendanceExcused => self.attendance_excused,
            RuleKey::ExamPassed => self.exam_passed,
            RuleKey::ExamFailed => self.exam_failed,
        }
    }
}
