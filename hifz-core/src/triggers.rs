//! Entry points for circle events.
//!
//! Each trigger turns one event into a ledger award (or an exam completion)
//! and returns what was written.

use std::sync::Arc;

use tracing::debug;

use crate::activity::{AttendanceStatus, Recitation};
use crate::error::{Error, Result};
use crate::exam::{CompletionOutcome, ExamScoringEngine};
use crate::ledger::{AmountSource, AwardRequest, LedgerService, PointTransaction, SourceType};
use crate::types::{ExamId, SessionId, StudentId, TenantId, UserId};

/// Routes attendance, recitation, manual and exam events to the ledger and
/// exam engine.
#[derive(Clone)]
pub struct EventTriggers {
    ledger: Arc<LedgerService>,
    exams: Arc<ExamScoringEngine>,
}

impl EventTriggers {
    pub fn new(ledger: Arc<LedgerService>, exams: Arc<ExamScoringEngine>) -> Self {
        Self { ledger, exams }
    }

    /// Award the tenant's points for an attendance mark.
    pub async fn on_attendance(
        &self,
        tenant: TenantId,
        student: StudentId,
        session: SessionId,
        status: AttendanceStatus,
        recorded_by: Option<UserId>,
    ) -> Result<PointTransaction> {
        debug!(%student, %session, status = status.as_str(), "attendance event");
        self.ledger
            .award(AwardRequest {
                student_id: student,
                tenant_id: tenant,
                source_type: SourceType::Attendance,
                amount: AmountSource::Rule(status.rule_key()),
                reason: format!("Attendance: {}", status.as_str()),
                session_id: Some(session),
                awarded_by: recorded_by,
            })
            .await
    }

    /// Award the tenant's points for a graded recitation.
    pub async fn on_recitation(
        &self,
        tenant: TenantId,
        recitation: &Recitation,
        recorded_by: Option<UserId>,
    ) -> Result<PointTransaction> {
        recitation.validate()?;
        debug!(student = %recitation.student_id, quality = %recitation.quality, "recitation event");
        self.ledger
            .award(AwardRequest {
                student_id: recitation.student_id,
                tenant_id: tenant,
                source_type: SourceType::Recitation,
                amount: AmountSource::Rule(recitation.quality.rule_key()),
                reason: format!(
                    "Recitation page {} ({}): {}",
                    recitation.page_number,
                    recitation.recitation_type.as_str(),
                    recitation.quality
                ),
                session_id: Some(recitation.session_id),
                awarded_by: recorded_by,
            })
            .await
    }

    /// Grant `points` (> 0) chosen by a staff member.
    pub async fn manual_reward(
        &self,
        tenant: TenantId,
        student: StudentId,
        points: i64,
        reason: impl Into<String>,
        awarded_by: UserId,
    ) -> Result<PointTransaction> {
        if points <= 0 {
            return Err(Error::validation("reward points must be positive"));
        }
        self.manual(tenant, student, SourceType::ManualReward, points, reason.into(), awarded_by)
            .await
    }

    /// Deduct `points` (> 0) chosen by a staff member. Stored as a negative
    /// amount.
    pub async fn manual_penalty(
        &self,
        tenant: TenantId,
        student: StudentId,
        points: i64,
        reason: impl Into<String>,
        awarded_by: UserId,
    ) -> Result<PointTransaction> {
        if points <= 0 {
            return Err(Error::validation("penalty points must be positive"));
        }
        self.manual(tenant, student, SourceType::ManualPenalty, -points, reason.into(), awarded_by)
            .await
    }

    /// Complete an exam; a pass posts the exam reward.
    pub async fn on_exam_completed(&self, exam: ExamId) -> Result<CompletionOutcome> {
        self.exams.complete(exam).await
    }

    async fn manual(
        &self,
        tenant: TenantId,
        student: StudentId,
        source_type: SourceType,
        amount: i64,
        reason: String,
        awarded_by: UserId,
    ) -> Result<PointTransaction> {
        self.ledger
            .award(AwardRequest {
                student_id: student,
                tenant_id: tenant,
                source_type,
                amount: AmountSource::Explicit(amount),
                reason,
                session_id: None,
                awarded_by: Some(awarded_by),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{RecitationQuality, RecitationType};
    use crate::config::{ExamScoringConfig, RuleDefaults};
    use crate::rules::RuleRegistry;
    use crate::storage::MemoryStore;

    async fn triggers() -> (EventTriggers, Arc<LedgerService>, TenantId) {
        let store = Arc::new(MemoryStore::new());
        let registry = RuleRegistry::new(store.clone());
        let tenant = TenantId::new();
        registry
            .seed_defaults(tenant, &RuleDefaults::default())
            .await
            .unwrap();
        let ledger = Arc::new(LedgerService::new(registry, store.clone()));
        let exams = Arc::new(
            ExamScoringEngine::new(store, ledger.clone(), ExamScoringConfig::default()).unwrap(),
        );
        (EventTriggers::new(ledger.clone(), exams), ledger, tenant)
    }

    fn recitation(student: StudentId, page: u16, quality: RecitationQuality) -> Recitation {
        Recitation {
            id: uuid::Uuid::new_v4(),
            student_id: student,
            session_id: SessionId::new(),
            page_number: page,
            quality,
            recitation_type: RecitationType::Review,
            mistakes_count: 3,
            surah_id: Some(2),
        }
    }

    #[tokio::test]
    async fn attendance_uses_status_rule() {
        let (triggers, ledger, tenant) = triggers().await;
        let student = StudentId::new();
        let session = SessionId::new();

        let tx = triggers
            .on_attendance(tenant, student, session, AttendanceStatus::Late, None)
            .await
            .unwrap();

        assert_eq!(tx.amount, 2);
        assert_eq!(tx.source_type, SourceType::Attendance);
        assert_eq!(tx.session_id, Some(session));
        assert_eq!(ledger.total(student).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recitation_uses_quality_rule() {
        let (triggers, ledger, tenant) = triggers().await;
        let student = StudentId::new();

        triggers
            .on_recitation(tenant, &recitation(student, 40, RecitationQuality::Excellent), None)
            .await
            .unwrap();
        let poor = triggers
            .on_recitation(tenant, &recitation(student, 41, RecitationQuality::Poor), None)
            .await
            .unwrap();

        assert_eq!(poor.amount, -2);
        assert!(poor.reason.contains("page 41"));
        assert_eq!(ledger.total(student).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn invalid_recitation_page_posts_nothing() {
        let (triggers, ledger, tenant) = triggers().await;
        let student = StudentId::new();

        let err = triggers
            .on_recitation(tenant, &recitation(student, 605, RecitationQuality::Good), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(ledger.history(student).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_penalty_is_stored_negative() {
        let (triggers, ledger, tenant) = triggers().await;
        let student = StudentId::new();
        let teacher = UserId::new();

        triggers
            .manual_reward(tenant, student, 15, "Helped classmates", teacher)
            .await
            .unwrap();
        let penalty = triggers
            .manual_penalty(tenant, student, 4, "Disrupted session", teacher)
            .await
            .unwrap();

        assert_eq!(penalty.amount, -4);
        assert_eq!(penalty.source_type, SourceType::ManualPenalty);
        assert_eq!(penalty.awarded_by, Some(teacher));
        assert_eq!(ledger.total(student).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn manual_amounts_must_be_positive() {
        let (triggers, _ledger, tenant) = triggers().await;
        let student = StudentId::new();

        assert!(
            triggers
                .manual_reward(tenant, student, 0, "nothing", UserId::new())
                .await
                .is_err()
        );
        assert!(
            triggers
                .manual_penalty(tenant, student, -3, "negative", UserId::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn exam_completion_without_exam_is_not_found() {
        let (triggers, _ledger, _tenant) = triggers().await;

        let err = triggers.on_exam_completed(ExamId::new()).await.unwrap_err();

        assert!(matches!(err, Error::NotFound { entity: "exam", .. }));
    }
}
