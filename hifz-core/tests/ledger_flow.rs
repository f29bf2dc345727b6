//! End-to-end tests for the assembled services.
//!
//! These tests drive [`Hifz`] the way an application would:
//! - Totals always match the sum of non-reversed transactions
//! - Concurrent activity for different students does not interfere
//! - A passed exam posts exactly one reward, on both store implementations
//! - A reward left pending is posted once by the repair job

use std::collections::BTreeSet;
use std::sync::Arc;

use hifz_core::storage::{MemoryStore, TursoStore};
use hifz_core::{
    AttendanceStatus, CreateExam, Error, ExamStatus, Hifz, HifzConfig, QuestionType,
    RewardOutcome, RuleDefaults, RuleKey, SessionId, SourceType, StudentId, TenantId, UserId,
};

async fn seeded(hifz: &Hifz) -> TenantId {
    let tenant = TenantId::new();
    hifz.registry
        .seed_defaults(tenant, &RuleDefaults::default())
        .await
        .unwrap();
    tenant
}

async fn memory_app() -> (Hifz, TenantId) {
    let hifz = Hifz::new(Arc::new(MemoryStore::new()), &HifzConfig::default()).unwrap();
    let tenant = seeded(&hifz).await;
    (hifz, tenant)
}

async fn turso_app() -> (Hifz, TenantId) {
    let store = TursoStore::new_memory().await.unwrap();
    let hifz = Hifz::new(Arc::new(store), &HifzConfig::default()).unwrap();
    let tenant = seeded(&hifz).await;
    (hifz, tenant)
}

async fn sum_of_active(hifz: &Hifz, student: StudentId) -> i64 {
    hifz.ledger
        .history(student)
        .await
        .unwrap()
        .iter()
        .filter(|tx| tx.is_active())
        .map(|tx| tx.amount)
        .sum()
}

/// Runs one passing exam (87.0) and returns the outcome.
async fn pass_exam(hifz: &Hifz, tenant: TenantId, student: StudentId) -> hifz_core::CompletionOutcome {
    let exam = hifz
        .exams
        .create_exam(CreateExam {
            tenant_id: tenant,
            student_id: student,
            juz_number: 3,
            tested_parts: BTreeSet::from([1, 2, 3]),
            examiner_id: Some(UserId::new()),
            date: None,
            notes: None,
        })
        .await
        .unwrap();

    let current = hifz
        .exams
        .add_question(exam.id, QuestionType::CurrentPart, None, 20)
        .await
        .unwrap();
    let cumulative = hifz
        .exams
        .add_question(exam.id, QuestionType::Cumulative, Some(1), 10)
        .await
        .unwrap();
    hifz.exams.record_answer(current.id, 1, 18).await.unwrap();
    hifz.exams.record_answer(cumulative.id, 2, 8).await.unwrap();

    hifz.triggers.on_exam_completed(exam.id).await.unwrap()
}

#[tokio::test]
async fn totals_follow_awards_and_reversals() {
    let (hifz, tenant) = memory_app().await;
    let student = StudentId::new();
    let session = SessionId::new();

    hifz.triggers
        .on_attendance(tenant, student, session, AttendanceStatus::Present, None)
        .await
        .unwrap();
    let absent = hifz
        .triggers
        .on_attendance(tenant, student, SessionId::new(), AttendanceStatus::Absent, None)
        .await
        .unwrap();
    hifz.triggers
        .manual_reward(tenant, student, 12, "Tajweed competition", UserId::new())
        .await
        .unwrap();

    assert_eq!(hifz.ledger.total(student).await.unwrap(), 12);

    hifz.ledger.reverse(absent.id).await.unwrap();

    assert_eq!(hifz.ledger.total(student).await.unwrap(), 17);
    assert_eq!(sum_of_active(&hifz, student).await, 17);
    assert_eq!(hifz.ledger.recompute_total(student).await.unwrap().total_points, 17);
    assert!(matches!(
        hifz.ledger.reverse(absent.id).await,
        Err(Error::AlreadyReversed(id)) if id == absent.id
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activity_across_students_keeps_totals_exact() {
    let (hifz, tenant) = memory_app().await;
    let hifz = Arc::new(hifz);
    let students: Vec<StudentId> = (0..5).map(|_| StudentId::new()).collect();

    let mut handles = Vec::new();
    for &student in &students {
        for _ in 0..20 {
            let hifz = Arc::clone(&hifz);
            handles.push(tokio::spawn(async move {
                hifz.triggers
                    .on_attendance(tenant, student, SessionId::new(), AttendanceStatus::Late, None)
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for student in students {
        assert_eq!(hifz.ledger.total(student).await.unwrap(), 40);
        assert_eq!(sum_of_active(&hifz, student).await, 40);
    }
    assert!(hifz.ledger.recompute_all().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_awards_reversals_and_recomputes_for_one_student() {
    let (hifz, tenant) = memory_app().await;
    let hifz = Arc::new(hifz);
    let student = StudentId::new();
    let teacher = UserId::new();

    let mut earlier = Vec::new();
    for points in 1..=20 {
        let tx = hifz
            .triggers
            .manual_reward(tenant, student, points, "Weekly revision", teacher)
            .await
            .unwrap();
        earlier.push(tx.id);
    }

    let mut handles = Vec::new();
    for (i, id) in earlier.into_iter().enumerate() {
        let awarding = Arc::clone(&hifz);
        handles.push(tokio::spawn(async move {
            awarding
                .triggers
                .manual_reward(tenant, student, 3, "Extra page", teacher)
                .await
                .map(|_| ())
        }));
        let reversing = Arc::clone(&hifz);
        handles.push(tokio::spawn(async move {
            reversing.ledger.reverse(id).await.map(|_| ())
        }));
        if i % 2 == 0 {
            let repairing = Arc::clone(&hifz);
            handles.push(tokio::spawn(async move {
                repairing.ledger.recompute_total(student).await.map(|_| ())
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Every earlier reward is reversed; only the 20 awards of 3 remain.
    assert_eq!(sum_of_active(&hifz, student).await, 60);
    assert_eq!(hifz.ledger.total(student).await.unwrap(), 60);
    assert!(hifz.ledger.recompute_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn award_past_i64_max_is_rejected_on_libsql() {
    let (hifz, tenant) = turso_app().await;
    let student = StudentId::new();
    hifz.triggers
        .manual_reward(tenant, student, i64::MAX, "Imported balance", UserId::new())
        .await
        .unwrap();

    let err = hifz
        .triggers
        .manual_reward(tenant, student, 1, "One more", UserId::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(hifz.ledger.history(student).await.unwrap().len(), 1);
    assert_eq!(hifz.ledger.total(student).await.unwrap(), i64::MAX);
}

#[tokio::test]
async fn passed_exam_posts_one_reward_in_memory() {
    let (hifz, tenant) = memory_app().await;
    let student = StudentId::new();

    let outcome = pass_exam(&hifz, tenant, student).await;

    assert_eq!(outcome.exam.status, ExamStatus::Completed);
    assert_eq!(outcome.exam.final_score, Some(87.0));
    assert_eq!(outcome.exam.passed, Some(true));
    match outcome.reward {
        RewardOutcome::Awarded(tx) => {
            assert_eq!(tx.amount, 50);
            assert_eq!(tx.source_type, SourceType::Exam);
        }
        other => panic!("expected award, got {other:?}"),
    }
    assert_eq!(hifz.ledger.total(student).await.unwrap(), 50);

    let again = hifz.triggers.on_exam_completed(outcome.exam.id).await;
    assert!(matches!(again, Err(Error::InvalidTransition { .. })));
    assert_eq!(hifz.ledger.history(student).await.unwrap().len(), 1);
}

#[tokio::test]
async fn passed_exam_posts_one_reward_on_libsql() {
    let (hifz, tenant) = turso_app().await;
    let student = StudentId::new();

    let outcome = pass_exam(&hifz, tenant, student).await;

    assert!(matches!(outcome.reward, RewardOutcome::Awarded(ref tx) if tx.amount == 50));
    assert_eq!(hifz.ledger.total(student).await.unwrap(), 50);

    let stored = hifz.exams.get_exam(outcome.exam.id).await.unwrap();
    assert_eq!(stored.final_score, Some(87.0));
    assert_eq!(stored.attempt_number, 1);
    assert_eq!(hifz.exams.rescore(stored.id).await.unwrap().final_score, 87.0);
}

#[tokio::test]
async fn disabled_pass_rule_leaves_reward_pending() {
    let (hifz, tenant) = turso_app().await;
    let student = StudentId::new();
    hifz.registry
        .set_active(tenant, RuleKey::ExamPassed, false)
        .await
        .unwrap();

    let outcome = pass_exam(&hifz, tenant, student).await;

    assert_eq!(outcome.exam.status, ExamStatus::Completed);
    assert!(matches!(outcome.reward, RewardOutcome::Pending { .. }));
    assert_eq!(hifz.ledger.total(student).await.unwrap(), 0);
}

#[tokio::test]
async fn pending_reward_is_settled_once_by_repair_on_libsql() {
    let (hifz, tenant) = turso_app().await;
    let student = StudentId::new();
    hifz.registry
        .set_active(tenant, RuleKey::ExamPassed, false)
        .await
        .unwrap();
    let outcome = pass_exam(&hifz, tenant, student).await;
    assert!(matches!(outcome.reward, RewardOutcome::Pending { .. }));

    hifz.registry
        .set_active(tenant, RuleKey::ExamPassed, true)
        .await
        .unwrap();
    let settled = hifz.exams.settle_pending_rewards().await.unwrap();
    let repeated = hifz.exams.settle_pending_rewards().await.unwrap();
    let retried = hifz.exams.retry_reward(outcome.exam.id).await.unwrap();

    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].0, outcome.exam.id);
    assert!(matches!(settled[0].1, RewardOutcome::Awarded(ref tx) if tx.amount == 50));
    assert!(repeated.is_empty());
    assert_eq!(retried, settled[0].1);

    let exam_entries: Vec<_> = hifz
        .ledger
        .history(student)
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.source_type == SourceType::Exam)
        .collect();
    assert_eq!(exam_entries.len(), 1);
    assert_eq!(hifz.ledger.total(student).await.unwrap(), 50);
    let stored = hifz.exams.get_exam(outcome.exam.id).await.unwrap();
    assert_eq!(stored.reward_transaction_id, Some(exam_entries[0].id));
}

#[tokio::test]
async fn local_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hifz.db");
    let student = StudentId::new();

    {
        let store = TursoStore::new_local(&path).await.unwrap();
        let hifz = Hifz::new(Arc::new(store), &HifzConfig::default()).unwrap();
        let tenant = seeded(&hifz).await;
        hifz.triggers
            .manual_reward(tenant, student, 30, "Completed juz", UserId::new())
            .await
            .unwrap();
    }

    let store = TursoStore::new_local(&path).await.unwrap();
    let hifz = Hifz::new(Arc::new(store), &HifzConfig::default()).unwrap();
    assert_eq!(hifz.ledger.total(student).await.unwrap(), 30);
    assert_eq!(hifz.ledger.history(student).await.unwrap().len(), 1);
}
