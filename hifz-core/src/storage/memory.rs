//! In-process storage.
//!
//! All state sits behind one `RwLock`, so every trait method is atomic with
//! respect to every other.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ExamStore, LedgerStore, Rebuild, Result, Reversal, RuleStore, StorageError};
use crate::exam::{Exam, ExamQuestion, ExamStatus};
use crate::ledger::{PointTransaction, StudentAggregate};
use crate::rules::{PointRule, RuleKey};
use crate::types::{ExamId, QuestionId, StudentId, TenantId, TransactionId};

#[derive(Default)]
struct State {
    rules: HashMap<(TenantId, RuleKey), PointRule>,
    // BTreeMap keyed by UUIDv7 keeps creation order.
    transactions: BTreeMap<TransactionId, PointTransaction>,
    totals: HashMap<StudentId, i64>,
    exams: BTreeMap<ExamId, Exam>,
    questions: BTreeMap<QuestionId, ExamQuestion>,
}

/// Storage backed by in-memory maps.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn overflow(student: StudentId) -> StorageError {
    StorageError::InvalidData(format!("point total overflows i64 for student {student}"))
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn find_rule(&self, tenant: TenantId, key: RuleKey) -> Result<Option<PointRule>> {
        Ok(self.state.read().await.rules.get(&(tenant, key)).cloned())
    }

    async fn list_rules(&self, tenant: TenantId) -> Result<Vec<PointRule>> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .values()
            .filter(|rule| rule.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn save_rule(&self, rule: &PointRule) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .rules
            .entry((rule.tenant_id, rule.key))
            .and_modify(|stored| {
                stored.description = rule.description.clone();
                stored.points = rule.points;
                stored.is_active = rule.is_active;
            })
            .or_insert_with(|| rule.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, transaction: &PointTransaction) -> Result<i64> {
        let mut state = self.state.write().await;
        let current = state.totals.get(&transaction.student_id).copied().unwrap_or(0);
        let total = current
            .checked_add(transaction.amount)
            .ok_or_else(|| overflow(transaction.student_id))?;
        state
            .transactions
            .insert(transaction.id, transaction.clone());
        state.totals.insert(transaction.student_id, total);
        Ok(total)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<PointTransaction>> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn reverse(&self, id: TransactionId, at: DateTime<Utc>) -> Result<Reversal> {
        let mut state = self.state.write().await;
        let State {
            transactions,
            totals,
            ..
        } = &mut *state;
        let Some(transaction) = transactions.get_mut(&id) else {
            return Ok(Reversal::Missing);
        };
        if transaction.reversed_at.is_some() {
            return Ok(Reversal::AlreadyReversed);
        }
        let current = totals.get(&transaction.student_id).copied().unwrap_or(0);
        let total = current
            .checked_sub(transaction.amount)
            .ok_or_else(|| overflow(transaction.student_id))?;

        transaction.reversed_at = Some(at);
        totals.insert(transaction.student_id, total);
        Ok(Reversal::Applied {
            transaction: transaction.clone(),
            total,
        })
    }

    async fn aggregate(&self, student: StudentId) -> Result<Option<StudentAggregate>> {
        let state = self.state.read().await;
        Ok(state.totals.get(&student).map(|&total_points| StudentAggregate {
            student_id: student,
            total_points,
        }))
    }

    async fn transactions(&self, student: StudentId) -> Result<Vec<PointTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .rev()
            .filter(|tx| tx.student_id == student)
            .cloned()
            .collect())
    }

    async fn rebuild_total(&self, student: StudentId) -> Result<Rebuild> {
        let mut state = self.state.write().await;
        let total = state
            .transactions
            .values()
            .filter(|tx| tx.student_id == student && tx.is_active())
            .try_fold(0i64, |sum, tx| sum.checked_add(tx.amount))
            .ok_or_else(|| overflow(student))?;
        let previous = state.totals.insert(student, total).unwrap_or(0);
        Ok(Rebuild { previous, total })
    }

    async fn students(&self) -> Result<Vec<StudentId>> {
        let state = self.state.read().await;
        let mut students: Vec<StudentId> = state
            .totals
            .keys()
            .copied()
            .chain(state.transactions.values().map(|tx| tx.student_id))
            .collect();
        students.sort();
        students.dedup();
        Ok(students)
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn count_attempts(&self, student: StudentId, juz_number: u8) -> Result<u32> {
        let state = self.state.read().await;
        let count = state
            .exams
            .values()
            .filter(|exam| exam.student_id == student && exam.juz_number == juz_number)
            .count();
        Ok(count as u32)
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<()> {
        self.state.write().await.exams.insert(exam.id, exam.clone());
        Ok(())
    }

    async fn get_exam(&self, id: ExamId) -> Result<Option<Exam>> {
        Ok(self.state.read().await.exams.get(&id).cloned())
    }

    async fn list_exams(&self, student: StudentId) -> Result<Vec<Exam>> {
        let state = self.state.read().await;
        Ok(state
            .exams
            .values()
            .filter(|exam| exam.student_id == student)
            .cloned()
            .collect())
    }

    async fn complete_exam(&self, exam: &Exam) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.exams.get_mut(&exam.id) {
            Some(stored) if stored.status == ExamStatus::Pending => {
                *stored = exam.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reserve_reward(&self, exam: ExamId, transaction: TransactionId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.exams.get_mut(&exam) {
            Some(stored)
                if stored.status == ExamStatus::Completed
                    && stored.reward_transaction_id.is_none() =>
            {
                stored.reward_transaction_id = Some(transaction);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unsettled_exams(&self) -> Result<Vec<Exam>> {
        let state = self.state.read().await;
        Ok(state
            .exams
            .values()
            .filter(|exam| exam.status == ExamStatus::Completed)
            .filter(|exam| {
                exam.reward_transaction_id
                    .is_none_or(|id| !state.transactions.contains_key(&id))
            })
            .cloned()
            .collect())
    }

    async fn insert_question(&self, question: &ExamQuestion) -> Result<()> {
        self.state
            .write()
            .await
            .questions
            .insert(question.id, question.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<ExamQuestion>> {
        Ok(self.state.read().await.questions.get(&id).cloned())
    }

    async fn update_answer(&self, id: QuestionId, mistakes: u32, achieved: u32) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(question) = state.questions.get_mut(&id) {
            question.mistakes_count = mistakes;
            question.achieved_score = achieved;
        }
        Ok(())
    }

    async fn questions(&self, exam: ExamId) -> Result<Vec<ExamQuestion>> {
        let state = self.state.read().await;
        Ok(state
            .questions
            .values()
            .filter(|q| q.exam_id == exam)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SourceType;

    fn transaction(student: StudentId, amount: i64) -> PointTransaction {
        PointTransaction {
            id: TransactionId::new(),
            student_id: student,
            amount,
            reason: "adjustment".to_string(),
            source_type: SourceType::ManualReward,
            session_id: None,
            awarded_by: None,
            created_at: Utc::now(),
            reversed_at: None,
        }
    }

    #[tokio::test]
    async fn append_past_i64_max_leaves_state_untouched() {
        let store = MemoryStore::new();
        let student = StudentId::new();
        store.append(&transaction(student, i64::MAX)).await.unwrap();

        let err = store.append(&transaction(student, 1)).await.unwrap_err();

        assert!(matches!(err, StorageError::InvalidData(_)));
        assert_eq!(store.transactions(student).await.unwrap().len(), 1);
        let aggregate = store.aggregate(student).await.unwrap().unwrap();
        assert_eq!(aggregate.total_points, i64::MAX);
    }

    #[tokio::test]
    async fn reverse_that_would_overflow_keeps_transaction_active() {
        let store = MemoryStore::new();
        let student = StudentId::new();
        let penalty = transaction(student, -1);
        store.append(&penalty).await.unwrap();
        store.append(&transaction(student, i64::MAX)).await.unwrap();

        let err = store.reverse(penalty.id, Utc::now()).await.unwrap_err();

        assert!(matches!(err, StorageError::InvalidData(_)));
        let stored = store.get_transaction(penalty.id).await.unwrap().unwrap();
        assert!(stored.is_active());
        let aggregate = store.aggregate(student).await.unwrap().unwrap();
        assert_eq!(aggregate.total_points, i64::MAX - 1);
    }

    #[tokio::test]
    async fn rebuild_reports_overflow_instead_of_wrapping() {
        let store = MemoryStore::new();
        let student = StudentId::new();
        store.append(&transaction(student, i64::MAX)).await.unwrap();
        let penalty = transaction(student, -1);
        store.append(&penalty).await.unwrap();
        store.append(&transaction(student, 1)).await.unwrap();
        // Marking the penalty reversed directly leaves a sum of i64::MAX + 1.
        store.state.write().await.transactions.get_mut(&penalty.id).unwrap().reversed_at =
            Some(Utc::now());

        let err = store.rebuild_total(student).await.unwrap_err();

        assert!(matches!(err, StorageError::InvalidData(_)));
        let aggregate = store.aggregate(student).await.unwrap().unwrap();
        assert_eq!(aggregate.total_points, i64::MAX);
    }
}
