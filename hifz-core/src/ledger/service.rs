//! Ledger writes and the student-total repair job.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{AmountSource, AwardRequest, PointTransaction, StudentAggregate};
use crate::error::{Error, Result};
use crate::locks::KeyedLocks;
use crate::rules::RuleRegistry;
use crate::storage::{LedgerStore, Reversal};
use crate::types::{StudentId, TransactionId};

/// A student whose stored total disagreed with their transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairEntry {
    pub student_id: StudentId,
    pub previous: i64,
    pub corrected: i64,
}

/// Posts and reverses point transactions.
///
/// Every write for a student runs under that student's lock, so the stored
/// total never loses an update. Students are independent of each other.
pub struct LedgerService {
    registry: RuleRegistry,
    store: Arc<dyn LedgerStore>,
    locks: KeyedLocks<StudentId>,
}

impl LedgerService {
    /// Create a ledger service.
    pub fn new(registry: RuleRegistry, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            registry,
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// The rule registry amounts are resolved against.
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Post one transaction and add it to the student's total.
    ///
    /// A failed rule lookup, or an amount that would push the total past the
    /// range of `i64`, leaves both the ledger and the total untouched.
    pub async fn award(&self, request: AwardRequest) -> Result<PointTransaction> {
        self.award_with_id(TransactionId::new(), request).await
    }

    /// Post a transaction under an ID chosen by the caller.
    ///
    /// Exam rewards reserve their ID on the exam first, so a retried reward
    /// can tell whether an earlier attempt already landed.
    #[instrument(skip(self, request), fields(student = %request.student_id, source = %request.source_type))]
    pub(crate) async fn award_with_id(
        &self,
        id: TransactionId,
        request: AwardRequest,
    ) -> Result<PointTransaction> {
        request.validate()?;

        let amount = match request.amount {
            AmountSource::Rule(key) => self.registry.resolve(request.tenant_id, key).await?.points,
            AmountSource::Explicit(points) => points,
        };

        let transaction = PointTransaction {
            id,
            student_id: request.student_id,
            amount,
            reason: request.reason,
            source_type: request.source_type,
            session_id: request.session_id,
            awarded_by: request.awarded_by,
            created_at: Utc::now(),
            reversed_at: None,
        };

        let _guard = self.locks.lock(transaction.student_id).await;
        let current = self.total(transaction.student_id).await?;
        if current.checked_add(amount).is_none() {
            return Err(Error::validation(format!(
                "awarding {amount} would overflow the total of student {}",
                transaction.student_id
            )));
        }
        let total = self.store.append(&transaction).await?;
        info!(transaction = %transaction.id, amount, total, "points awarded");
        Ok(transaction)
    }

    /// Mark a transaction reversed and subtract it from the student's total.
    #[instrument(skip(self))]
    pub async fn reverse(&self, id: TransactionId) -> Result<PointTransaction> {
        let existing = self
            .store
            .get_transaction(id)
            .await?
            .ok_or_else(|| Error::not_found("transaction", id))?;
        if !existing.is_active() {
            return Err(Error::AlreadyReversed(id));
        }

        let _guard = self.locks.lock(existing.student_id).await;
        let current = self.total(existing.student_id).await?;
        if current.checked_sub(existing.amount).is_none() {
            return Err(Error::validation(format!(
                "reversing {id} would overflow the total of student {}",
                existing.student_id
            )));
        }
        match self.store.reverse(id, Utc::now()).await? {
            Reversal::Applied { transaction, total } => {
                info!(transaction = %id, amount = transaction.amount, total, "transaction reversed");
                Ok(transaction)
            }
            Reversal::AlreadyReversed => Err(Error::AlreadyReversed(id)),
            Reversal::Missing => Err(Error::not_found("transaction", id)),
        }
    }

    /// Rebuild a student's total from their non-reversed transactions.
    ///
    /// Takes the same lock as awards, so it can run alongside live traffic.
    #[instrument(skip(self))]
    pub async fn recompute_total(&self, student: StudentId) -> Result<StudentAggregate> {
        let _guard = self.locks.lock(student).await;
        let rebuild = self.store.rebuild_total(student).await?;
        if rebuild.previous != rebuild.total {
            warn!(
                %student,
                previous = rebuild.previous,
                corrected = rebuild.total,
                "student total drifted from ledger"
            );
        }
        Ok(StudentAggregate {
            student_id: student,
            total_points: rebuild.total,
        })
    }

    /// Rebuild every student's total. Returns the students that drifted.
    pub async fn recompute_all(&self) -> Result<Vec<RepairEntry>> {
        let mut repaired = Vec::new();
        for student in self.store.students().await? {
            let _guard = self.locks.lock(student).await;
            let rebuild = self.store.rebuild_total(student).await?;
            if rebuild.previous != rebuild.total {
                warn!(%student, previous = rebuild.previous, corrected = rebuild.total, "repaired student total");
                repaired.push(RepairEntry {
                    student_id: student,
                    previous: rebuild.previous,
                    corrected: rebuild.total,
                });
            }
        }
        info!(repaired = repaired.len(), "recomputed all student totals");
        Ok(repaired)
    }

    /// A student's current total (0 if they have never been awarded).
    pub async fn total(&self, student: StudentId) -> Result<i64> {
        Ok(self
            .store
            .aggregate(student)
            .await?
            .map_or(0, |aggregate| aggregate.total_points))
    }

    /// A student's transactions, newest first, reversed ones included.
    pub async fn history(&self, student: StudentId) -> Result<Vec<PointTransaction>> {
        Ok(self.store.transactions(student).await?)
    }

    /// Get a transaction by ID.
    pub async fn get_transaction(&self, id: TransactionId) -> Result<PointTransaction> {
        self.find_transaction(id)
            .await?
            .ok_or_else(|| Error::not_found("transaction", id))
    }

    pub(crate) async fn find_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<PointTransaction>> {
        Ok(self.store.get_transaction(id).await?)
    }
}
