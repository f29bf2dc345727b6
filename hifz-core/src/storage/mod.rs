//! Storage traits and implementations.
//!
//! - [`RuleStore`] - point rules keyed by `(tenant, key)`
//! - [`LedgerStore`] - transactions and student totals
//! - [`ExamStore`] - exams and their questions
//!
//! Every write that touches a student total is one atomic unit: a
//! transaction is never visible without its effect on the total.
//! [`MemoryStore`] keeps everything in process; [`TursoStore`] persists to
//! libSQL.

mod error;
mod memory;
mod turso;

pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use turso::TursoStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::exam::{Exam, ExamQuestion};
use crate::ledger::{PointTransaction, StudentAggregate};
use crate::rules::{PointRule, RuleKey};
use crate::types::{ExamId, QuestionId, StudentId, TenantId, TransactionId};

/// Outcome of an attempted reversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reversal {
    /// The marker was set and the total decremented.
    Applied {
        transaction: PointTransaction,
        total: i64,
    },
    /// The transaction was reversed earlier; nothing changed.
    AlreadyReversed,
    /// No such transaction.
    Missing,
}

/// Result of rebuilding a student's total from their transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebuild {
    /// Stored total before the rebuild (0 if none existed).
    pub previous: i64,
    /// Sum of non-reversed amounts, now stored.
    pub total: i64,
}

/// Point rule persistence.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Get the rule for `(tenant, key)`, active or not.
    async fn find_rule(&self, tenant: TenantId, key: RuleKey) -> Result<Option<PointRule>>;

    /// List every rule of a tenant.
    async fn list_rules(&self, tenant: TenantId) -> Result<Vec<PointRule>>;

    /// Insert a rule, or update description, points and activation of the
    /// rule already stored for `(tenant, key)`.
    async fn save_rule(&self, rule: &PointRule) -> Result<()>;
}

/// Ledger persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a transaction and add its amount to the student's total.
    ///
    /// Returns the new total.
    async fn append(&self, transaction: &PointTransaction) -> Result<i64>;

    /// Get a transaction by ID.
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<PointTransaction>>;

    /// Stamp `reversed_at` and subtract the amount from the student's total.
    async fn reverse(&self, id: TransactionId, at: DateTime<Utc>) -> Result<Reversal>;

    /// Get a student's stored total.
    async fn aggregate(&self, student: StudentId) -> Result<Option<StudentAggregate>>;

    /// All transactions of a student, newest first.
    async fn transactions(&self, student: StudentId) -> Result<Vec<PointTransaction>>;

    /// Replace the stored total with the sum of non-reversed amounts.
    async fn rebuild_total(&self, student: StudentId) -> Result<Rebuild>;

    /// Every student with a transaction or a stored total.
    async fn students(&self) -> Result<Vec<StudentId>>;
}

/// Exam persistence.
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// Number of exams ever created for `(student, juz)`, in any status.
    async fn count_attempts(&self, student: StudentId, juz_number: u8) -> Result<u32>;

    /// Insert a new exam.
    async fn insert_exam(&self, exam: &Exam) -> Result<()>;

    /// Get an exam by ID.
    async fn get_exam(&self, id: ExamId) -> Result<Option<Exam>>;

    /// All exams of a student, oldest first.
    async fn list_exams(&self, student: StudentId) -> Result<Vec<Exam>>;

    /// Write computed scores and the completed status.
    ///
    /// Only applies while the stored exam is still pending. Returns whether
    /// it applied.
    async fn complete_exam(&self, exam: &Exam) -> Result<bool>;

    /// Record the transaction ID reserved for a completed exam's reward.
    ///
    /// Only applies while no ID is recorded. Returns whether it applied.
    async fn reserve_reward(&self, exam: ExamId, transaction: TransactionId) -> Result<bool>;

    /// Completed exams with no ledger entry under their reserved reward ID,
    /// oldest first. Exams that never reserved one are included.
    async fn unsettled_exams(&self) -> Result<Vec<Exam>>;

    /// Insert a new question.
    async fn insert_question(&self, question: &ExamQuestion) -> Result<()>;

    /// Get a question by ID.
    async fn get_question(&self, id: QuestionId) -> Result<Option<ExamQuestion>>;

    /// Overwrite the recorded answer of a question.
    async fn update_answer(&self, id: QuestionId, mistakes: u32, achieved: u32) -> Result<()>;

    /// Questions of an exam in creation order.
    async fn questions(&self, exam: ExamId) -> Result<Vec<ExamQuestion>>;
}
