//! Turso/libSQL implementation of ledger and exam storage.
//!
//! This module provides persistent storage using Turso (libSQL).
//! It can connect to:
//! - Remote Turso database (cloud)
//! - Local embedded SQLite file
//! - In-memory database (tests)
//!
//! One connection serves all calls and is held for the duration of each
//! call, so a multi-statement write is never interleaved with another call.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Builder, Connection, Database, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{ExamStore, LedgerStore, Rebuild, Result, Reversal, RuleStore, StorageError};
use crate::exam::{Exam, ExamQuestion, ExamStatus, QuestionType};
use crate::ledger::{PointTransaction, SourceType, StudentAggregate};
use crate::rules::{PointRule, RuleKey};
use crate::types::{
    ExamId, QuestionId, RuleId, SessionId, StudentId, TenantId, TransactionId, UserId,
};

/// SQL schema for the point rules table.
const SCHEMA_RULES: &str = r#"
CREATE TABLE IF NOT EXISTS point_rules (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    key TEXT NOT NULL,
    description TEXT NOT NULL,
    points INTEGER NOT NULL,
    is_active INTEGER NOT NULL,
    UNIQUE (tenant_id, key)
)
"#;

/// SQL schema for the ledger table.
const SCHEMA_TRANSACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS point_transactions (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    amount INTEGER NOT NULL,
    reason TEXT NOT NULL,
    source_type TEXT NOT NULL,
    session_id TEXT,
    awarded_by TEXT,
    created_at TEXT NOT NULL,
    reversed_at TEXT
)
"#;

/// SQL schema for per-student totals.
const SCHEMA_AGGREGATES: &str = r#"
CREATE TABLE IF NOT EXISTS student_aggregates (
    student_id TEXT PRIMARY KEY,
    total_points INTEGER NOT NULL
)
"#;

/// SQL schema for the exams table.
const SCHEMA_EXAMS: &str = r#"
CREATE TABLE IF NOT EXISTS exams (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    examiner_id TEXT,
    date TEXT NOT NULL,
    juz_number INTEGER NOT NULL,
    attempt_number INTEGER NOT NULL,
    tested_parts TEXT NOT NULL,
    status TEXT NOT NULL,
    current_part_score REAL,
    cumulative_score REAL,
    final_score REAL,
    passed INTEGER,
    notes TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    scoring TEXT,
    reward_transaction_id TEXT
)
"#;

/// SQL schema for exam questions.
const SCHEMA_QUESTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS exam_questions (
    id TEXT PRIMARY KEY,
    exam_id TEXT NOT NULL,
    question_type TEXT NOT NULL,
    question_juz_number INTEGER,
    mistakes_count INTEGER NOT NULL,
    max_score INTEGER NOT NULL,
    achieved_score INTEGER NOT NULL
)
"#;

const INDEX_TRANSACTIONS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_point_transactions_student
ON point_transactions(student_id)
"#;

const INDEX_EXAMS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_exams_student_juz
ON exams(student_id, juz_number)
"#;

const INDEX_QUESTIONS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_exam_questions_exam
ON exam_questions(exam_id)
"#;

const RULE_COLUMNS: &str = "id, tenant_id, key, description, points, is_active";

const TRANSACTION_COLUMNS: &str =
    "id, student_id, amount, reason, source_type, session_id, awarded_by, created_at, reversed_at";

const EXAM_COLUMNS: &str = "id, tenant_id, student_id, examiner_id, date, juz_number, attempt_number, tested_parts, status, current_part_score, cumulative_score, final_score, passed, notes, created_at, completed_at, scoring, reward_transaction_id";

const QUESTION_COLUMNS: &str =
    "id, exam_id, question_type, question_juz_number, mistakes_count, max_score, achieved_score";

/// Turso-backed storage for rules, ledger and exams.
#[derive(Clone)]
pub struct TursoStore {
    _db: Arc<Database>,
    conn: Arc<Mutex<Connection>>,
}

impl TursoStore {
    /// Create a new storage instance with a local embedded database.
    pub async fn new_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::open(db).await
    }

    /// Create a new storage instance connected to a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await?;
        Self::open(db).await
    }

    /// Create a new in-memory storage instance (for testing).
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::open(db).await
    }

    async fn open(db: Database) -> Result<Self> {
        let conn = db.connect()?;
        let storage = Self {
            _db: Arc::new(db),
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    /// Ensure the database schema exists.
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        for statement in [
            SCHEMA_RULES,
            SCHEMA_TRANSACTIONS,
            SCHEMA_AGGREGATES,
            SCHEMA_EXAMS,
            SCHEMA_QUESTIONS,
            INDEX_TRANSACTIONS,
            INDEX_EXAMS,
            INDEX_QUESTIONS,
        ] {
            conn.execute(statement, ()).await?;
        }
        Ok(())
    }

    /// Parse a rule from a database row.
    fn parse_rule(row: &libsql::Row) -> Result<PointRule> {
        let id_str: String = row.get(0)?;
        let tenant_str: String = row.get(1)?;
        let key_str: String = row.get(2)?;
        let description: String = row.get(3)?;
        let points: i64 = row.get(4)?;
        let is_active: i64 = row.get(5)?;

        let key = RuleKey::parse(&key_str)
            .ok_or_else(|| StorageError::InvalidData(format!("invalid rule key: {}", key_str)))?;

        Ok(PointRule {
            id: RuleId(parse_uuid(&id_str, "rule id")?),
            tenant_id: TenantId(parse_uuid(&tenant_str, "tenant id")?),
            key,
            description,
            points,
            is_active: is_active != 0,
        })
    }

    /// Parse a ledger transaction from a database row.
    fn parse_transaction(row: &libsql::Row) -> Result<PointTransaction> {
        let id_str: String = row.get(0)?;
        let student_str: String = row.get(1)?;
        let amount: i64 = row.get(2)?;
        let reason: String = row.get(3)?;
        let source_str: String = row.get(4)?;
        let session_str: Option<String> = row.get(5)?;
        let awarded_by_str: Option<String> = row.get(6)?;
        let created_at_str: String = row.get(7)?;
        let reversed_at_str: Option<String> = row.get(8)?;

        let source_type = SourceType::parse(&source_str).ok_or_else(|| {
            StorageError::InvalidData(format!("invalid source type: {}", source_str))
        })?;

        Ok(PointTransaction {
            id: TransactionId(parse_uuid(&id_str, "transaction id")?),
            student_id: StudentId(parse_uuid(&student_str, "student id")?),
            amount,
            reason,
            source_type,
            session_id: session_str
                .as_deref()
                .map(|s| parse_uuid(s, "session id").map(SessionId))
                .transpose()?,
            awarded_by: awarded_by_str
                .as_deref()
                .map(|s| parse_uuid(s, "user id").map(UserId))
                .transpose()?,
            created_at: parse_datetime(&created_at_str)?,
            reversed_at: reversed_at_str
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }

    /// Parse an exam from a database row.
    fn parse_exam(row: &libsql::Row) -> Result<Exam> {
        let id_str: String = row.get(0)?;
        let tenant_str: String = row.get(1)?;
        let student_str: String = row.get(2)?;
        let examiner_str: Option<String> = row.get(3)?;
        let date_str: String = row.get(4)?;
        let juz_number: i64 = row.get(5)?;
        let attempt_number: i64 = row.get(6)?;
        let parts_json: String = row.get(7)?;
        let status_str: String = row.get(8)?;
        let current_part_score: Option<f64> = row.get(9)?;
        let cumulative_score: Option<f64> = row.get(10)?;
        let final_score: Option<f64> = row.get(11)?;
        let passed: Option<i64> = row.get(12)?;
        let notes: Option<String> = row.get(13)?;
        let created_at_str: String = row.get(14)?;
        let completed_at_str: Option<String> = row.get(15)?;
        let scoring_json: Option<String> = row.get(16)?;
        let reward_str: Option<String> = row.get(17)?;

        let status = ExamStatus::parse(&status_str)
            .ok_or_else(|| StorageError::InvalidData(format!("invalid status: {}", status_str)))?;
        let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
            .map_err(|_| StorageError::InvalidData(format!("invalid date: {}", date_str)))?;

        Ok(Exam {
            id: ExamId(parse_uuid(&id_str, "exam id")?),
            tenant_id: TenantId(parse_uuid(&tenant_str, "tenant id")?),
            student_id: StudentId(parse_uuid(&student_str, "student id")?),
            examiner_id: examiner_str
                .as_deref()
                .map(|s| parse_uuid(s, "examiner id").map(UserId))
                .transpose()?,
            date,
            juz_number: narrow(juz_number, "juz number")?,
            attempt_number: narrow(attempt_number, "attempt number")?,
            tested_parts: serde_json::from_str(&parts_json)?,
            status,
            current_part_score,
            cumulative_score,
            final_score,
            passed: passed.map(|v| v != 0),
            notes,
            created_at: parse_datetime(&created_at_str)?,
            completed_at: completed_at_str
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            scoring: scoring_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            reward_transaction_id: reward_str
                .as_deref()
                .map(|s| parse_uuid(s, "reward transaction id").map(TransactionId))
                .transpose()?,
        })
    }

    /// Parse an exam question from a database row.
    fn parse_question(row: &libsql::Row) -> Result<ExamQuestion> {
        let id_str: String = row.get(0)?;
        let exam_str: String = row.get(1)?;
        let type_str: String = row.get(2)?;
        let juz: Option<i64> = row.get(3)?;
        let mistakes: i64 = row.get(4)?;
        let max_score: i64 = row.get(5)?;
        let achieved: i64 = row.get(6)?;

        let question_type = QuestionType::parse(&type_str).ok_or_else(|| {
            StorageError::InvalidData(format!("invalid question type: {}", type_str))
        })?;

        Ok(ExamQuestion {
            id: QuestionId(parse_uuid(&id_str, "question id")?),
            exam_id: ExamId(parse_uuid(&exam_str, "exam id")?),
            question_type,
            question_juz_number: juz.map(|v| narrow(v, "juz number")).transpose()?,
            mistakes_count: narrow(mistakes, "mistakes count")?,
            max_score: narrow(max_score, "max score")?,
            achieved_score: narrow(achieved, "achieved score")?,
        })
    }

    async fn append_in(conn: &Connection, transaction: &PointTransaction) -> Result<i64> {
        conn.execute(
            &format!("INSERT INTO point_transactions ({TRANSACTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            libsql::params![
                transaction.id.to_string(),
                transaction.student_id.to_string(),
                transaction.amount,
                transaction.reason.clone(),
                transaction.source_type.as_str(),
                transaction.session_id.map(|id| id.to_string()),
                transaction.awarded_by.map(|id| id.to_string()),
                format_datetime(transaction.created_at),
                transaction.reversed_at.map(format_datetime)
            ],
        )
        .await?;
        conn.execute(
            "INSERT INTO student_aggregates (student_id, total_points) VALUES (?, ?) ON CONFLICT(student_id) DO UPDATE SET total_points = total_points + excluded.total_points",
            libsql::params![transaction.student_id.to_string(), transaction.amount],
        )
        .await?;
        Self::total_in(conn, transaction.student_id)
            .await
            .map(|total| total.unwrap_or_default())
    }

    async fn reverse_in(conn: &Connection, id: TransactionId, at: DateTime<Utc>) -> Result<Reversal> {
        let mut rows = conn
            .query(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM point_transactions WHERE id = ?"),
                [id.to_string()],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(Reversal::Missing);
        };
        let mut transaction = Self::parse_transaction(&row)?;
        if transaction.reversed_at.is_some() {
            return Ok(Reversal::AlreadyReversed);
        }

        conn.execute(
            "UPDATE point_transactions SET reversed_at = ? WHERE id = ?",
            libsql::params![format_datetime(at), id.to_string()],
        )
        .await?;
        conn.execute(
            "UPDATE student_aggregates SET total_points = total_points - ? WHERE student_id = ?",
            libsql::params![transaction.amount, transaction.student_id.to_string()],
        )
        .await?;
        transaction.reversed_at = Some(at);
        let total = Self::total_in(conn, transaction.student_id)
            .await?
            .unwrap_or_default();
        Ok(Reversal::Applied { transaction, total })
    }

    async fn rebuild_in(conn: &Connection, student: StudentId) -> Result<Rebuild> {
        let mut rows = conn
            .query(
                "SELECT COALESCE(SUM(amount), 0) FROM point_transactions WHERE student_id = ? AND reversed_at IS NULL",
                [student.to_string()],
            )
            .await?;
        let total: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        let previous = Self::total_in(conn, student).await?.unwrap_or_default();
        conn.execute(
            "INSERT INTO student_aggregates (student_id, total_points) VALUES (?, ?) ON CONFLICT(student_id) DO UPDATE SET total_points = excluded.total_points",
            libsql::params![student.to_string(), total],
        )
        .await?;
        Ok(Rebuild { previous, total })
    }

    async fn total_in(conn: &Connection, student: StudentId) -> Result<Option<i64>> {
        let mut rows = conn
            .query(
                "SELECT total_points FROM student_aggregates WHERE student_id = ?",
                [student.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RuleStore for TursoStore {
    #[instrument(skip(self), level = "debug")]
    async fn find_rule(&self, tenant: TenantId, key: RuleKey) -> Result<Option<PointRule>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM point_rules WHERE tenant_id = ? AND key = ?"),
                libsql::params![tenant.to_string(), key.as_str()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_rule(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_rules(&self, tenant: TenantId) -> Result<Vec<PointRule>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM point_rules WHERE tenant_id = ? ORDER BY key"),
                [tenant.to_string()],
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            rules.push(Self::parse_rule(&row)?);
        }
        Ok(rules)
    }

    #[instrument(skip(self, rule), level = "debug", fields(key = %rule.key))]
    async fn save_rule(&self, rule: &PointRule) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!("INSERT INTO point_rules ({RULE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT(tenant_id, key) DO UPDATE SET description = excluded.description, points = excluded.points, is_active = excluded.is_active"),
            libsql::params![
                rule.id.to_string(),
                rule.tenant_id.to_string(),
                rule.key.as_str(),
                rule.description.clone(),
                rule.points,
                i64::from(rule.is_active)
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for TursoStore {
    #[instrument(skip(self, transaction), level = "debug", fields(id = %transaction.id))]
    async fn append(&self, transaction: &PointTransaction) -> Result<i64> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await?;
        let result = Self::append_in(&tx, transaction).await;
        let total = finish(tx, result).await?;
        debug!(total, "transaction appended");
        Ok(total)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<PointTransaction>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM point_transactions WHERE id = ?"),
                [id.to_string()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_transaction(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn reverse(&self, id: TransactionId, at: DateTime<Utc>) -> Result<Reversal> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await?;
        let result = Self::reverse_in(&tx, id, at).await;
        finish(tx, result).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn aggregate(&self, student: StudentId) -> Result<Option<StudentAggregate>> {
        let conn = self.conn.lock().await;
        Ok(Self::total_in(&conn, student)
            .await?
            .map(|total_points| StudentAggregate {
                student_id: student,
                total_points,
            }))
    }

    #[instrument(skip(self), level = "debug")]
    async fn transactions(&self, student: StudentId) -> Result<Vec<PointTransaction>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM point_transactions WHERE student_id = ? ORDER BY id DESC"),
                [student.to_string()],
            )
            .await?;

        let mut transactions = Vec::new();
        while let Some(row) = rows.next().await? {
            transactions.push(Self::parse_transaction(&row)?);
        }
        Ok(transactions)
    }

    #[instrument(skip(self), level = "debug")]
    async fn rebuild_total(&self, student: StudentId) -> Result<Rebuild> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await?;
        let result = Self::rebuild_in(&tx, student).await;
        finish(tx, result).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn students(&self) -> Result<Vec<StudentId>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT student_id FROM student_aggregates UNION SELECT student_id FROM point_transactions ORDER BY student_id",
                (),
            )
            .await?;

        let mut students = Vec::new();
        while let Some(row) = rows.next().await? {
            let id_str: String = row.get(0)?;
            students.push(StudentId(parse_uuid(&id_str, "student id")?));
        }
        Ok(students)
    }
}

#[async_trait]
impl ExamStore for TursoStore {
    #[instrument(skip(self), level = "debug")]
    async fn count_attempts(&self, student: StudentId, juz_number: u8) -> Result<u32> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM exams WHERE student_id = ? AND juz_number = ?",
                libsql::params![student.to_string(), i64::from(juz_number)],
            )
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        narrow(count, "attempt count")
    }

    #[instrument(skip(self, exam), level = "debug", fields(id = %exam.id))]
    async fn insert_exam(&self, exam: &Exam) -> Result<()> {
        let parts_json = serde_json::to_string(&exam.tested_parts)?;
        let scoring_json = exam.scoring.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock().await;
        conn.execute(
            &format!("INSERT INTO exams ({EXAM_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            libsql::params![
                exam.id.to_string(),
                exam.tenant_id.to_string(),
                exam.student_id.to_string(),
                exam.examiner_id.map(|id| id.to_string()),
                exam.date.format(DATE_FORMAT).to_string(),
                i64::from(exam.juz_number),
                i64::from(exam.attempt_number),
                parts_json,
                exam.status.as_str(),
                exam.current_part_score,
                exam.cumulative_score,
                exam.final_score,
                exam.passed.map(i64::from),
                exam.notes.clone(),
                format_datetime(exam.created_at),
                exam.completed_at.map(format_datetime),
                scoring_json,
                exam.reward_transaction_id.map(|id| id.to_string())
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_exam(&self, id: ExamId) -> Result<Option<Exam>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?"),
                [id.to_string()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_exam(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_exams(&self, student: StudentId) -> Result<Vec<Exam>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {EXAM_COLUMNS} FROM exams WHERE student_id = ? ORDER BY id ASC"),
                [student.to_string()],
            )
            .await?;

        let mut exams = Vec::new();
        while let Some(row) = rows.next().await? {
            exams.push(Self::parse_exam(&row)?);
        }
        Ok(exams)
    }

    #[instrument(skip(self, exam), level = "debug", fields(id = %exam.id))]
    async fn complete_exam(&self, exam: &Exam) -> Result<bool> {
        let scoring_json = exam.scoring.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE exams SET status = ?, current_part_score = ?, cumulative_score = ?, final_score = ?, passed = ?, completed_at = ?, scoring = ? WHERE id = ? AND status = ?",
                libsql::params![
                    exam.status.as_str(),
                    exam.current_part_score,
                    exam.cumulative_score,
                    exam.final_score,
                    exam.passed.map(i64::from),
                    exam.completed_at.map(format_datetime),
                    scoring_json,
                    exam.id.to_string(),
                    ExamStatus::Pending.as_str()
                ],
            )
            .await?;
        Ok(changed == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn reserve_reward(&self, exam: ExamId, transaction: TransactionId) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE exams SET reward_transaction_id = ? WHERE id = ? AND status = ? AND reward_transaction_id IS NULL",
                libsql::params![
                    transaction.to_string(),
                    exam.to_string(),
                    ExamStatus::Completed.as_str()
                ],
            )
            .await?;
        Ok(changed == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn unsettled_exams(&self) -> Result<Vec<Exam>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EXAM_COLUMNS} FROM exams e WHERE e.status = ? AND NOT EXISTS (SELECT 1 FROM point_transactions t WHERE t.id = e.reward_transaction_id) ORDER BY e.id ASC"
                ),
                [ExamStatus::Completed.as_str()],
            )
            .await?;

        let mut exams = Vec::new();
        while let Some(row) = rows.next().await? {
            exams.push(Self::parse_exam(&row)?);
        }
        Ok(exams)
    }

    #[instrument(skip(self, question), level = "debug", fields(id = %question.id))]
    async fn insert_question(&self, question: &ExamQuestion) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!("INSERT INTO exam_questions ({QUESTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
            libsql::params![
                question.id.to_string(),
                question.exam_id.to_string(),
                question.question_type.as_str(),
                question.question_juz_number.map(i64::from),
                i64::from(question.mistakes_count),
                i64::from(question.max_score),
                i64::from(question.achieved_score)
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_question(&self, id: QuestionId) -> Result<Option<ExamQuestion>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {QUESTION_COLUMNS} FROM exam_questions WHERE id = ?"),
                [id.to_string()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_question(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn update_answer(&self, id: QuestionId, mistakes: u32, achieved: u32) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE exam_questions SET mistakes_count = ?, achieved_score = ? WHERE id = ?",
            libsql::params![i64::from(mistakes), i64::from(achieved), id.to_string()],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn questions(&self, exam: ExamId) -> Result<Vec<ExamQuestion>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {QUESTION_COLUMNS} FROM exam_questions WHERE exam_id = ? ORDER BY id ASC"),
                [exam.to_string()],
            )
            .await?;

        let mut questions = Vec::new();
        while let Some(row) = rows.next().await? {
            questions.push(Self::parse_question(&row)?);
        }
        Ok(questions)
    }
}

/// Commit after a successful write, roll back after a failed one.
///
/// A failed rollback is logged and the write's own error returned.
async fn finish<T>(tx: Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, original = %err, "rollback failed");
            }
            Err(err)
        }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a datetime for storage.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a datetime from storage.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidData(format!("invalid datetime: {}", s)))
}

fn parse_uuid(s: &str, what: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|_| StorageError::InvalidData(format!("invalid {}: {}", what, s)))
}

/// Convert a stored integer into a narrower column type.
fn narrow<T: TryFrom<i64>>(value: i64, what: &str) -> Result<T> {
    T::try_from(value).map_err(|_| StorageError::InvalidData(format!("invalid {}: {}", what, value)))
}
