//! Exam lifecycle: creation, questions, answers and completion.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{
    CreateExam, Exam, ExamQuestion, ExamStatus, QuestionType, ScoreCard, score_questions,
    validate_juz,
};
use crate::config::ExamScoringConfig;
use crate::error::{Error, Result};
use crate::ledger::{AmountSource, AwardRequest, LedgerService, PointTransaction, SourceType};
use crate::locks::KeyedLocks;
use crate::rules::RuleKey;
use crate::storage::ExamStore;
use crate::types::{ExamId, QuestionId, StudentId, TransactionId};

/// What happened to the ledger reward after an exam completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RewardOutcome {
    /// A ledger entry was posted.
    Awarded(PointTransaction),
    /// The result carries no reward under the exam's scoring policy.
    NotEligible,
    /// The award failed; the exam stays completed and the reward is retried
    /// by the repair job.
    Pending { reason: String },
}

/// Result of [`ExamScoringEngine::complete`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub exam: Exam,
    pub reward: RewardOutcome,
}

/// Manages exams from creation to their single completion.
///
/// Mutations of one exam are serialized on that exam's lock. Creation is
/// serialized per student and juz so attempt numbers never repeat.
pub struct ExamScoringEngine {
    store: Arc<dyn ExamStore>,
    ledger: Arc<LedgerService>,
    config: ExamScoringConfig,
    exam_locks: KeyedLocks<ExamId>,
    attempt_locks: KeyedLocks<(StudentId, u8)>,
}

impl ExamScoringEngine {
    /// Create an engine. Fails if the scoring configuration is unusable.
    pub fn new(
        store: Arc<dyn ExamStore>,
        ledger: Arc<LedgerService>,
        config: ExamScoringConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            ledger,
            config,
            exam_locks: KeyedLocks::new(),
            attempt_locks: KeyedLocks::new(),
        })
    }

    /// The scoring configuration in effect.
    pub fn config(&self) -> &ExamScoringConfig {
        &self.config
    }

    /// Open a pending exam with the next attempt number for this student
    /// and juz.
    #[instrument(skip(self, cmd), fields(student = %cmd.student_id, juz = cmd.juz_number))]
    pub async fn create_exam(&self, cmd: CreateExam) -> Result<Exam> {
        validate_juz(cmd.juz_number)?;
        if cmd.tested_parts.is_empty() {
            return Err(Error::validation("tested parts must not be empty"));
        }
        for &part in &cmd.tested_parts {
            validate_juz(part)?;
        }

        let _guard = self.attempt_locks.lock((cmd.student_id, cmd.juz_number)).await;
        let prior = self.store.count_attempts(cmd.student_id, cmd.juz_number).await?;
        let now = Utc::now();
        let exam = Exam {
            id: ExamId::new(),
            tenant_id: cmd.tenant_id,
            student_id: cmd.student_id,
            examiner_id: cmd.examiner_id,
            date: cmd.date.unwrap_or_else(|| now.date_naive()),
            juz_number: cmd.juz_number,
            attempt_number: prior + 1,
            tested_parts: cmd.tested_parts,
            status: ExamStatus::Pending,
            current_part_score: None,
            cumulative_score: None,
            final_score: None,
            passed: None,
            notes: cmd.notes,
            created_at: now,
            completed_at: None,
            scoring: None,
            reward_transaction_id: None,
        };
        self.store.insert_exam(&exam).await?;
        info!(exam = %exam.id, attempt = exam.attempt_number, "exam created");
        Ok(exam)
    }

    /// Add an unanswered question to a pending exam.
    ///
    /// Current-part questions test the exam's own juz. Cumulative questions
    /// must name one of the exam's tested parts.
    #[instrument(skip(self))]
    pub async fn add_question(
        &self,
        exam_id: ExamId,
        question_type: QuestionType,
        question_juz_number: Option<u8>,
        max_score: u32,
    ) -> Result<ExamQuestion> {
        if max_score == 0 {
            return Err(Error::validation("max score must be positive"));
        }

        let _guard = self.exam_locks.lock(exam_id).await;
        let exam = self.load_exam(exam_id).await?;
        exam.ensure_pending("add a question to")?;

        let juz = match question_type {
            QuestionType::CurrentPart => match question_juz_number {
                None => exam.juz_number,
                Some(juz) if juz == exam.juz_number => juz,
                Some(juz) => {
                    return Err(Error::validation(format!(
                        "current-part question names juz {juz} but exam tests juz {}",
                        exam.juz_number
                    )));
                }
            },
            QuestionType::Cumulative => {
                let juz = question_juz_number.ok_or_else(|| {
                    Error::validation("cumulative question requires a juz number")
                })?;
                if !exam.tested_parts.contains(&juz) {
                    return Err(Error::validation(format!(
                        "juz {juz} is not among the exam's tested parts"
                    )));
                }
                juz
            }
        };

        let question = ExamQuestion {
            id: QuestionId::new(),
            exam_id,
            question_type,
            question_juz_number: Some(juz),
            mistakes_count: 0,
            max_score,
            achieved_score: 0,
        };
        self.store.insert_question(&question).await?;
        Ok(question)
    }

    /// Record the examiner's marking for a question of a pending exam.
    #[instrument(skip(self))]
    pub async fn record_answer(
        &self,
        question_id: QuestionId,
        mistakes_count: u32,
        achieved_score: u32,
    ) -> Result<ExamQuestion> {
        let exam_id = self.load_question(question_id).await?.exam_id;

        let _guard = self.exam_locks.lock(exam_id).await;
        let exam = self.load_exam(exam_id).await?;
        exam.ensure_pending("record an answer on")?;

        let mut question = self.load_question(question_id).await?;
        if achieved_score > question.max_score {
            return Err(Error::ScoreOutOfRange {
                achieved: achieved_score,
                max: question.max_score,
            });
        }
        self.store
            .update_answer(question_id, mistakes_count, achieved_score)
            .await?;
        question.mistakes_count = mistakes_count;
        question.achieved_score = achieved_score;
        Ok(question)
    }

    /// Score and complete a pending exam, then post its reward.
    ///
    /// The reward is best effort: if it fails the exam still completes and
    /// the outcome reports [`RewardOutcome::Pending`]. Pending rewards are
    /// posted later by [`retry_reward`](Self::retry_reward) or
    /// [`settle_pending_rewards`](Self::settle_pending_rewards).
    #[instrument(skip(self))]
    pub async fn complete(&self, exam_id: ExamId) -> Result<CompletionOutcome> {
        let _guard = self.exam_locks.lock(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        exam.ensure_pending("complete")?;

        let questions = self.store.questions(exam_id).await?;
        let card = score_questions(&questions, &self.config)?;
        exam.status = ExamStatus::Completed;
        exam.current_part_score = card.current_part_score;
        exam.cumulative_score = card.cumulative_score;
        exam.final_score = Some(card.final_score);
        exam.passed = Some(card.passed);
        exam.completed_at = Some(Utc::now());
        exam.scoring = Some(self.config.clone());

        if !self.store.complete_exam(&exam).await? {
            return Err(Error::InvalidTransition {
                status: ExamStatus::Completed,
                action: "complete",
            });
        }
        info!(
            exam = %exam.id,
            final_score = card.final_score,
            passed = card.passed,
            "exam completed"
        );

        let reward = self.settle_reward(&mut exam).await;
        Ok(CompletionOutcome { exam, reward })
    }

    /// Post the reward of a completed exam if it is still outstanding.
    ///
    /// Repeating this never posts a second entry. An already settled reward
    /// is returned as [`RewardOutcome::Awarded`] with its existing
    /// transaction, even if that transaction was reversed since.
    #[instrument(skip(self))]
    pub async fn retry_reward(&self, exam_id: ExamId) -> Result<RewardOutcome> {
        let _guard = self.exam_locks.lock(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        if exam.is_pending() {
            return Err(Error::InvalidTransition {
                status: exam.status,
                action: "reward",
            });
        }
        Ok(self.settle_reward(&mut exam).await)
    }

    /// Retry the reward of every completed exam that is owed one.
    ///
    /// Returns each eligible exam visited with its outcome. Exams whose
    /// result carries no reward are skipped.
    pub async fn settle_pending_rewards(&self) -> Result<Vec<(ExamId, RewardOutcome)>> {
        let mut settled = Vec::new();
        for exam in self.store.unsettled_exams().await? {
            if self.reward_key(&exam).is_none() {
                continue;
            }
            let outcome = self.retry_reward(exam.id).await?;
            settled.push((exam.id, outcome));
        }
        info!(visited = settled.len(), "settled pending exam rewards");
        Ok(settled)
    }

    /// Recompute the score card of a completed exam from its frozen
    /// questions without changing anything.
    ///
    /// Uses the weights and threshold the exam was completed under, so the
    /// result does not move when the engine's configuration changes.
    pub async fn rescore(&self, exam_id: ExamId) -> Result<ScoreCard> {
        let exam = self.load_exam(exam_id).await?;
        if exam.is_pending() {
            return Err(Error::InvalidTransition {
                status: exam.status,
                action: "rescore",
            });
        }
        let questions = self.store.questions(exam_id).await?;
        score_questions(&questions, self.scoring_for(&exam))
    }

    /// Get an exam by ID.
    pub async fn get_exam(&self, exam_id: ExamId) -> Result<Exam> {
        self.load_exam(exam_id).await
    }

    /// Questions of an exam in creation order.
    pub async fn questions(&self, exam_id: ExamId) -> Result<Vec<ExamQuestion>> {
        self.load_exam(exam_id).await?;
        Ok(self.store.questions(exam_id).await?)
    }

    /// All exams of a student, oldest first.
    pub async fn list_exams(&self, student: StudentId) -> Result<Vec<Exam>> {
        Ok(self.store.list_exams(student).await?)
    }

    /// Policy for an exam: the one it was completed under, else the
    /// engine's own.
    fn scoring_for<'a>(&'a self, exam: &'a Exam) -> &'a ExamScoringConfig {
        exam.scoring.as_ref().unwrap_or(&self.config)
    }

    fn reward_key(&self, exam: &Exam) -> Option<RuleKey> {
        match exam.passed {
            Some(true) => Some(RuleKey::ExamPassed),
            Some(false) if self.scoring_for(exam).award_on_fail => Some(RuleKey::ExamFailed),
            Some(false) | None => None,
        }
    }

    /// Must run under the exam's lock.
    async fn settle_reward(&self, exam: &mut Exam) -> RewardOutcome {
        let Some(key) = self.reward_key(exam) else {
            return RewardOutcome::NotEligible;
        };
        match self.post_reward(exam, key).await {
            Ok(transaction) => RewardOutcome::Awarded(transaction),
            Err(err) => {
                warn!(exam = %exam.id, %key, error = %err, "exam completed but reward is pending");
                RewardOutcome::Pending {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn post_reward(&self, exam: &mut Exam, key: RuleKey) -> Result<PointTransaction> {
        let id = match exam.reward_transaction_id {
            Some(id) => {
                if let Some(existing) = self.ledger.find_transaction(id).await? {
                    return Ok(existing);
                }
                id
            }
            None => {
                let id = TransactionId::new();
                if !self.store.reserve_reward(exam.id, id).await? {
                    return Err(Error::InvalidTransition {
                        status: exam.status,
                        action: "reserve a reward for",
                    });
                }
                exam.reward_transaction_id = Some(id);
                id
            }
        };

        let request = AwardRequest {
            student_id: exam.student_id,
            tenant_id: exam.tenant_id,
            source_type: SourceType::Exam,
            amount: AmountSource::Rule(key),
            reason: format!(
                "Juz {} exam attempt {}: {:.2}",
                exam.juz_number,
                exam.attempt_number,
                exam.final_score.unwrap_or_default()
            ),
            session_id: None,
            awarded_by: exam.examiner_id,
        };
        self.ledger.award_with_id(id, request).await
    }

    async fn load_exam(&self, exam_id: ExamId) -> Result<Exam> {
        self.store
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| Error::not_found("exam", exam_id))
    }

    async fn load_question(&self, question_id: QuestionId) -> Result<ExamQuestion> {
        self.store
            .get_question(question_id)
            .await?
            .ok_or_else(|| Error::not_found("question", question_id))
    }
}
