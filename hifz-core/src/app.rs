//! Wiring of registry, ledger, exam engine and triggers over one store.

use std::sync::Arc;

use crate::config::HifzConfig;
use crate::error::Result;
use crate::exam::ExamScoringEngine;
use crate::ledger::LedgerService;
use crate::rules::RuleRegistry;
use crate::storage::{ExamStore, LedgerStore, RuleStore};
use crate::triggers::EventTriggers;

/// The assembled services.
pub struct Hifz {
    pub registry: RuleRegistry,
    pub ledger: Arc<LedgerService>,
    pub exams: Arc<ExamScoringEngine>,
    pub triggers: EventTriggers,
}

impl Hifz {
    /// Build every service on top of `store`.
    pub fn new<S>(store: Arc<S>, config: &HifzConfig) -> Result<Self>
    where
        S: RuleStore + LedgerStore + ExamStore + 'static,
    {
        let registry = RuleRegistry::new(store.clone());
        let ledger = Arc::new(LedgerService::new(registry.clone(), store.clone()));
        let exams = Arc::new(ExamScoringEngine::new(
            store,
            ledger.clone(),
            config.exam.clone(),
        )?);
        let triggers = EventTriggers::new(ledger.clone(), exams.clone());
        Ok(Self {
            registry,
            ledger,
            exams,
            triggers,
        })
    }
}
