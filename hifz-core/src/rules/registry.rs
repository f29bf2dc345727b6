//! Rule resolution and administration.

use std::sync::Arc;

use tracing::{debug, info};

use super::{PointRule, RuleKey};
use crate::config::RuleDefaults;
use crate::error::{Error, Result};
use crate::storage::RuleStore;
use crate::types::TenantId;

/// Resolves outcome keys to point rules, always within one tenant.
#[derive(Clone)]
pub struct RuleRegistry {
    store: Arc<dyn RuleStore>,
}

impl RuleRegistry {
    /// Create a registry backed by the given store.
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Find the active rule for `key` in `tenant`.
    ///
    /// Inactive rules and other tenants' rules never match.
    pub async fn resolve(&self, tenant: TenantId, key: RuleKey) -> Result<PointRule> {
        match self.store.find_rule(tenant, key).await? {
            Some(rule) if rule.is_active => {
                debug!(%tenant, %key, points = rule.points, "resolved rule");
                Ok(rule)
            }
            _ => Err(Error::RuleNotFound { tenant, key }),
        }
    }

    /// Insert a rule or replace the points and description of the existing
    /// one. The stored rule is active afterwards.
    pub async fn upsert_rule(
        &self,
        tenant: TenantId,
        key: RuleKey,
        description: impl Into<String>,
        points: i64,
    ) -> Result<PointRule> {
        let rule = match self.store.find_rule(tenant, key).await? {
            Some(existing) => PointRule {
                description: description.into(),
                points,
                is_active: true,
                ..existing
            },
            None => PointRule::new(tenant, key, description.into(), points),
        };
        self.store.save_rule(&rule).await?;
        info!(%tenant, %key, points, "rule saved");
        Ok(rule)
    }

    /// Enable or disable an existing rule.
    pub async fn set_active(&self, tenant: TenantId, key: RuleKey, active: bool) -> Result<PointRule> {
        let mut rule = self
            .store
            .find_rule(tenant, key)
            .await?
            .ok_or_else(|| Error::not_found("rule", format!("{tenant}/{key}")))?;
        rule.is_active = active;
        self.store.save_rule(&rule).await?;
        info!(%tenant, %key, active, "rule activation changed");
        Ok(rule)
    }

    /// All rules of a tenant, ordered by key.
    pub async fn list_rules(&self, tenant: TenantId) -> Result<Vec<PointRule>> {
        let mut rules = self.store.list_rules(tenant).await?;
        rules.sort_by_key(|rule| rule.key);
        Ok(rules)
    }

    /// Insert a rule for every catalog key the tenant does not have yet.
    ///
    /// Existing rules, active or not, are left alone. Returns the number of
    /// rules inserted.
    pub async fn seed_defaults(&self, tenant: TenantId, defaults: &RuleDefaults) -> Result<usize> {
        let mut inserted = 0;
        for key in RuleKey::ALL {
            if self.store.find_rule(tenant, key).await?.is_some() {
                continue;
            }
            let rule = PointRule::new(tenant, key, default_description(key), defaults.points_for(key));
            self.store.save_rule(&rule).await?;
            inserted += 1;
        }
        info!(%tenant, inserted, "seeded default rules");
        Ok(inserted)
    }
}

fn default_description(key: RuleKey) -> String {
    let text = match key {
        RuleKey::RecitationExcellent => "Excellent recitation",
        RuleKey::RecitationVeryGood => "Very good recitation",
        RuleKey::RecitationGood => "Good recitation",
        RuleKey::RecitationAcceptable => "Acceptable recitation",
        RuleKey::RecitationPoor => "Poor recitation",
        RuleKey::AttendancePresent => "Present at session",
        RuleKey::AttendanceLate => "Late to session",
        RuleKey::AttendanceAbsent => "Absent from session",
        RuleKey::AttendanceExcused => "Excused absence",
        RuleKey::ExamPassed => "Passed memorization exam",
        RuleKey::ExamFailed => "Failed memorization exam",
    };
    text.to_string()
}
