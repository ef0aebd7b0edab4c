//! Rule service - validated, conflict-guarded rule writes

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{check_conflicts, Page, ReferenceKind, Rule, RuleDraft, RuleFilter};
use crate::ports::{ReferenceLookup, RuleStore};
use crate::services::{LogEvent, LoggingService};

/// Service for creating, updating and retiring rules
pub struct RuleService {
    store: Arc<dyn RuleStore>,
    references: Option<Arc<dyn ReferenceLookup>>,
    logger: Option<Arc<LoggingService>>,
}

impl RuleService {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            store,
            references: None,
            logger: None,
        }
    }

    /// Check every referenced id against `lookup` before writing
    pub fn with_reference_validation(mut self, lookup: Arc<dyn ReferenceLookup>) -> Self {
        self.references = Some(lookup);
        self
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Create a rule, or update the one named by `draft.id`.
    ///
    /// Priority is always recomputed from the submitted dimensions.
    pub async fn upsert(&self, draft: RuleDraft, actor: Option<&str>) -> Result<Rule> {
        let existing = match draft.id {
            Some(id) => Some(
                self.store
                    .get_rule(id)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("rule {}", id)))?,
            ),
            None => None,
        };

        let rule = draft.into_rule(existing.as_ref(), actor, Utc::now().trunc_subsecs(6))?;
        self.validate_references(&rule).await?;
        self.save(&rule).await?;

        let event = if existing.is_some() {
            "rule_updated"
        } else {
            "rule_created"
        };
        self.log(
            LogEvent::new(event)
                .with_business_unit(&rule.business_unit)
                .with_rule(rule.id),
        );
        Ok(rule)
    }

    /// Soft-delete a rule
    pub async fn deactivate(&self, id: Uuid, actor: Option<&str>) -> Result<Rule> {
        let rule = self
            .store
            .set_inactive(id, actor, Utc::now().trunc_subsecs(6))
            .await?
            .ok_or_else(|| Error::not_found(format!("rule {}", id)))?;

        self.log(
            LogEvent::new("rule_deactivated")
                .with_business_unit(&rule.business_unit)
                .with_rule(rule.id),
        );
        Ok(rule)
    }

    /// Turn a rule back on. References and the conflict guard are checked
    /// again since either may have changed in the meantime.
    pub async fn reactivate(&self, id: Uuid, actor: Option<&str>) -> Result<Rule> {
        let mut rule = self.get(id).await?;
        if rule.is_active {
            return Ok(rule);
        }

        self.validate_references(&rule).await?;

        rule.is_active = true;
        rule.updated_by = actor.map(str::to_string);
        rule.updated_at = Utc::now().trunc_subsecs(6);
        self.save(&rule).await?;

        self.log(
            LogEvent::new("rule_reactivated")
                .with_business_unit(&rule.business_unit)
                .with_rule(rule.id),
        );
        Ok(rule)
    }

    pub async fn get(&self, id: Uuid) -> Result<Rule> {
        self.store
            .get_rule(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("rule {}", id)))
    }

    pub async fn list(&self, filter: &RuleFilter) -> Result<Page<Rule>> {
        filter.validate()?;
        self.store.list_rules(filter).await
    }

    async fn save(&self, rule: &Rule) -> Result<()> {
        match self.store.save_checked(rule, check_conflicts).await {
            Err(Error::Conflict { existing, message }) => {
                self.log(
                    LogEvent::new("rule_conflict_rejected")
                        .with_business_unit(&rule.business_unit)
                        .with_rule(rule.id)
                        .with_error(&message)
                        .with_error_details(format!("conflicts with {}", existing)),
                );
                Err(Error::Conflict { existing, message })
            }
            other => other,
        }
    }

    async fn validate_references(&self, rule: &Rule) -> Result<()> {
        let Some(lookup) = &self.references else {
            return Ok(());
        };

        let mut wanted = vec![(ReferenceKind::Hospital, rule.hospital)];
        if let Some(doctor) = rule.doctor() {
            wanted.push((ReferenceKind::Doctor, doctor));
        }
        if let Some(id) = rule.dimensions.payment_type {
            wanted.push((ReferenceKind::PaymentType, id));
        }
        if let Some(id) = rule.dimensions.surgical_category {
            wanted.push((ReferenceKind::SurgicalCategory, id));
        }
        if let Some(id) = rule.dimensions.procedure {
            wanted.push((ReferenceKind::Procedure, id));
        }

        for (kind, id) in wanted {
            let usable = lookup
                .find_reference(kind, id)
                .await?
                .is_some_and(|r| r.usable_in(&rule.business_unit));
            if !usable {
                return Err(Error::validation(
                    kind.field(),
                    format!("unknown {} {} in business unit {}", kind, id, rule.business_unit),
                ));
            }
        }
        Ok(())
    }

    /// Logging never fails an operation
    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            let _ = logger.log(event);
        }
    }
}
