//! Rule store port - persistence abstraction for rules

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Dimensions, Page, Rule, RuleFilter, RuleScope};

/// Check run against the stored siblings of a rule before it is persisted.
///
/// The siblings are the active rules in the same scope with the same
/// dimension signature, excluding the rule's own stored version.
pub type ConflictGuard = fn(&Rule, &[Rule]) -> Result<()>;

/// Persistence for rules.
///
/// Implementations must run `save_checked` as one atomic read-check-write so
/// two concurrent writers cannot both pass the guard against a stale view.
#[async_trait]
pub trait RuleStore: Send + Sync {
    // === Reads ===

    /// Get a rule by id, active or not
    async fn get_rule(&self, id: Uuid) -> Result<Option<Rule>>;

    /// Active rules in `scope` whose dimensions are unset or equal to the
    /// given values. The validity window is not checked.
    async fn find_candidates(&self, scope: &RuleScope, dimensions: &Dimensions)
        -> Result<Vec<Rule>>;

    /// One page of rules matching the filter
    async fn list_rules(&self, filter: &RuleFilter) -> Result<Page<Rule>>;

    /// Every stored rule (for audits)
    async fn all_rules(&self) -> Result<Vec<Rule>>;

    // === Writes ===

    /// Insert or replace `rule` after `guard` accepts it
    async fn save_checked(&self, rule: &Rule, guard: ConflictGuard) -> Result<()>;

    /// Soft-delete a rule. Returns the updated rule, or `None` if unknown.
    async fn set_inactive(
        &self,
        id: Uuid,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Rule>>;
}
