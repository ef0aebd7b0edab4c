//! In-memory store implementing the same ports as the DuckDB repository

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Dimensions, Page, Reference, ReferenceKind, Rule, RuleFilter, RuleScope};
use crate::ports::{ConflictGuard, ReferenceLookup, ReferenceRegistry, RuleStore};

#[derive(Debug, Default)]
struct State {
    rules: HashMap<Uuid, Rule>,
    references: HashMap<Uuid, Reference>,
}

/// Mutex-guarded maps; one lock covers the read-check-write of `save_checked`
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Insert a rule without running any guard (for seeding test fixtures)
    pub fn insert_unchecked(&self, rule: Rule) -> Result<()> {
        self.state()?.rules.insert(rule.id, rule);
        Ok(())
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn get_rule(&self, id: Uuid) -> Result<Option<Rule>> {
        Ok(self.state()?.rules.get(&id).cloned())
    }

    async fn find_candidates(
        &self,
        scope: &RuleScope,
        dimensions: &Dimensions,
    ) -> Result<Vec<Rule>> {
        let state = self.state()?;
        let mut found: Vec<Rule> = state
            .rules
            .values()
            .filter(|r| r.is_active && &r.scope() == scope && r.dimensions.accepts(dimensions))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        Ok(found)
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Page<Rule>> {
        filter.validate()?;
        let state = self.state()?;
        let mut matching: Vec<&Rule> = state
            .rules
            .values()
            .filter(|r| {
                filter
                    .business_unit
                    .as_ref()
                    .map_or(true, |bu| &r.business_unit == bu)
                    && filter.hospital.map_or(true, |h| r.hospital == h)
                    && filter.kind.map_or(true, |k| r.kind() == k)
                    && (filter.include_inactive || r.is_active)
            })
            .collect();
        matching.sort_by(|a, b| {
            a.hospital
                .to_string()
                .cmp(&b.hospital.to_string())
                .then_with(|| b.priority().cmp(&a.priority()))
                .then_with(|| a.validity.from().cmp(&b.validity.from()))
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .cloned()
            .collect();
        Ok(Page {
            items,
            page: filter.page,
            page_size: filter.page_size,
            total,
        })
    }

    async fn all_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.state()?.rules.values().cloned().collect())
    }

    async fn save_checked(&self, rule: &Rule, guard: ConflictGuard) -> Result<()> {
        let mut state = self.state()?;
        let siblings: Vec<Rule> = state
            .rules
            .values()
            .filter(|r| r.id != rule.id && r.is_active && r.same_signature(rule))
            .cloned()
            .collect();
        guard(rule, &siblings)?;

        let mut stored = rule.clone();
        if let Some(existing) = state.rules.get(&rule.id) {
            stored.created_at = existing.created_at;
            stored.created_by = existing.created_by.clone();
        }
        state.rules.insert(stored.id, stored);
        Ok(())
    }

    async fn set_inactive(
        &self,
        id: Uuid,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Rule>> {
        let mut state = self.state()?;
        Ok(state.rules.get_mut(&id).map(|rule| {
            rule.is_active = false;
            rule.updated_by = actor.map(str::to_string);
            rule.updated_at = at;
            rule.clone()
        }))
    }
}

#[async_trait]
impl ReferenceLookup for InMemoryStore {
    async fn find_reference(&self, kind: ReferenceKind, id: Uuid) -> Result<Option<Reference>> {
        Ok(self
            .state()?
            .references
            .get(&id)
            .filter(|r| r.kind == kind)
            .cloned())
    }
}

#[async_trait]
impl ReferenceRegistry for InMemoryStore {
    async fn save_reference(&self, reference: &Reference) -> Result<()> {
        let mut state = self.state()?;
        let duplicate = state.references.values().any(|r| {
            r.id != reference.id
                && r.kind == reference.kind
                && r.business_unit == reference.business_unit
                && r.code == reference.code
        });
        if duplicate {
            return Err(Error::validation(
                "code",
                format!(
                    "{} code '{}' already exists in {}",
                    reference.kind, reference.code, reference.business_unit
                ),
            ));
        }
        state.references.insert(reference.id, reference.clone());
        Ok(())
    }

    async fn list_references(
        &self,
        kind: Option<ReferenceKind>,
        business_unit: Option<&str>,
    ) -> Result<Vec<Reference>> {
        let state = self.state()?;
        let mut refs: Vec<Reference> = state
            .references
            .values()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .filter(|r| business_unit.map_or(true, |bu| r.business_unit == bu))
            .cloned()
            .collect();
        refs.sort_by(|a, b| {
            (a.kind.as_str(), &a.business_unit, &a.code).cmp(&(b.kind.as_str(), &b.business_unit, &b.code))
        });
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{check_conflicts, ValidityWindow};

    fn rule(hospital: Uuid, from: (i32, u32, u32), to: (i32, u32, u32)) -> Rule {
        let window = ValidityWindow::new(
            NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap(),
            NaiveDate::from_ymd_opt(to.0, to.1, to.2).unwrap(),
        )
        .unwrap();
        Rule::credit_note("BU", hospital, Dimensions::any(), Decimal::new(5, 0), window).unwrap()
    }

    #[tokio::test]
    async fn test_save_checked_runs_guard_against_siblings() {
        let store = InMemoryStore::new();
        let h = Uuid::new_v4();
        let first = rule(h, (2024, 1, 1), (2024, 6, 1));
        store.save_checked(&first, check_conflicts).await.unwrap();

        let overlapping = rule(h, (2024, 3, 1), (2024, 9, 1));
        assert!(store.save_checked(&overlapping, check_conflicts).await.is_err());

        let adjacent = rule(h, (2024, 6, 1), (2024, 9, 1));
        store.save_checked(&adjacent, check_conflicts).await.unwrap();
        assert_eq!(store.all_rules().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_creation_audit() {
        let store = InMemoryStore::new();
        let mut r = rule(Uuid::new_v4(), (2024, 1, 1), (2024, 6, 1));
        r.created_by = Some("alice".to_string());
        store.save_checked(&r, check_conflicts).await.unwrap();

        let mut edited = r.clone();
        edited.created_by = None;
        edited.updated_by = Some("bob".to_string());
        store.save_checked(&edited, check_conflicts).await.unwrap();

        let stored = store.get_rule(r.id).await.unwrap().unwrap();
        assert_eq!(stored.created_by.as_deref(), Some("alice"));
        assert_eq!(stored.updated_by.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_list_pages() {
        let store = InMemoryStore::new();
        let h = Uuid::new_v4();
        for year in 2000..2005 {
            store
                .save_checked(&rule(h, (year, 1, 1), (year + 1, 1, 1)), check_conflicts)
                .await
                .unwrap();
        }
        let filter = RuleFilter {
            page: 2,
            page_size: 2,
            ..Default::default()
        };
        let page = store.list_rules(&filter).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].validity.from(), NaiveDate::from_ymd_opt(2002, 1, 1).unwrap());
    }
}
