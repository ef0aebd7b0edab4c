//! Resolution service - picks the applicable rule for a billing query
//!
//! Read-only: the pipeline is candidate lookup, date filter, then ranking. It
//! takes no locks of its own and may run from any number of tasks at once.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{filter_applicable, select, ResolutionQuery, ResolvedRule, Rule, ValidityWindow};
use crate::ports::RuleStore;
use crate::services::{LogEvent, LoggingService};

/// One dimension-compatible candidate as seen by [`ResolutionService::explain`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTrace {
    pub rule_id: Uuid,
    pub priority: i32,
    pub pattern: String,
    pub value: String,
    #[serde(flatten)]
    pub validity: ValidityWindow,
    pub valid_on_date: bool,
}

impl CandidateTrace {
    fn from_rule(rule: &Rule, date: NaiveDate) -> Self {
        Self {
            rule_id: rule.id,
            priority: rule.priority(),
            pattern: rule.dimensions.describe(),
            value: rule.value.describe(),
            validity: rule.validity,
            valid_on_date: rule.is_valid_on(date),
        }
    }
}

/// Full account of how a query was resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionTrace {
    pub query: ResolutionQuery,
    pub evaluation_date: NaiveDate,
    /// Ranked best first; includes candidates outside their validity window
    pub candidates: Vec<CandidateTrace>,
    pub resolved: Option<ResolvedRule>,
}

/// Service answering "which rule applies?"
pub struct ResolutionService {
    store: Arc<dyn RuleStore>,
    logger: Option<Arc<LoggingService>>,
}

impl ResolutionService {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            store,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Resolve the single most specific rule for `query` on `date` (today if
    /// omitted). `Ok(None)` means no rule applies.
    pub async fn resolve(
        &self,
        query: &ResolutionQuery,
        date: Option<NaiveDate>,
    ) -> Result<Option<ResolvedRule>> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let scope = query.scope()?;
        let candidates = self.store.find_candidates(&scope, &query.dimensions).await?;
        let resolved = select(filter_applicable(candidates, &query.dimensions, date), date);

        self.report(query, resolved.as_ref());
        Ok(resolved)
    }

    /// Like [`resolve`](Self::resolve), also returning every candidate that
    /// matched the dimensions and whether its window covered the date
    pub async fn explain(
        &self,
        query: &ResolutionQuery,
        date: Option<NaiveDate>,
    ) -> Result<ResolutionTrace> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let scope = query.scope()?;
        let mut candidates: Vec<Rule> = self
            .store
            .find_candidates(&scope, &query.dimensions)
            .await?
            .into_iter()
            .filter(|r| r.dimensions.accepts(&query.dimensions))
            .collect();
        candidates.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| b.is_valid_on(date).cmp(&a.is_valid_on(date)))
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });

        let traces = candidates
            .iter()
            .map(|r| CandidateTrace::from_rule(r, date))
            .collect();
        let resolved = select(filter_applicable(candidates, &query.dimensions, date), date);

        self.report(query, resolved.as_ref());
        Ok(ResolutionTrace {
            query: query.clone(),
            evaluation_date: date,
            candidates: traces,
            resolved,
        })
    }

    fn report(&self, query: &ResolutionQuery, resolved: Option<&ResolvedRule>) {
        let Some(logger) = &self.logger else {
            return;
        };
        let event = match resolved {
            None => LogEvent::new("resolution_not_found").with_business_unit(&query.business_unit),
            Some(r) if r.is_ambiguous() => {
                let tied: Vec<String> = r.tied_with.iter().map(Uuid::to_string).collect();
                LogEvent::new("resolution_tie")
                    .with_business_unit(&query.business_unit)
                    .with_rule(r.rule.id)
                    .with_error(format!(
                        "{} rules share priority {}",
                        r.tied_with.len() + 1,
                        r.rule.priority()
                    ))
                    .with_error_details(format!("tied with {}", tied.join(", ")))
            }
            Some(_) => return,
        };
        let _ = logger.log(event);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::result::Error;
    use crate::domain::{ChargeType, Dimensions, RuleKind};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn credit(hospital: Uuid, dims: Dimensions, from: NaiveDate, to: NaiveDate) -> Rule {
        Rule::credit_note(
            "BU",
            hospital,
            dims,
            Decimal::new(5, 0),
            ValidityWindow::new(from, to).unwrap(),
        )
        .unwrap()
    }

    fn setup(rules: Vec<Rule>) -> ResolutionService {
        let store = Arc::new(InMemoryStore::new());
        for rule in rules {
            store.insert_unchecked(rule).unwrap();
        }
        ResolutionService::new(store)
    }

    #[tokio::test]
    async fn test_procedure_rule_beats_hospital_wide() {
        let h = Uuid::new_v4();
        let p = Uuid::new_v4();
        let r1 = credit(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        let r2 = credit(h, Dimensions::any().with_procedure(p), d(2024, 1, 1), d(2025, 1, 1));
        let service = setup(vec![r1.clone(), r2.clone()]);

        let hit = service
            .resolve(&ResolutionQuery::credit_note("BU", h).with_procedure(p), Some(d(2024, 5, 1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.rule.id, r2.id);

        let other = service
            .resolve(
                &ResolutionQuery::credit_note("BU", h).with_procedure(Uuid::new_v4()),
                Some(d(2024, 5, 1)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.rule.id, r1.id);
    }

    #[tokio::test]
    async fn test_no_rule_is_none_not_error() {
        let service = setup(vec![]);
        let result = service
            .resolve(&ResolutionQuery::credit_note("BU", Uuid::new_v4()), None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_missing_anchor_is_invalid_query() {
        let service = setup(vec![]);
        let query = ResolutionQuery::new(RuleKind::CreditNote, "BU");
        assert!(matches!(
            service.resolve(&query, None).await,
            Err(Error::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_credit_note_query_with_doctor_resolves() {
        let h = Uuid::new_v4();
        let rule = credit(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        let service = setup(vec![rule.clone()]);

        let query = ResolutionQuery::credit_note("BU", h).with_doctor(Uuid::new_v4());
        let hit = service.resolve(&query, Some(d(2024, 5, 1))).await.unwrap().unwrap();
        assert_eq!(hit.rule.id, rule.id);
    }

    #[tokio::test]
    async fn test_historical_date() {
        let h = Uuid::new_v4();
        let old = credit(h, Dimensions::any(), d(2023, 1, 1), d(2024, 1, 1));
        let service = setup(vec![old.clone()]);
        let query = ResolutionQuery::credit_note("BU", h);

        assert_eq!(
            service.resolve(&query, Some(d(2023, 12, 31))).await.unwrap().unwrap().rule.id,
            old.id
        );
        assert!(service.resolve(&query, Some(d(2024, 1, 1))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assignment_scoped_to_doctor() {
        let h = Uuid::new_v4();
        let doctor = Uuid::new_v4();
        let window = ValidityWindow::new(d(2024, 1, 1), d(2025, 1, 1)).unwrap();
        let rule = Rule::doctor_assignment(
            "BU",
            h,
            doctor,
            Dimensions::any(),
            ChargeType::Percentage,
            Decimal::new(15, 0),
            window,
        )
        .unwrap();
        let service = setup(vec![rule.clone()]);

        let mine = ResolutionQuery::doctor_assignment("BU", h, doctor);
        let theirs = ResolutionQuery::doctor_assignment("BU", h, Uuid::new_v4());
        assert!(service.resolve(&mine, Some(d(2024, 2, 1))).await.unwrap().is_some());
        assert!(service.resolve(&theirs, Some(d(2024, 2, 1))).await.unwrap().is_none());

        // Credit-note queries never see assignment rules
        let credit_query = ResolutionQuery::credit_note("BU", h);
        assert!(service.resolve(&credit_query, Some(d(2024, 2, 1))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tie_is_reported() {
        let h = Uuid::new_v4();
        let mut a = credit(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        let b = credit(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        a.updated_at = b.updated_at - Duration::hours(1);
        let service = setup(vec![a.clone(), b.clone()]);

        let resolved = service
            .resolve(&ResolutionQuery::credit_note("BU", h), Some(d(2024, 3, 1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.rule.id, b.id);
        assert_eq!(resolved.tied_with, vec![a.id]);
    }

    #[tokio::test]
    async fn test_explain_lists_expired_candidates() {
        let h = Uuid::new_v4();
        let p = Uuid::new_v4();
        let expired = credit(h, Dimensions::any().with_procedure(p), d(2023, 1, 1), d(2024, 1, 1));
        let current = credit(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        let service = setup(vec![expired.clone(), current.clone()]);

        let trace = service
            .explain(&ResolutionQuery::credit_note("BU", h).with_procedure(p), Some(d(2024, 6, 1)))
            .await
            .unwrap();
        assert_eq!(trace.candidates.len(), 2);
        assert_eq!(trace.candidates[0].rule_id, expired.id);
        assert!(!trace.candidates[0].valid_on_date);
        assert_eq!(trace.resolved.unwrap().rule.id, current.id);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let h = Uuid::new_v4();
        let rules: Vec<Rule> = (0..4)
            .map(|i| {
                let dims = if i % 2 == 0 {
                    Dimensions::any()
                } else {
                    Dimensions::any().with_payment_type(Uuid::new_v4())
                };
                credit(h, dims, d(2024, 1, 1), d(2025, 1, 1))
            })
            .collect();
        let service = setup(rules);
        let query = ResolutionQuery::credit_note("BU", h);

        let first = service.resolve(&query, Some(d(2024, 4, 1))).await.unwrap().map(|r| r.rule.id);
        let second = service.resolve(&query, Some(d(2024, 4, 1))).await.unwrap().map(|r| r.rule.id);
        assert_eq!(first, second);
    }
}
