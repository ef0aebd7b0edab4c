//! Integrity service - audit of the stored rule set

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;
use crate::domain::{find_conflicting_pairs, Rule};
use crate::ports::RuleStore;

/// Integrity service for rule-set health checks
pub struct IntegrityService {
    repository: Arc<DuckDbRepository>,
}

impl IntegrityService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Run all checks as of today
    pub fn run_checks(&self) -> Result<IntegrityReport> {
        self.run_checks_on(Utc::now().date_naive())
    }

    /// Run all checks, judging elapsed windows against `today`
    pub fn run_checks_on(&self, today: NaiveDate) -> Result<IntegrityReport> {
        let mut checks = HashMap::new();
        let rules = self.repository.all_rules()?;

        checks.insert("overlapping_rules".to_string(), overlap_check(&rules));

        let stale = self.repository.find_stale_priorities()?;
        let stale_details = stale
            .iter()
            .map(|(id, stored, expected)| {
                json!({"ruleId": id, "storedPriority": stored, "expectedPriority": expected})
            })
            .collect();
        checks.insert(
            "stale_priority".to_string(),
            CheckResult::from_findings(
                "error",
                stale_details,
                "All stored priorities match their dimensions",
                |n| format!("{} rule(s) have a stored priority out of sync", n),
            ),
        );

        // Without any registered reference data every id would be flagged
        let registered: i64 = self
            .repository
            .count_references_by_kind()?
            .iter()
            .map(|(_, count)| count)
            .sum();
        let unknown_refs = if registered == 0 {
            CheckResult::pass("No reference data registered, skipped")
        } else {
            let dangling = self.repository.find_dangling_references()?;
            let details = dangling
                .iter()
                .map(|(id, kind, raw)| json!({"ruleId": id, "kind": kind.as_str(), "reference": raw}))
                .collect();
            CheckResult::from_findings(
                "warning",
                details,
                "All active rules point at registered references",
                |n| format!("{} reference(s) on active rules are unknown or inactive", n),
            )
        };
        checks.insert("unknown_references".to_string(), unknown_refs);

        checks.insert("elapsed_rules".to_string(), elapsed_check(&rules, today));

        Ok(IntegrityReport::from_checks(checks))
    }

    /// Rule-set checks that need nothing beyond the rule store: overlapping
    /// and elapsed rules. Works against any `RuleStore` backend.
    pub async fn check_rule_store(store: &dyn RuleStore, today: NaiveDate) -> Result<IntegrityReport> {
        let rules = store.all_rules().await?;
        let mut checks = HashMap::new();
        checks.insert("overlapping_rules".to_string(), overlap_check(&rules));
        checks.insert("elapsed_rules".to_string(), elapsed_check(&rules, today));
        Ok(IntegrityReport::from_checks(checks))
    }
}

/// Same signature, overlapping windows: resolution would tie
fn overlap_check(rules: &[Rule]) -> CheckResult {
    let details = find_conflicting_pairs(rules)
        .iter()
        .map(|(a, b)| {
            json!({
                "ruleId": a.id,
                "conflictsWith": b.id,
                "pattern": a.dimensions.describe(),
                "overlapFrom": a.validity.from().max(b.validity.from()),
                "overlapTo": a.validity.to().min(b.validity.to()),
            })
        })
        .collect();
    CheckResult::from_findings(
        "error",
        details,
        "No overlapping active rules",
        |n| format!("{} pair(s) of active rules overlap with the same signature", n),
    )
}

fn elapsed_check(rules: &[Rule], today: NaiveDate) -> CheckResult {
    let details = rules
        .iter()
        .filter(|r| r.is_active && r.validity.has_elapsed(today))
        .map(|r| json!({"ruleId": r.id, "validityTo": r.validity.to()}))
        .collect();
    CheckResult::from_findings(
        "warning",
        details,
        "No active rules past their validity window",
        |n| format!("{} active rule(s) expired and could be deactivated", n),
    )
}

#[derive(Debug, Serialize)]
pub struct IntegrityReport {
    pub checks: HashMap<String, CheckResult>,
    pub summary: IntegritySummary,
}

impl IntegrityReport {
    fn from_checks(checks: HashMap<String, CheckResult>) -> Self {
        let count = |status: &str| checks.values().filter(|c| c.status == status).count() as i64;
        let summary = IntegritySummary {
            passed: count("pass"),
            warnings: count("warning"),
            errors: count("error"),
        };
        Self { checks, summary }
    }

    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: &str) -> Self {
        Self {
            status: "pass".to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    fn from_findings(
        failing_status: &str,
        findings: Vec<serde_json::Value>,
        ok_message: &str,
        failing_message: impl Fn(usize) -> String,
    ) -> Self {
        if findings.is_empty() {
            return Self::pass(ok_message);
        }
        Self {
            status: failing_status.to_string(),
            message: failing_message(findings.len()),
            details: Some(findings),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntegritySummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
