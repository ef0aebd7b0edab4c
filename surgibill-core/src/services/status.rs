//! Status service - rule and reference data summaries

use std::sync::Arc;

use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;

/// Status service for rule-set summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let rules: Vec<RuleCount> = self
            .repository
            .count_rules_by_kind()?
            .into_iter()
            .map(|(kind, total, active)| RuleCount {
                kind,
                total,
                active,
            })
            .collect();
        let references: Vec<ReferenceCount> = self
            .repository
            .count_references_by_kind()?
            .into_iter()
            .map(|(kind, count)| ReferenceCount { kind, count })
            .collect();

        Ok(StatusSummary {
            total_rules: rules.iter().map(|r| r.total).sum(),
            active_rules: rules.iter().map(|r| r.active).sum(),
            total_references: references.iter().map(|r| r.count).sum(),
            rules,
            references,
            database_path: self.repository.db_path().display().to_string(),
            database_size: self.repository.get_db_size()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_rules: i64,
    pub active_rules: i64,
    pub total_references: i64,
    pub rules: Vec<RuleCount>,
    pub references: Vec<ReferenceCount>,
    pub database_path: String,
    pub database_size: u64,
}

#[derive(Debug, Serialize)]
pub struct RuleCount {
    pub kind: String,
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Serialize)]
pub struct ReferenceCount {
    pub kind: String,
    pub count: i64,
}
