//! Surgibill Core - rule resolution for hospital surgical billing
//!
//! Credit-note percentages and doctor fee assignments are configured as rules
//! scoped to a hospital and optionally narrowed by payment type, surgical
//! category and procedure. This crate picks the single most specific rule for
//! a billing query and keeps the rule set free of ambiguous overlaps.
//!
//! Hexagonal layout:
//!
//! - **domain**: Rules, validity windows, matching, ranking and conflict detection
//! - **ports**: Trait definitions for rule storage and reference lookup
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{
    ChargeType, Dimensions, Page, Reference, ReferenceKind, ResolutionQuery, ResolvedRule, Rule,
    RuleDraft, RuleFilter, RuleKind, RuleValue, ValidityWindow,
};

/// Database file holding rules and reference data
pub const DB_FILENAME: &str = "surgibill.duckdb";

/// Main context for Surgibill operations
///
/// Holds the configuration, the database and every service wired to it.
pub struct SurgibillContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub rule_service: RuleService,
    pub resolution_service: ResolutionService,
    pub reference_service: ReferenceService,
    pub integrity_service: IntegrityService,
    pub status_service: StatusService,
}

impl SurgibillContext {
    /// Open the context in `data_dir` without event logging
    pub fn new(data_dir: &Path) -> Result<Self> {
        Self::build(data_dir, None)
    }

    /// Open the context with services reporting to `logger`
    pub fn with_logger(data_dir: &Path, logger: Arc<LoggingService>) -> Result<Self> {
        Self::build(data_dir, Some(logger))
    }

    fn build(data_dir: &Path, logger: Option<Arc<LoggingService>>) -> Result<Self> {
        let config = Config::load(data_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILENAME))?);
        repository.ensure_schema()?;

        let mut rule_service = RuleService::new(repository.clone());
        if config.validate_references {
            rule_service = rule_service.with_reference_validation(repository.clone());
        }
        let mut resolution_service = ResolutionService::new(repository.clone());
        if let Some(logger) = logger {
            rule_service = rule_service.with_logger(logger.clone());
            resolution_service = resolution_service.with_logger(logger);
        }
        let reference_service = ReferenceService::new(repository.clone());
        let integrity_service = IntegrityService::new(Arc::clone(&repository));
        let status_service = StatusService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            rule_service,
            resolution_service,
            reference_service,
            integrity_service,
            status_service,
        })
    }
}
