//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod integrity;
pub mod logging;
pub mod migration;
mod reference;
mod resolution;
mod rules;
mod status;

pub use integrity::{CheckResult, IntegrityReport, IntegrityService, IntegritySummary};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use reference::ReferenceService;
pub use resolution::{CandidateTrace, ResolutionService, ResolutionTrace};
pub use rules::RuleService;
pub use status::{ReferenceCount, RuleCount, StatusService, StatusSummary};
