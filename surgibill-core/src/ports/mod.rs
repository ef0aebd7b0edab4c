//! Port definitions (hexagonal architecture)
//!
//! Services depend only on these traits. The DuckDB and in-memory adapters
//! provide the implementations.

mod reference;
mod repository;

pub use reference::{ReferenceLookup, ReferenceRegistry};
pub use repository::{ConflictGuard, RuleStore};
