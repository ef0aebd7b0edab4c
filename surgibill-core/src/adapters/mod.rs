//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the rule store and reference registry
//! - An in-memory store with the same behaviour, for embedding and tests

pub mod duckdb;
pub mod memory;
