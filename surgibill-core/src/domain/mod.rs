//! Core domain entities
//!
//! Rules, their dimensions and validity, and the pure matching, ranking and
//! conflict algorithms. No I/O lives here.

mod conflict;
mod dimensions;
mod listing;
mod query;
mod reference;
mod rule;
mod selection;
mod validity;
pub mod result;

pub use conflict::{check_conflicts, find_conflicting_pairs};
pub use dimensions::{
    Dimensions, PAYMENT_TYPE_WEIGHT, PROCEDURE_WEIGHT, SURGICAL_CATEGORY_WEIGHT,
};
pub use listing::{Page, RuleFilter, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use query::ResolutionQuery;
pub use reference::{normalize_code, Reference, ReferenceKind};
pub use rule::{
    ChargeType, Rule, RuleDocument, RuleDraft, RuleKind, RuleScope, RuleValue, MAX_FIXED_CHARGE,
    MAX_VALUE_SCALE,
};
pub use selection::{filter_applicable, select, ResolvedRule};
pub use validity::ValidityWindow;
