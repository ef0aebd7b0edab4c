//! Write-time conflict detection between rules

use super::result::{Error, Result};
use super::rule::Rule;

/// Reject `candidate` if an active rule with the identical signature has an
/// overlapping validity window.
///
/// `existing` is expected to hold the stored rules sharing the candidate's
/// scope and dimension pattern; anything else in it is ignored, as is the
/// candidate's own stored version.
pub fn check_conflicts(candidate: &Rule, existing: &[Rule]) -> Result<()> {
    if !candidate.is_active {
        return Ok(());
    }

    let collision = existing.iter().find(|other| {
        other.id != candidate.id
            && other.is_active
            && other.same_signature(candidate)
            && other.validity.overlaps(&candidate.validity)
    });

    match collision {
        None => Ok(()),
        Some(other) => {
            let overlap_from = other.validity.from().max(candidate.validity.from());
            let overlap_to = other.validity.to().min(candidate.validity.to());
            Err(Error::conflict(
                other.id,
                format!(
                    "active {} rule with the same {} signature overlaps from {} to {}",
                    other.kind(),
                    other.dimensions.describe(),
                    overlap_from,
                    overlap_to
                ),
            ))
        }
    }
}

/// All pairs of mutually conflicting rules in `rules`
pub fn find_conflicting_pairs(rules: &[Rule]) -> Vec<(&Rule, &Rule)> {
    let mut pairs = Vec::new();
    for (i, a) in rules.iter().enumerate() {
        if !a.is_active {
            continue;
        }
        for b in &rules[i + 1..] {
            if b.is_active && a.same_signature(b) && a.validity.overlaps(&b.validity) {
                pairs.push((a, b));
            }
        }
    }
    pairs
}
