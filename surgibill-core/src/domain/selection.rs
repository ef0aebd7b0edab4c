//! Picking the single applicable rule out of the matching candidates

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::dimensions::Dimensions;
use super::rule::Rule;

/// Outcome of a successful resolution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRule {
    pub rule: Rule,
    pub evaluation_date: NaiveDate,
    /// Other valid candidates sharing the winning priority.
    ///
    /// Non-empty means the rule set is ambiguous for this query; the winner
    /// was picked by recency and the tie should be treated as a data issue.
    pub tied_with: Vec<Uuid>,
    /// Number of candidates that survived matching and the date filter
    pub candidates_considered: usize,
}

impl ResolvedRule {
    pub fn is_ambiguous(&self) -> bool {
        !self.tied_with.is_empty()
    }
}

/// Ordering used to rank candidates: priority descending, then most recently
/// updated, most recently created, and finally id so the result is stable.
fn rank(a: &Rule, b: &Rule) -> Ordering {
    b.priority()
        .cmp(&a.priority())
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Keep only candidates that apply to `query` and are valid on `date`
pub fn filter_applicable(candidates: Vec<Rule>, query: &Dimensions, date: NaiveDate) -> Vec<Rule> {
    candidates
        .into_iter()
        .filter(|rule| rule.is_active && rule.dimensions.accepts(query) && rule.is_valid_on(date))
        .collect()
}

/// Select the winning rule among already-filtered candidates.
///
/// Returns `None` when there are no candidates.
pub fn select(mut candidates: Vec<Rule>, date: NaiveDate) -> Option<ResolvedRule> {
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by(rank);

    let considered = candidates.len();
    let mut iter = candidates.into_iter();
    let winner = iter.next()?;
    let tied_with = iter
        .take_while(|rule| rule.priority() == winner.priority())
        .map(|rule| rule.id)
        .collect();

    Some(ResolvedRule {
        rule: winner,
        evaluation_date: date,
        tied_with,
        candidates_considered: considered,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::validity::ValidityWindow;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rule(hospital: Uuid, dims: Dimensions, from: NaiveDate, to: NaiveDate) -> Rule {
        Rule::credit_note(
            "BU",
            hospital,
            dims,
            Decimal::new(5, 0),
            ValidityWindow::new(from, to).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_candidates_resolve_to_none() {
        assert!(select(Vec::new(), d(2024, 1, 1)).is_none());
    }

    #[test]
    fn test_highest_priority_wins() {
        let h = Uuid::new_v4();
        let p = Uuid::new_v4();
        let c = Uuid::new_v4();
        let wide = rule(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        let category = rule(h, Dimensions::any().with_surgical_category(c), d(2024, 1, 1), d(2025, 1, 1));
        let procedure = rule(h, Dimensions::any().with_procedure(p), d(2024, 1, 1), d(2025, 1, 1));

        let resolved = select(
            vec![wide, procedure.clone(), category],
            d(2024, 3, 1),
        )
        .unwrap();
        assert_eq!(resolved.rule.id, procedure.id);
        assert!(!resolved.is_ambiguous());
        assert_eq!(resolved.candidates_considered, 3);
    }

    #[test]
    fn test_tie_prefers_most_recent_update_and_reports_others() {
        let h = Uuid::new_v4();
        let mut older = rule(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        let mut newer = rule(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        older.updated_at = Utc::now() - Duration::days(3);
        newer.updated_at = Utc::now();

        let resolved = select(vec![older.clone(), newer.clone()], d(2024, 5, 1)).unwrap();
        assert_eq!(resolved.rule.id, newer.id);
        assert_eq!(resolved.tied_with, vec![older.id]);
        assert!(resolved.is_ambiguous());
    }

    #[test]
    fn test_lower_priority_candidates_are_not_ties() {
        let h = Uuid::new_v4();
        let a = rule(h, Dimensions::any().with_payment_type(Uuid::new_v4()), d(2024, 1, 1), d(2025, 1, 1));
        let b = rule(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        let resolved = select(vec![b, a.clone()], d(2024, 5, 1)).unwrap();
        assert_eq!(resolved.rule.id, a.id);
        assert!(resolved.tied_with.is_empty());
    }

    #[test]
    fn test_selection_is_order_independent() {
        let h = Uuid::new_v4();
        let now = Utc::now();
        let mut rules: Vec<Rule> = (0..5)
            .map(|_| {
                let mut r = rule(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
                r.updated_at = now;
                r.created_at = now;
                r
            })
            .collect();
        let first = select(rules.clone(), d(2024, 2, 1)).unwrap().rule.id;
        rules.reverse();
        let second = select(rules, d(2024, 2, 1)).unwrap().rule.id;
        assert_eq!(first, second);
    }

    #[test]
    fn test_filter_drops_out_of_window_and_mismatched() {
        let h = Uuid::new_v4();
        let p = Uuid::new_v4();
        let expired = rule(h, Dimensions::any(), d(2023, 1, 1), d(2024, 1, 1));
        let other_procedure = rule(h, Dimensions::any().with_procedure(Uuid::new_v4()), d(2024, 1, 1), d(2025, 1, 1));
        let mut inactive = rule(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
        inactive.is_active = false;
        let good = rule(h, Dimensions::any().with_procedure(p), d(2024, 1, 1), d(2025, 1, 1));

        let query = Dimensions::any().with_procedure(p);
        let kept = filter_applicable(
            vec![expired, other_procedure, inactive, good.clone()],
            &query,
            d(2024, 1, 1),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, good.id);
    }

    #[test]
    fn test_wildcard_rule_matches_but_never_outranks_specific_match() {
        let h = Uuid::new_v4();
        let (pt, c, p) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let query = Dimensions::any()
            .with_payment_type(pt)
            .with_surgical_category(c)
            .with_procedure(p);

        let specifics = [
            Dimensions::any().with_payment_type(pt),
            Dimensions::any().with_surgical_category(c),
            Dimensions::any().with_procedure(p),
            query,
        ];
        for dims in specifics {
            let mut wide = rule(h, Dimensions::any(), d(2024, 1, 1), d(2025, 1, 1));
            // Even a freshly edited wildcard rule loses
            wide.updated_at = Utc::now() + Duration::days(1);
            let specific = rule(h, dims, d(2024, 1, 1), d(2025, 1, 1));

            let kept = filter_applicable(vec![wide.clone(), specific.clone()], &query, d(2024, 6, 1));
            assert_eq!(kept.len(), 2);
            let resolved = select(kept, d(2024, 6, 1)).unwrap();
            assert_eq!(resolved.rule.id, specific.id);
        }
    }
}
