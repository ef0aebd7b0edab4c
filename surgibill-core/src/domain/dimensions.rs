//! Optional rule dimensions and their specificity score

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weight of a populated `procedure` dimension
pub const PROCEDURE_WEIGHT: i32 = 100;
/// Weight of a populated `surgicalCategory` dimension
pub const SURGICAL_CATEGORY_WEIGHT: i32 = 10;
/// Weight of a populated `paymentType` dimension
pub const PAYMENT_TYPE_WEIGHT: i32 = 1;

/// The three wildcardable dimensions of a rule.
///
/// `None` on a rule means "any value". On a query, `None` means the caller
/// did not supply that value, which only wildcard rules accept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub payment_type: Option<Uuid>,
    pub surgical_category: Option<Uuid>,
    pub procedure: Option<Uuid>,
}

impl Dimensions {
    /// Fully wildcarded dimensions
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_payment_type(mut self, id: Uuid) -> Self {
        self.payment_type = Some(id);
        self
    }

    pub fn with_surgical_category(mut self, id: Uuid) -> Self {
        self.surgical_category = Some(id);
        self
    }

    pub fn with_procedure(mut self, id: Uuid) -> Self {
        self.procedure = Some(id);
        self
    }

    /// Specificity score: `100*procedure + 10*category + 1*paymentType`.
    ///
    /// Each weight exceeds the sum of all lower weights, so a single more
    /// specific dimension always outranks any mix of less specific ones.
    pub fn specificity(&self) -> i32 {
        let mut score = 0;
        if self.procedure.is_some() {
            score += PROCEDURE_WEIGHT;
        }
        if self.surgical_category.is_some() {
            score += SURGICAL_CATEGORY_WEIGHT;
        }
        if self.payment_type.is_some() {
            score += PAYMENT_TYPE_WEIGHT;
        }
        score
    }

    /// True if a rule carrying `self` applies to a query carrying `query`:
    /// every populated rule dimension must equal the query's value.
    pub fn accepts(&self, query: &Dimensions) -> bool {
        fn accepts_one(rule: Option<Uuid>, query: Option<Uuid>) -> bool {
            match rule {
                None => true,
                Some(value) => query == Some(value),
            }
        }

        accepts_one(self.payment_type, query.payment_type)
            && accepts_one(self.surgical_category, query.surgical_category)
            && accepts_one(self.procedure, query.procedure)
    }

    /// Short human-readable wildcard pattern, e.g. `procedure+category`
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.procedure.is_some() {
            parts.push("procedure");
        }
        if self.surgical_category.is_some() {
            parts.push("category");
        }
        if self.payment_type.is_some() {
            parts.push("payment-type");
        }
        if parts.is_empty() {
            "hospital-wide".to_string()
        } else {
            parts.join("+")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_combinations() -> Vec<Dimensions> {
        let mut out = Vec::new();
        for mask in 0..8u8 {
            let mut dims = Dimensions::any();
            if mask & 1 != 0 {
                dims = dims.with_payment_type(Uuid::new_v4());
            }
            if mask & 2 != 0 {
                dims = dims.with_surgical_category(Uuid::new_v4());
            }
            if mask & 4 != 0 {
                dims = dims.with_procedure(Uuid::new_v4());
            }
            out.push(dims);
        }
        out
    }

    #[test]
    fn test_specificity_weights() {
        let p = Uuid::new_v4();
        assert_eq!(Dimensions::any().specificity(), 0);
        assert_eq!(Dimensions::any().with_payment_type(p).specificity(), 1);
        assert_eq!(Dimensions::any().with_surgical_category(p).specificity(), 10);
        assert_eq!(Dimensions::any().with_procedure(p).specificity(), 100);
        assert_eq!(
            Dimensions::any()
                .with_procedure(p)
                .with_surgical_category(p)
                .with_payment_type(p)
                .specificity(),
            111
        );
    }

    #[test]
    fn test_higher_dimension_dominates_every_lower_mix() {
        for a in all_combinations() {
            for b in all_combinations() {
                let a_proc = a.procedure.is_some();
                let b_proc = b.procedure.is_some();
                if a_proc && !b_proc {
                    assert!(a.specificity() > b.specificity());
                }
                let a_cat = a.surgical_category.is_some();
                let b_cat = b.surgical_category.is_some();
                if a_proc == b_proc && a_cat && !b_cat {
                    assert!(a.specificity() > b.specificity());
                }
            }
        }
    }

    #[test]
    fn test_scores_are_distinct_per_pattern() {
        let mut scores: Vec<i32> = all_combinations().iter().map(|d| d.specificity()).collect();
        scores.sort();
        scores.dedup();
        assert_eq!(scores.len(), 8);
    }

    #[test]
    fn test_wildcard_accepts_anything() {
        let query = Dimensions::any()
            .with_payment_type(Uuid::new_v4())
            .with_surgical_category(Uuid::new_v4())
            .with_procedure(Uuid::new_v4());
        assert!(Dimensions::any().accepts(&query));
        assert!(Dimensions::any().accepts(&Dimensions::any()));
    }

    #[test]
    fn test_specific_dimension_requires_equal_value() {
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        let rule = Dimensions::any().with_procedure(p);
        assert!(rule.accepts(&Dimensions::any().with_procedure(p)));
        assert!(!rule.accepts(&Dimensions::any().with_procedure(q)));
        // Query omitting the value never matches a rule that specifies it
        assert!(!rule.accepts(&Dimensions::any()));
    }

    #[test]
    fn test_describe() {
        let id = Uuid::new_v4();
        assert_eq!(Dimensions::any().describe(), "hospital-wide");
        assert_eq!(
            Dimensions::any().with_procedure(id).with_payment_type(id).describe(),
            "procedure+payment-type"
        );
    }
}
