//! Validity window of a rule

use chrono::NaiveDate;
use serde::Serialize;

use super::result::{Error, Result};

/// Half-open date interval `[from, to)` during which a rule may be matched.
///
/// `to` is exclusive: a window ending on 2024-06-01 and another starting on
/// 2024-06-01 never cover the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ValidityWindow {
    #[serde(rename = "validityFrom")]
    from: NaiveDate,
    #[serde(rename = "validityTo")]
    to: NaiveDate,
}

impl ValidityWindow {
    /// Build a window, rejecting `to <= from`
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if to <= from {
            return Err(Error::validation(
                "validityTo",
                format!("must be after validityFrom ({} <= {})", to, from),
            ));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// True iff `from <= date < to`
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date < self.to
    }

    /// `[a,b)` and `[c,d)` overlap iff `a < d && c < b`
    pub fn overlaps(&self, other: &ValidityWindow) -> bool {
        self.from < other.to && other.from < self.to
    }

    /// First day covered by both windows, if any
    pub fn overlap_start(&self, other: &ValidityWindow) -> Option<NaiveDate> {
        self.overlaps(other).then(|| self.from.max(other.from))
    }

    /// True once the whole window lies before `date`
    pub fn has_elapsed(&self, date: NaiveDate) -> bool {
        self.to <= date
    }
}
