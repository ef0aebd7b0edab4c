//! Filtering and pagination for rule listings

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};
use super::rule::RuleKind;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Criteria for listing rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFilter {
    #[serde(default)]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub hospital: Option<Uuid>,
    #[serde(default)]
    pub kind: Option<RuleKind>,
    #[serde(default)]
    pub include_inactive: bool,
    /// 1-based
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for RuleFilter {
    fn default() -> Self {
        Self {
            business_unit: None,
            hospital: None,
            kind: None,
            include_inactive: false,
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl RuleFilter {
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(Error::validation("page", "pages start at 1"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::validation(
                "pageSize",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let filter: RuleFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, DEFAULT_PAGE_SIZE);
        assert!(!filter.include_inactive);
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_bounds() {
        let mut filter = RuleFilter::default();
        filter.page = 0;
        assert_eq!(filter.validate().unwrap_err().field(), Some("page"));

        filter.page = 1;
        filter.page_size = MAX_PAGE_SIZE + 1;
        assert_eq!(filter.validate().unwrap_err().field(), Some("pageSize"));
    }

    #[test]
    fn test_offset_and_total_pages() {
        let filter = RuleFilter {
            page: 3,
            page_size: 10,
            ..Default::default()
        };
        assert_eq!(filter.offset(), 20);

        let page: Page<u8> = Page {
            items: vec![],
            page: 1,
            page_size: 10,
            total: 21,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
