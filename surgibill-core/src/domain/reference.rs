//! Reference data the rules point at (hospitals, doctors, ...)

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Kind of master-data entity a rule can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Hospital,
    Doctor,
    Procedure,
    PaymentType,
    SurgicalCategory,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 5] = [
        ReferenceKind::Hospital,
        ReferenceKind::Doctor,
        ReferenceKind::Procedure,
        ReferenceKind::PaymentType,
        ReferenceKind::SurgicalCategory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Hospital => "hospital",
            ReferenceKind::Doctor => "doctor",
            ReferenceKind::Procedure => "procedure",
            ReferenceKind::PaymentType => "payment_type",
            ReferenceKind::SurgicalCategory => "surgical_category",
        }
    }

    /// Rule field that holds a reference of this kind
    pub fn field(&self) -> &'static str {
        match self {
            ReferenceKind::Hospital => "hospital",
            ReferenceKind::Doctor => "doctor",
            ReferenceKind::Procedure => "procedure",
            ReferenceKind::PaymentType => "paymentType",
            ReferenceKind::SurgicalCategory => "surgicalCategory",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "hospital" => Ok(ReferenceKind::Hospital),
            "doctor" => Ok(ReferenceKind::Doctor),
            "procedure" => Ok(ReferenceKind::Procedure),
            "payment_type" | "paymenttype" => Ok(ReferenceKind::PaymentType),
            "surgical_category" | "category" => Ok(ReferenceKind::SurgicalCategory),
            other => Err(Error::validation(
                "kind",
                format!("unknown reference kind '{}'", other),
            )),
        }
    }
}

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9][A-Z0-9_-]*$").expect("valid code regex"))
}

/// Normalise a reference code to upper case and check its shape
pub fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Err(Error::validation("code", "cannot be empty"));
    }
    if !code_pattern().is_match(&code) {
        return Err(Error::validation(
            "code",
            format!("'{}' may only contain letters, digits, '-' and '_'", code),
        ));
    }
    Ok(code)
}

/// A registered master-data entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: Uuid,
    pub kind: ReferenceKind,
    pub business_unit: String,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Reference {
    /// Create a validated active reference
    pub fn new(
        kind: ReferenceKind,
        business_unit: impl Into<String>,
        code: &str,
        name: impl Into<String>,
    ) -> Result<Self> {
        let business_unit = business_unit.into().trim().to_string();
        if business_unit.is_empty() {
            return Err(Error::validation("businessUnit", "cannot be empty"));
        }
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("name", "cannot be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            business_unit,
            code: normalize_code(code)?,
            name,
            is_active: true,
            created_at: Utc::now(),
        })
    }

    /// Usable by a rule in `business_unit`
    pub fn usable_in(&self, business_unit: &str) -> bool {
        self.is_active && self.business_unit == business_unit
    }
}
