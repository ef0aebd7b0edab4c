//! Billing rule domain entity
//!
//! A rule is either a credit-note percentage or a doctor fee assignment. Both
//! share the same scope / dimension / validity shape and differ only in their
//! value, so they are one type with a tagged [`RuleValue`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dimensions::Dimensions;
use super::result::{Error, Result};
use super::validity::ValidityWindow;

/// Maximum number of decimal places on any rule value
pub const MAX_VALUE_SCALE: u32 = 2;

/// Largest fixed charge a DECIMAL(18, 4) column holds at two decimal places
pub const MAX_FIXED_CHARGE: Decimal = Decimal::from_parts(1_874_919_423, 2_328_306, 0, false, 2);

/// Which family of rule this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    CreditNote,
    DoctorAssignment,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::CreditNote => "credit_note",
            RuleKind::DoctorAssignment => "doctor_assignment",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "credit_note" | "creditnote" => Ok(RuleKind::CreditNote),
            "doctor_assignment" | "doctorassignment" => Ok(RuleKind::DoctorAssignment),
            other => Err(Error::validation("kind", format!("unknown rule kind '{}'", other))),
        }
    }
}

/// How a doctor assignment charge is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    Percentage,
    Fixed,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Percentage => "percentage",
            ChargeType::Fixed => "fixed",
        }
    }
}

impl FromStr for ChargeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "percentage" | "percent" => Ok(ChargeType::Percentage),
            "fixed" => Ok(ChargeType::Fixed),
            other => Err(Error::validation(
                "chargeType",
                format!("unknown charge type '{}'", other),
            )),
        }
    }
}

/// The financial payload of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleValue {
    CreditNote {
        percentage: Decimal,
    },
    DoctorAssignment {
        doctor: Uuid,
        charge_type: ChargeType,
        charge_value: Decimal,
    },
}

impl RuleValue {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleValue::CreditNote { .. } => RuleKind::CreditNote,
            RuleValue::DoctorAssignment { .. } => RuleKind::DoctorAssignment,
        }
    }

    /// Doctor the rule is pinned to (assignment rules only)
    pub fn doctor(&self) -> Option<Uuid> {
        match self {
            RuleValue::CreditNote { .. } => None,
            RuleValue::DoctorAssignment { doctor, .. } => Some(*doctor),
        }
    }

    /// Check ranges and precision
    pub fn validate(&self) -> Result<()> {
        match self {
            RuleValue::CreditNote { percentage } => validate_percentage("percentage", *percentage),
            RuleValue::DoctorAssignment {
                charge_type: ChargeType::Percentage,
                charge_value,
                ..
            } => validate_percentage("chargeValue", *charge_value),
            RuleValue::DoctorAssignment {
                charge_type: ChargeType::Fixed,
                charge_value,
                ..
            } => validate_fixed("chargeValue", *charge_value),
        }
    }

    /// Amount this rule yields against a billed base amount.
    ///
    /// Percentages are rounded half away from zero to 2 decimal places;
    /// fixed charges ignore the base.
    pub fn apply(&self, base_amount: Decimal) -> Decimal {
        let percentage = match self {
            RuleValue::CreditNote { percentage } => *percentage,
            RuleValue::DoctorAssignment {
                charge_type: ChargeType::Percentage,
                charge_value,
                ..
            } => *charge_value,
            RuleValue::DoctorAssignment {
                charge_type: ChargeType::Fixed,
                charge_value,
                ..
            } => return *charge_value,
        };
        (base_amount * percentage / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(MAX_VALUE_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Display form, e.g. `12.5%` or `fixed 500`
    pub fn describe(&self) -> String {
        match self {
            RuleValue::CreditNote { percentage } => format!("{}%", percentage.normalize()),
            RuleValue::DoctorAssignment {
                charge_type: ChargeType::Percentage,
                charge_value,
                ..
            } => format!("{}%", charge_value.normalize()),
            RuleValue::DoctorAssignment {
                charge_type: ChargeType::Fixed,
                charge_value,
                ..
            } => format!("fixed {}", charge_value.normalize()),
        }
    }
}

fn validate_scale(field: &str, value: Decimal) -> Result<()> {
    if value.normalize().scale() > MAX_VALUE_SCALE {
        return Err(Error::validation(
            field,
            format!("at most {} decimal places allowed, got {}", MAX_VALUE_SCALE, value),
        ));
    }
    Ok(())
}

fn validate_percentage(field: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(Error::validation(
            field,
            format!("percentage must be between 0 and 100, got {}", value),
        ));
    }
    validate_scale(field, value)
}

fn validate_fixed(field: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(Error::validation(
            field,
            format!("fixed charge cannot be negative, got {}", value),
        ));
    }
    if value > MAX_FIXED_CHARGE {
        return Err(Error::validation(
            field,
            format!("fixed charge cannot exceed {}, got {}", MAX_FIXED_CHARGE, value),
        ));
    }
    validate_scale(field, value)
}

/// Mandatory (non-wildcard) anchors of a rule.
///
/// Rules in different scopes never compete and never conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleScope {
    pub kind: RuleKind,
    pub business_unit: String,
    pub hospital: Uuid,
    pub doctor: Option<Uuid>,
}

/// A credit-note or doctor-assignment rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "RuleDocument")]
pub struct Rule {
    pub id: Uuid,
    pub business_unit: String,
    pub hospital: Uuid,
    pub dimensions: Dimensions,
    pub value: RuleValue,
    pub validity: ValidityWindow,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Create a new active rule after validating its value
    pub fn new(
        business_unit: impl Into<String>,
        hospital: Uuid,
        dimensions: Dimensions,
        value: RuleValue,
        validity: ValidityWindow,
    ) -> Result<Self> {
        let now = Utc::now();
        let rule = Self {
            id: Uuid::new_v4(),
            business_unit: business_unit.into().trim().to_string(),
            hospital,
            dimensions,
            value,
            validity,
            is_active: true,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Create a credit-note rule
    pub fn credit_note(
        business_unit: impl Into<String>,
        hospital: Uuid,
        dimensions: Dimensions,
        percentage: Decimal,
        validity: ValidityWindow,
    ) -> Result<Self> {
        Self::new(
            business_unit,
            hospital,
            dimensions,
            RuleValue::CreditNote { percentage },
            validity,
        )
    }

    /// Create a doctor-assignment rule
    pub fn doctor_assignment(
        business_unit: impl Into<String>,
        hospital: Uuid,
        doctor: Uuid,
        dimensions: Dimensions,
        charge_type: ChargeType,
        charge_value: Decimal,
        validity: ValidityWindow,
    ) -> Result<Self> {
        Self::new(
            business_unit,
            hospital,
            dimensions,
            RuleValue::DoctorAssignment {
                doctor,
                charge_type,
                charge_value,
            },
            validity,
        )
    }

    pub fn kind(&self) -> RuleKind {
        self.value.kind()
    }

    pub fn doctor(&self) -> Option<Uuid> {
        self.value.doctor()
    }

    /// Ranking score, always derived from the populated dimensions
    pub fn priority(&self) -> i32 {
        self.dimensions.specificity()
    }

    pub fn scope(&self) -> RuleScope {
        RuleScope {
            kind: self.kind(),
            business_unit: self.business_unit.clone(),
            hospital: self.hospital,
            doctor: self.doctor(),
        }
    }

    /// Same scope and same wildcard/value pattern
    pub fn same_signature(&self, other: &Rule) -> bool {
        self.dimensions == other.dimensions && self.scope() == other.scope()
    }

    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.validity.contains(date)
    }

    /// Validate field constraints
    pub fn validate(&self) -> Result<()> {
        if self.business_unit.trim().is_empty() {
            return Err(Error::validation("businessUnit", "cannot be empty"));
        }
        if self.hospital.is_nil() {
            return Err(Error::validation("hospital", "is required"));
        }
        if self.doctor().is_some_and(|d| d.is_nil()) {
            return Err(Error::validation("doctor", "is required"));
        }
        self.value.validate()
    }
}

/// Flat serialised shape of a rule, as exposed to API and JSON consumers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDocument {
    pub id: Uuid,
    pub kind: RuleKind,
    pub business_unit: String,
    pub hospital: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor: Option<Uuid>,
    pub payment_type: Option<Uuid>,
    pub surgical_category: Option<Uuid>,
    pub procedure: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_type: Option<ChargeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_value: Option<Decimal>,
    pub validity_from: NaiveDate,
    pub validity_to: NaiveDate,
    pub priority: i32,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Rule> for RuleDocument {
    fn from(rule: Rule) -> Self {
        let priority = rule.priority();
        let kind = rule.kind();
        let (doctor, percentage, charge_type, charge_value) = match rule.value {
            RuleValue::CreditNote { percentage } => (None, Some(percentage), None, None),
            RuleValue::DoctorAssignment {
                doctor,
                charge_type,
                charge_value,
            } => (Some(doctor), None, Some(charge_type), Some(charge_value)),
        };
        Self {
            id: rule.id,
            kind,
            business_unit: rule.business_unit,
            hospital: rule.hospital,
            doctor,
            payment_type: rule.dimensions.payment_type,
            surgical_category: rule.dimensions.surgical_category,
            procedure: rule.dimensions.procedure,
            percentage,
            charge_type,
            charge_value,
            validity_from: rule.validity.from(),
            validity_to: rule.validity.to(),
            priority,
            is_active: rule.is_active,
            created_by: rule.created_by,
            updated_by: rule.updated_by,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
        }
    }
}

/// Create/update payload for a rule.
///
/// Every field is optional at the type level so that missing fields surface
/// as a [`Error::Validation`] naming the field instead of a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    /// Present when updating an existing rule
    #[serde(default)]
    pub id: Option<Uuid>,
    pub kind: Option<RuleKind>,
    #[serde(default)]
    pub business_unit: Option<String>,
    pub hospital: Option<Uuid>,
    #[serde(default)]
    pub doctor: Option<Uuid>,
    #[serde(default)]
    pub payment_type: Option<Uuid>,
    #[serde(default)]
    pub surgical_category: Option<Uuid>,
    #[serde(default)]
    pub procedure: Option<Uuid>,
    #[serde(default)]
    pub percentage: Option<Decimal>,
    #[serde(default)]
    pub charge_type: Option<ChargeType>,
    #[serde(default)]
    pub charge_value: Option<Decimal>,
    pub validity_from: Option<NaiveDate>,
    pub validity_to: Option<NaiveDate>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl RuleDraft {
    /// Start a draft from an existing rule (for partial updates)
    pub fn from_rule(rule: &Rule) -> Self {
        let (percentage, charge_type, charge_value) = match &rule.value {
            RuleValue::CreditNote { percentage } => (Some(*percentage), None, None),
            RuleValue::DoctorAssignment {
                charge_type,
                charge_value,
                ..
            } => (None, Some(*charge_type), Some(*charge_value)),
        };
        Self {
            id: Some(rule.id),
            kind: Some(rule.kind()),
            business_unit: Some(rule.business_unit.clone()),
            hospital: Some(rule.hospital),
            doctor: rule.doctor(),
            payment_type: rule.dimensions.payment_type,
            surgical_category: rule.dimensions.surgical_category,
            procedure: rule.dimensions.procedure,
            percentage,
            charge_type,
            charge_value,
            validity_from: Some(rule.validity.from()),
            validity_to: Some(rule.validity.to()),
            is_active: Some(rule.is_active),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            payment_type: self.payment_type,
            surgical_category: self.surgical_category,
            procedure: self.procedure,
        }
    }

    /// Build the value variant, rejecting fields that belong to the other kind
    fn value(&self, kind: RuleKind) -> Result<RuleValue> {
        match kind {
            RuleKind::CreditNote => {
                if self.doctor.is_some() {
                    return Err(Error::validation("doctor", "not applicable to credit notes"));
                }
                if self.charge_type.is_some() || self.charge_value.is_some() {
                    return Err(Error::validation(
                        "chargeType",
                        "credit notes take a percentage, not a charge",
                    ));
                }
                let percentage = self
                    .percentage
                    .ok_or_else(|| Error::validation("percentage", "is required"))?;
                Ok(RuleValue::CreditNote { percentage })
            }
            RuleKind::DoctorAssignment => {
                if self.percentage.is_some() {
                    return Err(Error::validation(
                        "percentage",
                        "doctor assignments take chargeType and chargeValue",
                    ));
                }
                let doctor = self
                    .doctor
                    .ok_or_else(|| Error::validation("doctor", "is required"))?;
                let charge_type = self
                    .charge_type
                    .ok_or_else(|| Error::validation("chargeType", "is required"))?;
                let charge_value = self
                    .charge_value
                    .ok_or_else(|| Error::validation("chargeValue", "is required"))?;
                Ok(RuleValue::DoctorAssignment {
                    doctor,
                    charge_type,
                    charge_value,
                })
            }
        }
    }

    /// Validate the draft and turn it into a rule.
    ///
    /// With `existing`, identity and creation audit fields are carried over
    /// and the kind may not change.
    pub fn into_rule(
        self,
        existing: Option<&Rule>,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Rule> {
        let kind = self
            .kind
            .ok_or_else(|| Error::validation("kind", "is required"))?;
        if let Some(existing) = existing {
            if existing.kind() != kind {
                return Err(Error::validation(
                    "kind",
                    format!("cannot change {} rule into {}", existing.kind(), kind),
                ));
            }
        }

        let business_unit = self
            .business_unit
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::validation("businessUnit", "is required"))?
            .to_string();
        let hospital = self
            .hospital
            .ok_or_else(|| Error::validation("hospital", "is required"))?;
        let from = self
            .validity_from
            .ok_or_else(|| Error::validation("validityFrom", "is required"))?;
        let to = self
            .validity_to
            .ok_or_else(|| Error::validation("validityTo", "is required"))?;
        let validity = ValidityWindow::new(from, to)?;
        let value = self.value(kind)?;
        let actor = actor.map(str::to_string);

        let rule = Rule {
            id: existing.map(|r| r.id).or(self.id).unwrap_or_else(Uuid::new_v4),
            business_unit,
            hospital,
            dimensions: self.dimensions(),
            value,
            validity,
            is_active: self
                .is_active
                .unwrap_or_else(|| existing.map_or(true, |r| r.is_active)),
            created_by: match existing {
                Some(r) => r.created_by.clone(),
                None => actor.clone(),
            },
            updated_by: actor,
            created_at: existing.map_or(now, |r| r.created_at),
            updated_at: now,
        };
        rule.validate()?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn window() -> ValidityWindow {
        ValidityWindow::new(d(2024, 1, 1), d(2024, 12, 31)).unwrap()
    }

    fn credit_draft() -> RuleDraft {
        RuleDraft {
            kind: Some(RuleKind::CreditNote),
            business_unit: Some("BU-NORTH".to_string()),
            hospital: Some(Uuid::new_v4()),
            percentage: Some(dec("12.5")),
            validity_from: Some(d(2024, 1, 1)),
            validity_to: Some(d(2024, 6, 1)),
            ..Default::default()
        }
    }

    #[test]
    fn test_percentage_range_and_precision() {
        let h = Uuid::new_v4();
        let ok = Rule::credit_note("BU", h, Dimensions::any(), dec("99.99"), window());
        assert!(ok.is_ok());

        for bad in ["-0.01", "100.01", "12.345"] {
            let err = Rule::credit_note("BU", h, Dimensions::any(), dec(bad), window()).unwrap_err();
            assert_eq!(err.field(), Some("percentage"), "value {}", bad);
        }

        // Trailing zeros do not count as precision
        assert!(Rule::credit_note("BU", h, Dimensions::any(), dec("10.500"), window()).is_ok());
        assert!(Rule::credit_note("BU", h, Dimensions::any(), dec("100"), window()).is_ok());
        assert!(Rule::credit_note("BU", h, Dimensions::any(), dec("0"), window()).is_ok());
    }

    #[test]
    fn test_charge_constraints() {
        let h = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let make = |t, v| {
            Rule::doctor_assignment("BU", h, doc, Dimensions::any(), t, v, window())
        };
        assert!(make(ChargeType::Fixed, dec("2500")).is_ok());
        assert!(make(ChargeType::Fixed, dec("0")).is_ok());
        assert_eq!(
            make(ChargeType::Fixed, dec("-1")).unwrap_err().field(),
            Some("chargeValue")
        );
        assert!(make(ChargeType::Fixed, dec("99999999999999.99")).is_ok());
        assert_eq!(
            make(ChargeType::Fixed, dec("100000000000000")).unwrap_err().field(),
            Some("chargeValue")
        );
        assert!(make(ChargeType::Percentage, dec("40")).is_ok());
        assert_eq!(
            make(ChargeType::Percentage, dec("140")).unwrap_err().field(),
            Some("chargeValue")
        );
    }

    #[test]
    fn test_priority_tracks_dimensions() {
        let mut rule = Rule::credit_note(
            "BU",
            Uuid::new_v4(),
            Dimensions::any(),
            dec("5"),
            window(),
        )
        .unwrap();
        assert_eq!(rule.priority(), 0);

        rule.dimensions.procedure = Some(Uuid::new_v4());
        assert_eq!(rule.priority(), 100);

        rule.dimensions.payment_type = Some(Uuid::new_v4());
        assert_eq!(rule.priority(), 101);

        rule.dimensions.procedure = None;
        assert_eq!(rule.priority(), 1);
    }

    #[test]
    fn test_apply_percentage_and_fixed() {
        let credit = RuleValue::CreditNote {
            percentage: dec("12.5"),
        };
        assert_eq!(credit.apply(dec("1000")), dec("125.00"));
        assert_eq!(credit.apply(dec("0.3")), dec("0.04"));

        let fixed = RuleValue::DoctorAssignment {
            doctor: Uuid::new_v4(),
            charge_type: ChargeType::Fixed,
            charge_value: dec("750"),
        };
        assert_eq!(fixed.apply(dec("100000")), dec("750"));
    }

    #[test]
    fn test_draft_into_rule() {
        let rule = credit_draft().into_rule(None, Some("admin"), Utc::now()).unwrap();
        assert_eq!(rule.kind(), RuleKind::CreditNote);
        assert!(rule.is_active);
        assert_eq!(rule.created_by.as_deref(), Some("admin"));
        assert_eq!(rule.priority(), 0);
    }

    #[test]
    fn test_draft_missing_fields_are_named() {
        let mut draft = credit_draft();
        draft.hospital = None;
        let err = draft.into_rule(None, None, Utc::now()).unwrap_err();
        assert_eq!(err.field(), Some("hospital"));

        let mut draft = credit_draft();
        draft.percentage = None;
        let err = draft.into_rule(None, None, Utc::now()).unwrap_err();
        assert_eq!(err.field(), Some("percentage"));

        let mut draft = credit_draft();
        draft.business_unit = Some("   ".to_string());
        let err = draft.into_rule(None, None, Utc::now()).unwrap_err();
        assert_eq!(err.field(), Some("businessUnit"));
    }

    #[test]
    fn test_draft_rejects_bad_date_order() {
        let mut draft = credit_draft();
        draft.validity_to = Some(d(2023, 1, 1));
        let err = draft.into_rule(None, None, Utc::now()).unwrap_err();
        assert_eq!(err.field(), Some("validityTo"));
    }

    #[test]
    fn test_draft_rejects_mixed_kinds() {
        let mut draft = credit_draft();
        draft.doctor = Some(Uuid::new_v4());
        assert_eq!(
            draft.into_rule(None, None, Utc::now()).unwrap_err().field(),
            Some("doctor")
        );

        let mut draft = credit_draft();
        draft.kind = Some(RuleKind::DoctorAssignment);
        draft.doctor = Some(Uuid::new_v4());
        draft.charge_type = Some(ChargeType::Fixed);
        draft.charge_value = Some(dec("100"));
        assert_eq!(
            draft.into_rule(None, None, Utc::now()).unwrap_err().field(),
            Some("percentage")
        );
    }

    #[test]
    fn test_update_keeps_identity_and_creation_audit() {
        let created = credit_draft().into_rule(None, Some("alice"), Utc::now()).unwrap();
        let mut draft = RuleDraft::from_rule(&created);
        draft.procedure = Some(Uuid::new_v4());
        let updated = draft.into_rule(Some(&created), Some("bob"), Utc::now()).unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_by.as_deref(), Some("alice"));
        assert_eq!(updated.updated_by.as_deref(), Some("bob"));
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.priority(), 100);
    }

    #[test]
    fn test_update_cannot_change_kind() {
        let created = credit_draft().into_rule(None, None, Utc::now()).unwrap();
        let mut draft = RuleDraft::from_rule(&created);
        draft.kind = Some(RuleKind::DoctorAssignment);
        let err = draft.into_rule(Some(&created), None, Utc::now()).unwrap_err();
        assert_eq!(err.field(), Some("kind"));
    }

    #[test]
    fn test_draft_json_shape() {
        let json = serde_json::json!({
            "kind": "doctor_assignment",
            "businessUnit": "BU-SOUTH",
            "hospital": Uuid::new_v4(),
            "doctor": Uuid::new_v4(),
            "procedure": Uuid::new_v4(),
            "chargeType": "fixed",
            "chargeValue": "1500.00",
            "validityFrom": "2024-01-01",
            "validityTo": "2025-01-01"
        });
        let draft: RuleDraft = serde_json::from_value(json).unwrap();
        let rule = draft.into_rule(None, None, Utc::now()).unwrap();
        assert_eq!(rule.kind(), RuleKind::DoctorAssignment);
        assert_eq!(rule.priority(), 100);
    }

    #[test]
    fn test_serialized_rule_includes_priority() {
        let mut draft = credit_draft();
        draft.surgical_category = Some(Uuid::new_v4());
        let rule = draft.into_rule(None, None, Utc::now()).unwrap();
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["priority"], 10);
        assert_eq!(value["kind"], "credit_note");
        assert!(value.get("doctor").is_none());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("credit-note".parse::<RuleKind>().unwrap(), RuleKind::CreditNote);
        assert_eq!(
            "doctor_assignment".parse::<RuleKind>().unwrap(),
            RuleKind::DoctorAssignment
        );
        assert!("limit".parse::<RuleKind>().is_err());
    }
}
