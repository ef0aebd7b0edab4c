//! Resolution query context

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dimensions::Dimensions;
use super::result::{Error, Result};
use super::rule::{RuleKind, RuleScope};

/// What a billing workflow asks the resolver about.
///
/// `hospital` (and `doctor` for assignment queries) are mandatory anchors;
/// they are optional here only so a missing one is reported as
/// [`Error::InvalidQuery`] rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionQuery {
    pub kind: RuleKind,
    pub business_unit: String,
    #[serde(default)]
    pub hospital: Option<Uuid>,
    #[serde(default)]
    pub doctor: Option<Uuid>,
    #[serde(flatten)]
    pub dimensions: Dimensions,
}

impl ResolutionQuery {
    pub fn new(kind: RuleKind, business_unit: impl Into<String>) -> Self {
        Self {
            kind,
            business_unit: business_unit.into(),
            hospital: None,
            doctor: None,
            dimensions: Dimensions::any(),
        }
    }

    /// Credit-note query anchored on a hospital
    pub fn credit_note(business_unit: impl Into<String>, hospital: Uuid) -> Self {
        Self::new(RuleKind::CreditNote, business_unit).with_hospital(hospital)
    }

    /// Doctor-assignment query anchored on a hospital and doctor
    pub fn doctor_assignment(business_unit: impl Into<String>, hospital: Uuid, doctor: Uuid) -> Self {
        Self::new(RuleKind::DoctorAssignment, business_unit)
            .with_hospital(hospital)
            .with_doctor(doctor)
    }

    pub fn with_hospital(mut self, id: Uuid) -> Self {
        self.hospital = Some(id);
        self
    }

    pub fn with_doctor(mut self, id: Uuid) -> Self {
        self.doctor = Some(id);
        self
    }

    pub fn with_payment_type(mut self, id: Uuid) -> Self {
        self.dimensions.payment_type = Some(id);
        self
    }

    pub fn with_surgical_category(mut self, id: Uuid) -> Self {
        self.dimensions.surgical_category = Some(id);
        self
    }

    pub fn with_procedure(mut self, id: Uuid) -> Self {
        self.dimensions.procedure = Some(id);
        self
    }

    /// Check the mandatory anchors and return the scope they define
    pub fn scope(&self) -> Result<RuleScope> {
        if self.business_unit.trim().is_empty() {
            return Err(Error::invalid_query("businessUnit is required"));
        }
        let hospital = self
            .hospital
            .filter(|id| !id.is_nil())
            .ok_or_else(|| Error::invalid_query("hospital is required"))?;

        // Credit notes are not doctor-scoped, so a doctor in the context is ignored
        let doctor = match self.kind {
            RuleKind::CreditNote => None,
            RuleKind::DoctorAssignment => Some(
                self.doctor
                    .filter(|id| !id.is_nil())
                    .ok_or_else(|| Error::invalid_query("doctor is required for assignment queries"))?,
            ),
        };

        Ok(RuleScope {
            kind: self.kind,
            business_unit: self.business_unit.trim().to_string(),
            hospital,
            doctor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_hospital_is_invalid() {
        let query = ResolutionQuery::new(RuleKind::CreditNote, "BU");
        let err = query.scope().unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_assignment_requires_doctor() {
        let query = ResolutionQuery::new(RuleKind::DoctorAssignment, "BU").with_hospital(Uuid::new_v4());
        assert!(matches!(query.scope(), Err(Error::InvalidQuery(_))));

        let doctor = Uuid::new_v4();
        let scope = query.with_doctor(doctor).scope().unwrap();
        assert_eq!(scope.doctor, Some(doctor));
    }

    #[test]
    fn test_credit_note_scope() {
        let hospital = Uuid::new_v4();
        let scope = ResolutionQuery::credit_note(" BU ", hospital).scope().unwrap();
        assert_eq!(scope.business_unit, "BU");
        assert_eq!(scope.hospital, hospital);
        assert_eq!(scope.doctor, None);
    }

    #[test]
    fn test_credit_note_scope_ignores_doctor() {
        let hospital = Uuid::new_v4();
        let scope = ResolutionQuery::credit_note("BU", hospital)
            .with_doctor(Uuid::new_v4())
            .scope()
            .unwrap();
        assert_eq!(scope.hospital, hospital);
        assert_eq!(scope.doctor, None);
    }

    #[test]
    fn test_query_json_shape() {
        let hospital = Uuid::new_v4();
        let procedure = Uuid::new_v4();
        let query: ResolutionQuery = serde_json::from_value(serde_json::json!({
            "kind": "credit_note",
            "businessUnit": "BU",
            "hospital": hospital,
            "procedure": procedure
        }))
        .unwrap();
        assert_eq!(query.hospital, Some(hospital));
        assert_eq!(query.dimensions.procedure, Some(procedure));
        assert_eq!(query.dimensions.payment_type, None);
    }
}
