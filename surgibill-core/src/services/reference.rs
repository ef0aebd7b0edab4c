//! Reference service - registry of hospitals, doctors and billing dimensions

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Reference, ReferenceKind};
use crate::ports::ReferenceRegistry;

/// Service for registering and listing reference data
pub struct ReferenceService {
    registry: Arc<dyn ReferenceRegistry>,
}

impl ReferenceService {
    pub fn new(registry: Arc<dyn ReferenceRegistry>) -> Self {
        Self { registry }
    }

    /// Register a new active reference. The code is upper-cased and must be
    /// unique for its kind within the business unit.
    pub async fn register(
        &self,
        kind: ReferenceKind,
        business_unit: &str,
        code: &str,
        name: &str,
    ) -> Result<Reference> {
        let reference = Reference::new(kind, business_unit, code, name)?;
        self.registry.save_reference(&reference).await?;
        Ok(reference)
    }

    pub async fn get(&self, kind: ReferenceKind, id: Uuid) -> Result<Reference> {
        self.registry
            .find_reference(kind, id)
            .await?
            .ok_or_else(|| Error::not_found(format!("{} {}", kind, id)))
    }

    pub async fn list(
        &self,
        kind: Option<ReferenceKind>,
        business_unit: Option<&str>,
    ) -> Result<Vec<Reference>> {
        self.registry.list_references(kind, business_unit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;

    fn service() -> ReferenceService {
        ReferenceService::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let service = service();
        let hospital = service
            .register(ReferenceKind::Hospital, "NORTH", "city-gen", "City General")
            .await
            .unwrap();
        assert_eq!(hospital.code, "CITY-GEN");

        let found = service.get(ReferenceKind::Hospital, hospital.id).await.unwrap();
        assert_eq!(found, hospital);

        // Right id, wrong kind
        let err = service.get(ReferenceKind::Doctor, hospital.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_codes_unique_per_business_unit() {
        let service = service();
        service
            .register(ReferenceKind::Procedure, "NORTH", "KNEE", "Knee replacement")
            .await
            .unwrap();

        let err = service
            .register(ReferenceKind::Procedure, "NORTH", "knee", "Knee again")
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("code"));

        // Same code elsewhere is fine
        service
            .register(ReferenceKind::Procedure, "SOUTH", "KNEE", "Knee replacement")
            .await
            .unwrap();
        service
            .register(ReferenceKind::SurgicalCategory, "NORTH", "KNEE", "Knee surgery")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_filters() {
        let service = service();
        service.register(ReferenceKind::Hospital, "NORTH", "H1", "One").await.unwrap();
        service.register(ReferenceKind::Hospital, "SOUTH", "H2", "Two").await.unwrap();
        service.register(ReferenceKind::Doctor, "NORTH", "D1", "Dr One").await.unwrap();

        assert_eq!(service.list(None, None).await.unwrap().len(), 3);
        assert_eq!(service.list(Some(ReferenceKind::Hospital), None).await.unwrap().len(), 2);
        let north_hospitals = service
            .list(Some(ReferenceKind::Hospital), Some("NORTH"))
            .await
            .unwrap();
        assert_eq!(north_hospitals.len(), 1);
        assert_eq!(north_hospitals[0].code, "H1");
    }

    #[tokio::test]
    async fn test_register_rejects_blank_name() {
        let err = service()
            .register(ReferenceKind::PaymentType, "NORTH", "CASH", "  ")
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }
}
