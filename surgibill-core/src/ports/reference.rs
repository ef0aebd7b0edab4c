//! Reference data ports

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Reference, ReferenceKind};

/// Read-only lookup used to validate the identifiers a rule points at
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn find_reference(&self, kind: ReferenceKind, id: Uuid) -> Result<Option<Reference>>;
}

/// Registration and listing of reference data
#[async_trait]
pub trait ReferenceRegistry: ReferenceLookup {
    /// Insert a reference; codes are unique per kind and business unit
    async fn save_reference(&self, reference: &Reference) -> Result<()>;

    async fn list_references(
        &self,
        kind: Option<ReferenceKind>,
        business_unit: Option<&str>,
    ) -> Result<Vec<Reference>>;
}
