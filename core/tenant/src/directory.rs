use async_trait::async_trait;
use thiserror::Error;

use crate::{
    entity::{NewTenant, Tenant},
    primitives::TenantId,
};

#[derive(Error, Debug)]
pub enum TenantDirectoryError {
    #[error("TenantDirectoryError - Sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("TenantDirectoryError - EsEntityError: {0}")]
    EsEntityError(es_entity::EsEntityError),
    #[error("TenantDirectoryError - Serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("TenantDirectoryError - NotFound: {0}")]
    NotFound(TenantId),
    #[error("TenantDirectoryError - ConcurrentModification: {0}")]
    ConcurrentModification(TenantId),
}

es_entity::from_es_entity_error!(TenantDirectoryError);

/// Storage seam for tenants. The ledger engine only ever reads tenants and
/// appends events to them; writes go through an optimistic-concurrency
/// `update` keyed on the event-count version.
#[async_trait]
pub trait TenantDirectory: Send + Sync + 'static {
    async fn create(&self, new_tenant: NewTenant) -> Result<Tenant, TenantDirectoryError>;

    async fn find_by_id(&self, id: TenantId) -> Result<Tenant, TenantDirectoryError>;

    async fn list_active(&self) -> Result<Vec<Tenant>, TenantDirectoryError>;

    /// Resolve a tenant by the normalized 9-digit phone suffix.
    async fn find_by_phone_suffix(
        &self,
        suffix: &str,
    ) -> Result<Option<Tenant>, TenantDirectoryError>;

    /// Persist appended events. Fails with `ConcurrentModification` when the
    /// stored version no longer matches `expected_version`.
    async fn update(
        &self,
        tenant: &Tenant,
        expected_version: usize,
    ) -> Result<(), TenantDirectoryError>;
}
