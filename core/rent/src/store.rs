use async_trait::async_trait;
use thiserror::Error;

use crate::{
    primitives::{BillingMonth, RentRecordId, TenantId},
    rent_record::{NewRentRecord, RentRecord},
};

#[derive(Error, Debug)]
pub enum RentLedgerStoreError {
    #[error("RentLedgerStoreError - Sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("RentLedgerStoreError - EsEntityError: {0}")]
    EsEntityError(es_entity::EsEntityError),
    #[error("RentLedgerStoreError - Serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("RentLedgerStoreError - DuplicateRecord: tenant {tenant_id} month {month}")]
    DuplicateRecord {
        tenant_id: TenantId,
        month: BillingMonth,
    },
    #[error("RentLedgerStoreError - ConcurrentModification: {0}")]
    ConcurrentModification(RentRecordId),
}

es_entity::from_es_entity_error!(RentLedgerStoreError);

/// Storage seam for rent records. Implementations enforce the one-record-
/// per-tenant-per-month uniqueness on `create` and compare-and-swap on the
/// event-count version on `update`.
#[async_trait]
pub trait RentLedgerStore: Send + Sync + 'static {
    async fn create(&self, new_record: NewRentRecord) -> Result<RentRecord, RentLedgerStoreError>;

    async fn find_for_month(
        &self,
        tenant_id: TenantId,
        month: BillingMonth,
    ) -> Result<Option<RentRecord>, RentLedgerStoreError>;

    /// All of a tenant's records, most recent month first.
    async fn list_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<RentRecord>, RentLedgerStoreError>;

    async fn update(
        &self,
        record: &RentRecord,
        expected_version: usize,
    ) -> Result<(), RentLedgerStoreError>;
}
