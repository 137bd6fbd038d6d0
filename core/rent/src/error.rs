use thiserror::Error;

use crate::{
    primitives::{BillingMonth, TenantId},
    store::RentLedgerStoreError,
};

#[derive(Error, Debug)]
pub enum CoreRentError {
    #[error("CoreRentError - EsEntityError: {0}")]
    EsEntityError(es_entity::EsEntityError),
    #[error("CoreRentError - RentLedgerStoreError: {0}")]
    RentLedgerStoreError(#[from] RentLedgerStoreError),
    #[error("CoreRentError - TenantError: {0}")]
    TenantError(#[from] core_tenant::error::TenantError),
    #[error("CoreRentError - JobError: {0}")]
    JobError(#[from] job::error::JobError),
    #[error("CoreRentError - ZeroPaymentAmount")]
    ZeroPaymentAmount,
    #[error("CoreRentError - RentRecordNotFound: tenant {tenant_id} month {month}")]
    RentRecordNotFound {
        tenant_id: TenantId,
        month: BillingMonth,
    },
}

es_entity::from_es_entity_error!(CoreRentError);
