use thiserror::Error;

use crate::directory::TenantDirectoryError;

#[derive(Error, Debug)]
pub enum TenantError {
    #[error("TenantError - EsEntityError: {0}")]
    EsEntityError(es_entity::EsEntityError),
    #[error("TenantError - TenantDirectoryError: {0}")]
    TenantDirectoryError(#[from] TenantDirectoryError),
    #[error("TenantError - ZeroMonthlyRent")]
    ZeroMonthlyRent,
    #[error("TenantError - MissingPhone")]
    MissingPhone,
    #[error("TenantError - LeaseExtensionOutOfRange: {0} months")]
    LeaseExtensionOutOfRange(u32),
}

es_entity::from_es_entity_error!(TenantError);
