use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("ApplicationError - Sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("ApplicationError - CoreRentError: {0}")]
    CoreRentError(#[from] core_rent::error::CoreRentError),
    #[error("ApplicationError - TenantError: {0}")]
    TenantError(#[from] core_tenant::error::TenantError),
    #[error("ApplicationError - TenantDirectoryError: {0}")]
    TenantDirectoryError(#[from] core_tenant::TenantDirectoryError),
    #[error("ApplicationError - RentLedgerStoreError: {0}")]
    RentLedgerStoreError(#[from] core_rent::RentLedgerStoreError),
    #[error("ApplicationError - JobError: {0}")]
    JobError(#[from] job::error::JobError),
}
