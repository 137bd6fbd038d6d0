#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg_attr(feature = "fail-on-warnings", deny(clippy::all))]

mod directory;
mod entity;
pub mod error;
mod postgres;
mod primitives;

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::instrument;

pub use directory::{TenantDirectory, TenantDirectoryError};
pub use entity::{NewTenant, NewTenantBuilder, Tenant, TenantEvent};
use error::TenantError;
pub use postgres::PgTenantDirectory;
pub use primitives::*;

pub const MIN_LEASE_EXTENSION_MONTHS: u32 = 1;
pub const MAX_LEASE_EXTENSION_MONTHS: u32 = 60;

/// Tenant directory facade: identity, lease dates and the running balance
/// the rent ledger reads and mutates.
pub struct Tenants<D> {
    directory: Arc<D>,
}

impl<D> Clone for Tenants<D> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
        }
    }
}

impl<D> Tenants<D>
where
    D: TenantDirectory,
{
    pub fn new(directory: D) -> Self {
        Self {
            directory: Arc::new(directory),
        }
    }

    #[instrument(name = "tenant.create", skip(self), err)]
    pub async fn create_tenant(
        &self,
        name: impl Into<String> + std::fmt::Debug,
        phone: impl Into<String> + std::fmt::Debug,
        unit: impl Into<String> + std::fmt::Debug,
        monthly_rent: KesCents,
        lease_start: NaiveDate,
        lease_end: NaiveDate,
    ) -> Result<Tenant, TenantError> {
        if monthly_rent.is_zero() {
            return Err(TenantError::ZeroMonthlyRent);
        }
        let phone = phone.into();
        if phone_suffix(&phone).is_empty() {
            return Err(TenantError::MissingPhone);
        }

        let new_tenant = NewTenant::builder()
            .id(TenantId::new())
            .name(name.into())
            .phone(phone)
            .unit(unit.into())
            .monthly_rent(monthly_rent)
            .lease_start(lease_start)
            .lease_end(lease_end)
            .build()
            .expect("could not build new tenant");

        Ok(self.directory.create(new_tenant).await?)
    }

    pub async fn find_by_id(
        &self,
        id: impl Into<TenantId> + std::fmt::Debug,
    ) -> Result<Tenant, TenantError> {
        Ok(self.directory.find_by_id(id.into()).await?)
    }

    pub async fn list_active(&self) -> Result<Vec<Tenant>, TenantError> {
        Ok(self.directory.list_active().await?)
    }

    /// Resolve a tenant from a raw phone number as delivered by the payment
    /// gateway; matching is on the normalized 9-digit suffix.
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Tenant>, TenantError> {
        let suffix = phone_suffix(phone);
        if suffix.is_empty() {
            return Ok(None);
        }
        Ok(self.directory.find_by_phone_suffix(&suffix).await?)
    }

    #[instrument(name = "tenant.extend_lease", skip(self), err)]
    #[es_entity::retry_on_concurrent_modification(any_error = true)]
    pub async fn extend_lease(
        &self,
        id: impl Into<TenantId> + std::fmt::Debug + Copy,
        months: u32,
    ) -> Result<Tenant, TenantError> {
        if !(MIN_LEASE_EXTENSION_MONTHS..=MAX_LEASE_EXTENSION_MONTHS).contains(&months) {
            return Err(TenantError::LeaseExtensionOutOfRange(months));
        }
        let mut tenant = self.directory.find_by_id(id.into()).await?;
        let version = tenant.version();
        tenant.extend_lease(months);
        self.directory.update(&tenant, version).await?;
        Ok(tenant)
    }

    #[instrument(name = "tenant.update_status", skip(self), err)]
    #[es_entity::retry_on_concurrent_modification(any_error = true)]
    pub async fn update_status(
        &self,
        id: impl Into<TenantId> + std::fmt::Debug + Copy,
        status: TenancyStatus,
    ) -> Result<Tenant, TenantError> {
        let mut tenant = self.directory.find_by_id(id.into()).await?;
        let version = tenant.version();
        if tenant.update_status(status).did_execute() {
            self.directory.update(&tenant, version).await?;
        }
        Ok(tenant)
    }

    /// Record the month's rent obligation against the tenant balance.
    /// Idempotent per billing month.
    #[instrument(name = "tenant.post_monthly_rent", skip(self), err)]
    #[es_entity::retry_on_concurrent_modification(any_error = true)]
    pub async fn post_monthly_rent(
        &self,
        id: impl Into<TenantId> + std::fmt::Debug + Copy,
        month: BillingMonth,
    ) -> Result<Tenant, TenantError> {
        let mut tenant = self.directory.find_by_id(id.into()).await?;
        let version = tenant.version();
        if tenant.post_monthly_rent(month).did_execute() {
            self.directory.update(&tenant, version).await?;
        }
        Ok(tenant)
    }

    #[instrument(name = "tenant.apply_payment", skip(self), err)]
    #[es_entity::retry_on_concurrent_modification(any_error = true)]
    pub async fn apply_payment(
        &self,
        id: impl Into<TenantId> + std::fmt::Debug + Copy,
        month: BillingMonth,
        amount: KesCents,
        month_obligation: KesCents,
    ) -> Result<Tenant, TenantError> {
        let mut tenant = self.directory.find_by_id(id.into()).await?;
        let version = tenant.version();
        tenant.apply_payment(month, amount, month_obligation);
        self.directory.update(&tenant, version).await?;
        Ok(tenant)
    }

    #[instrument(name = "tenant.mark_overdue", skip(self), err)]
    #[es_entity::retry_on_concurrent_modification(any_error = true)]
    pub async fn mark_overdue(
        &self,
        id: impl Into<TenantId> + std::fmt::Debug + Copy,
        month: BillingMonth,
    ) -> Result<Tenant, TenantError> {
        let mut tenant = self.directory.find_by_id(id.into()).await?;
        let version = tenant.version();
        if tenant.mark_overdue(month).did_execute() {
            self.directory.update(&tenant, version).await?;
        }
        Ok(tenant)
    }
}
