#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg_attr(feature = "fail-on-warnings", deny(clippy::all))]

mod config;
pub mod error;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::instrument;

use core_money::KesCents;
use core_rent::{
    CoreRent, GenerationSummary, PgRentLedgerStore, RentRecord, UtilityChargesUpdate,
};
use core_tenant::{PgTenantDirectory, Tenant, TenantId, Tenants};
use job::Jobs;

pub use config::AppConfig;
use error::ApplicationError;

/// Composition root: owns the stores, the module facades and the job
/// executor. An HTTP layer (or the CLI) talks to the system through this.
#[derive(Clone)]
pub struct KodiApp {
    tenants: Tenants<PgTenantDirectory>,
    rent: CoreRent<PgRentLedgerStore, PgTenantDirectory>,
    jobs: Jobs,
}

impl KodiApp {
    pub async fn init(pool: PgPool, config: AppConfig) -> Result<Self, ApplicationError> {
        PgTenantDirectory::setup(&pool).await?;
        PgRentLedgerStore::setup(&pool).await?;

        let jobs = Jobs::new();
        let tenants = Tenants::new(PgTenantDirectory::new(&pool));
        let rent = CoreRent::init(
            PgRentLedgerStore::new(&pool),
            &tenants,
            &jobs,
            config.rent,
        )
        .await?;

        Ok(Self {
            tenants,
            rent,
            jobs,
        })
    }

    pub fn tenants(&self) -> &Tenants<PgTenantDirectory> {
        &self.tenants
    }

    pub fn rent(&self) -> &CoreRent<PgRentLedgerStore, PgTenantDirectory> {
        &self.rent
    }

    /// The administrative trigger behind the daily schedule; safe to fire
    /// any number of times.
    pub async fn generate_monthly_rent(&self) -> Result<GenerationSummary, ApplicationError> {
        Ok(self.rent.generate_monthly_rent().await?)
    }

    /// M-Pesa confirmation entry point. Never fails: the webhook layer must
    /// acknowledge the gateway no matter what happened internally, or the
    /// gateway will retry-storm.
    #[instrument(name = "app.handle_mpesa_confirmation", skip(self))]
    pub async fn handle_mpesa_confirmation(
        &self,
        msisdn: &str,
        amount: KesCents,
        receipt: &str,
        paid_at: DateTime<Utc>,
    ) {
        let effective = paid_at
            .with_timezone(&self.rent.config().billing_offset())
            .date_naive();
        self.rent
            .record_gateway_payment(msisdn, amount, effective, Some(receipt))
            .await;
    }

    /// Manual payment entry; errors surface to the operator for correction.
    pub async fn record_manual_payment(
        &self,
        tenant_id: TenantId,
        amount: KesCents,
        effective: NaiveDate,
    ) -> Result<RentRecord, ApplicationError> {
        Ok(self
            .rent
            .record_payment(tenant_id, amount, effective, None)
            .await?)
    }

    pub async fn update_utility_charges(
        &self,
        tenant_id: TenantId,
        update: UtilityChargesUpdate,
    ) -> Result<RentRecord, ApplicationError> {
        Ok(self.rent.update_utility_charges(tenant_id, update).await?)
    }

    pub async fn extend_lease(
        &self,
        tenant_id: TenantId,
        months: u32,
    ) -> Result<Tenant, ApplicationError> {
        Ok(self.tenants.extend_lease(tenant_id, months).await?)
    }

    pub async fn rent_history(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<RentRecord>, ApplicationError> {
        Ok(self.rent.rent_history(tenant_id).await?)
    }

    pub fn shutdown(&self) {
        self.jobs.shutdown();
    }
}
