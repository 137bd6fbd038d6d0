#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg_attr(feature = "fail-on-warnings", deny(clippy::all))]

mod config;
pub mod error;
mod jobs;
mod postgres;
mod primitives;
mod rent_record;
mod store;
mod time;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::instrument;

use core_tenant::{Tenant, TenantDirectory, Tenants};
use job::Jobs;

pub use config::{GenerationRunTime, RentConfig};
use error::CoreRentError;
use jobs::generate_rent::{GenerateRentInit, GenerateRentJobConfig};
pub use postgres::PgRentLedgerStore;
pub use primitives::*;
pub use rent_record::{
    CarryForward, NewRentRecord, RentRecord, RentRecordEvent, UtilityCharges,
    UtilityChargesUpdate, due_date_for,
};
pub use store::{RentLedgerStore, RentLedgerStoreError};

/// Outcome of one generation pass over the active tenants.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub month: BillingMonth,
    pub generated: usize,
    pub skipped: usize,
    pub failed: Vec<TenantId>,
}

/// The rent ledger engine: creates one rent record per active tenant per
/// billing month, applies confirmed payments, and carries arrears/credit
/// forward month to month.
pub struct CoreRent<S, D> {
    store: Arc<S>,
    tenants: Tenants<D>,
    config: RentConfig,
}

impl<S, D> Clone for CoreRent<S, D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tenants: self.tenants.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, D> CoreRent<S, D>
where
    S: RentLedgerStore,
    D: TenantDirectory,
{
    /// Construct the engine without scheduling. The generation operation
    /// stays directly callable; `init` layers the daily job on top.
    pub fn new(store: S, tenants: &Tenants<D>, config: RentConfig) -> Self {
        Self {
            store: Arc::new(store),
            tenants: tenants.clone(),
            config,
        }
    }

    pub async fn init(
        store: S,
        tenants: &Tenants<D>,
        jobs: &Jobs,
        config: RentConfig,
    ) -> Result<Self, CoreRentError> {
        let rent = Self::new(store, tenants, config);

        // Runs once at startup (generation is idempotent, so this doubles as
        // catch-up after downtime) and then reschedules itself daily.
        jobs.add_initializer_and_spawn_unique(
            GenerateRentInit::new(&rent),
            GenerateRentJobConfig::<S, D>::new(),
        )
        .await?;

        Ok(rent)
    }

    pub fn config(&self) -> &RentConfig {
        &self.config
    }

    /// Ensure every active tenant has a rent record for the current billing
    /// month, carrying forward the prior month's unsettled balance. Safe to
    /// run any number of times per day; a single tenant's failure never
    /// aborts the batch.
    #[instrument(name = "rent.generate_monthly_rent", skip(self), err)]
    pub async fn generate_monthly_rent(&self) -> Result<GenerationSummary, CoreRentError> {
        let now = crate::time::now();
        let month = BillingMonth::containing(now, self.config.billing_offset());
        let today = now.with_timezone(&self.config.billing_offset()).date_naive();

        let tenants = self.tenants.list_active().await?;
        let mut summary = GenerationSummary {
            month,
            generated: 0,
            skipped: 0,
            failed: Vec::new(),
        };
        for tenant in tenants {
            match self.generate_for_tenant(&tenant, month, today).await {
                Ok(true) => summary.generated += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        tenant_id = %tenant.id,
                        error = %e,
                        "rent generation failed for tenant"
                    );
                    summary.failed.push(tenant.id);
                }
            }
        }
        tracing::info!(
            month = %month,
            generated = summary.generated,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "monthly rent generation finished"
        );
        Ok(summary)
    }

    async fn generate_for_tenant(
        &self,
        tenant: &Tenant,
        month: BillingMonth,
        today: NaiveDate,
    ) -> Result<bool, CoreRentError> {
        let (record, created) = match self.store.find_for_month(tenant.id, month).await? {
            Some(record) => (record, false),
            None => {
                let carry = match self.store.find_for_month(tenant.id, month.previous()).await? {
                    Some(prior) => prior.carry_forward(),
                    None => CarryForward::default(),
                };
                match self.create_record(tenant, month, today, carry).await? {
                    Some(record) => (record, true),
                    // Lost a create race; the record exists now.
                    None => (
                        self.store
                            .find_for_month(tenant.id, month)
                            .await?
                            .ok_or(CoreRentError::RentRecordNotFound {
                                tenant_id: tenant.id,
                                month,
                            })?,
                        false,
                    ),
                }
            }
        };

        // Idempotent: a no-op for every pass after the one that posted.
        self.tenants.post_monthly_rent(tenant.id, month).await?;

        if record.status_as_of(today) == PaymentStatus::Overdue {
            self.tenants.mark_overdue(tenant.id, month).await?;
        }

        Ok(created)
    }

    async fn create_record(
        &self,
        tenant: &Tenant,
        month: BillingMonth,
        today: NaiveDate,
        carry: CarryForward,
    ) -> Result<Option<RentRecord>, CoreRentError> {
        let new_record = NewRentRecord::builder()
            .id(RentRecordId::new())
            .tenant_id(tenant.id)
            .month(month)
            .base_rent(tenant.monthly_rent)
            .previous_balance(carry.previous_balance)
            .credit_balance(carry.credit_balance)
            .due_date(due_date_for(month, today, self.config.due_day()))
            .build()
            .expect("could not build new rent record");
        match self.store.create(new_record).await {
            Ok(record) => Ok(Some(record)),
            Err(RentLedgerStoreError::DuplicateRecord { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a confirmed payment to the record of the month `effective`
    /// falls in and recompute the tenant's balance and status. Callers on
    /// administrative paths see the errors; the gateway path wraps this.
    #[instrument(name = "rent.record_payment", skip(self), err)]
    pub async fn record_payment(
        &self,
        tenant_id: impl Into<TenantId> + std::fmt::Debug + Copy,
        amount: KesCents,
        effective: NaiveDate,
        reference: Option<&str>,
    ) -> Result<RentRecord, CoreRentError> {
        if amount.is_zero() {
            return Err(CoreRentError::ZeroPaymentAmount);
        }
        let tenant_id = tenant_id.into();
        let month = BillingMonth::of_date(effective);

        let (record, applied) = self
            .apply_payment_to_record(tenant_id, month, amount, effective, reference)
            .await?;
        if applied {
            self.tenants
                .apply_payment(tenant_id, month, amount, record.carried_forward_amount())
                .await?;
        }
        Ok(record)
    }

    /// Only the record mutation lives inside the retry boundary: a retried
    /// attempt reloads the record, so a payment is never applied twice.
    #[es_entity::retry_on_concurrent_modification(any_error = true)]
    async fn apply_payment_to_record(
        &self,
        tenant_id: TenantId,
        month: BillingMonth,
        amount: KesCents,
        effective: NaiveDate,
        reference: Option<&str>,
    ) -> Result<(RentRecord, bool), CoreRentError> {
        let mut record = self
            .store
            .find_for_month(tenant_id, month)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    %tenant_id,
                    %month,
                    "payment for a month with no rent record, refusing to fabricate one"
                );
                CoreRentError::RentRecordNotFound { tenant_id, month }
            })?;

        let version = record.version();
        let applied = record
            .apply_payment(PaymentId::new(), amount, reference, effective)
            .did_execute();
        if applied {
            self.store.update(&record, version).await?;
        }
        Ok((record, applied))
    }

    /// Entry point for mobile-money confirmations. Resolves the tenant by
    /// phone suffix; anything that cannot be applied is logged and dropped
    /// so the webhook layer can always acknowledge the gateway.
    #[instrument(name = "rent.record_gateway_payment", skip(self))]
    pub async fn record_gateway_payment(
        &self,
        phone: &str,
        amount: KesCents,
        effective: NaiveDate,
        reference: Option<&str>,
    ) {
        let tenant = match self.tenants.find_by_phone(phone).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                tracing::warn!(phone, "gateway payment matched no tenant, dropping");
                return;
            }
            Err(e) => {
                tracing::error!(phone, error = %e, "tenant lookup failed for gateway payment, dropping");
                return;
            }
        };
        if let Err(e) = self
            .record_payment(tenant.id, amount, effective, reference)
            .await
        {
            tracing::error!(tenant_id = %tenant.id, error = %e, "gateway payment could not be applied, dropping");
        }
    }

    /// Replace utility line items on the current month's record. Creates the
    /// record (without arrears) when invoked before the generation pass.
    #[instrument(name = "rent.update_utility_charges", skip(self), err)]
    #[es_entity::retry_on_concurrent_modification(any_error = true)]
    pub async fn update_utility_charges(
        &self,
        tenant_id: impl Into<TenantId> + std::fmt::Debug + Copy,
        update: UtilityChargesUpdate,
    ) -> Result<RentRecord, CoreRentError> {
        let tenant_id = tenant_id.into();
        let now = crate::time::now();
        let month = BillingMonth::containing(now, self.config.billing_offset());
        let today = now.with_timezone(&self.config.billing_offset()).date_naive();

        let mut record = match self.store.find_for_month(tenant_id, month).await? {
            Some(record) => record,
            None => {
                let tenant = self.tenants.find_by_id(tenant_id).await?;
                let record = match self
                    .create_record(&tenant, month, today, CarryForward::default())
                    .await?
                {
                    Some(record) => record,
                    None => self.store.find_for_month(tenant_id, month).await?.ok_or(
                        CoreRentError::RentRecordNotFound { tenant_id, month },
                    )?,
                };
                self.tenants.post_monthly_rent(tenant_id, month).await?;
                record
            }
        };

        let version = record.version();
        if record
            .update_charges(update.merged_onto(record.charges))
            .did_execute()
        {
            self.store.update(&record, version).await?;
        }
        Ok(record)
    }

    /// A tenant's rent records, most recent month first.
    #[instrument(name = "rent.history", skip(self), err)]
    pub async fn rent_history(
        &self,
        tenant_id: impl Into<TenantId> + std::fmt::Debug,
    ) -> Result<Vec<RentRecord>, CoreRentError> {
        Ok(self.store.list_for_tenant(tenant_id.into()).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use core_tenant::{
        NewTenant, TenancyStatus, Tenant, TenantDirectory, TenantDirectoryError, TenantEvent,
    };
    use es_entity::{IntoEvents, TryFromEvents};

    use super::*;

    #[derive(Clone, Default)]
    struct MemTenantDirectory {
        tenants: Arc<Mutex<Vec<(TenantId, Vec<TenantEvent>)>>>,
    }

    #[async_trait]
    impl TenantDirectory for MemTenantDirectory {
        async fn create(&self, new_tenant: NewTenant) -> Result<Tenant, TenantDirectoryError> {
            let tenant = Tenant::try_from_events(new_tenant.into_events())?;
            self.tenants
                .lock()
                .unwrap()
                .push((tenant.id, tenant.events_snapshot()));
            Ok(tenant)
        }

        async fn find_by_id(&self, id: TenantId) -> Result<Tenant, TenantDirectoryError> {
            let guard = self.tenants.lock().unwrap();
            let (_, events) = guard
                .iter()
                .find(|(tenant_id, _)| *tenant_id == id)
                .ok_or(TenantDirectoryError::NotFound(id))?;
            Ok(Tenant::rehydrate(id, events.clone())?)
        }

        async fn list_active(&self) -> Result<Vec<Tenant>, TenantDirectoryError> {
            let snapshots: Vec<_> = self.tenants.lock().unwrap().clone();
            let mut active = Vec::new();
            for (id, events) in snapshots {
                let tenant = Tenant::rehydrate(id, events)?;
                if tenant.is_active() {
                    active.push(tenant);
                }
            }
            Ok(active)
        }

        async fn find_by_phone_suffix(
            &self,
            suffix: &str,
        ) -> Result<Option<Tenant>, TenantDirectoryError> {
            let snapshots: Vec<_> = self.tenants.lock().unwrap().clone();
            for (id, events) in snapshots {
                let tenant = Tenant::rehydrate(id, events)?;
                if tenant.phone_suffix() == suffix {
                    return Ok(Some(tenant));
                }
            }
            Ok(None)
        }

        async fn update(
            &self,
            tenant: &Tenant,
            expected_version: usize,
        ) -> Result<(), TenantDirectoryError> {
            let mut guard = self.tenants.lock().unwrap();
            let entry = guard
                .iter_mut()
                .find(|(tenant_id, _)| *tenant_id == tenant.id)
                .ok_or(TenantDirectoryError::NotFound(tenant.id))?;
            if entry.1.len() != expected_version {
                return Err(TenantDirectoryError::ConcurrentModification(tenant.id));
            }
            entry.1 = tenant.events_snapshot();
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MemRentLedgerStore {
        records: Arc<Mutex<Vec<(RentRecordId, TenantId, BillingMonth, Vec<RentRecordEvent>)>>>,
        fail_create_for: Arc<Mutex<Option<TenantId>>>,
    }

    fn storage_failure() -> RentLedgerStoreError {
        RentLedgerStoreError::Serde(serde_json::from_str::<usize>("boom").unwrap_err())
    }

    #[async_trait]
    impl RentLedgerStore for MemRentLedgerStore {
        async fn create(
            &self,
            new_record: NewRentRecord,
        ) -> Result<RentRecord, RentLedgerStoreError> {
            let record = RentRecord::try_from_events(new_record.into_events())?;
            if *self.fail_create_for.lock().unwrap() == Some(record.tenant_id) {
                return Err(storage_failure());
            }
            let mut guard = self.records.lock().unwrap();
            if guard
                .iter()
                .any(|(_, tenant_id, month, _)| {
                    *tenant_id == record.tenant_id && *month == record.month
                })
            {
                return Err(RentLedgerStoreError::DuplicateRecord {
                    tenant_id: record.tenant_id,
                    month: record.month,
                });
            }
            guard.push((
                record.id,
                record.tenant_id,
                record.month,
                record.events_snapshot(),
            ));
            Ok(record)
        }

        async fn find_for_month(
            &self,
            tenant_id: TenantId,
            month: BillingMonth,
        ) -> Result<Option<RentRecord>, RentLedgerStoreError> {
            let guard = self.records.lock().unwrap();
            let found = guard
                .iter()
                .find(|(_, t, m, _)| *t == tenant_id && *m == month)
                .map(|(id, _, _, events)| (*id, events.clone()));
            drop(guard);
            found
                .map(|(id, events)| Ok(RentRecord::rehydrate(id, events)?))
                .transpose()
        }

        async fn list_for_tenant(
            &self,
            tenant_id: TenantId,
        ) -> Result<Vec<RentRecord>, RentLedgerStoreError> {
            let mut snapshots: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, t, _, _)| *t == tenant_id)
                .map(|(id, _, month, events)| (*id, *month, events.clone()))
                .collect();
            snapshots.sort_by(|a, b| b.1.cmp(&a.1));
            snapshots
                .into_iter()
                .map(|(id, _, events)| Ok(RentRecord::rehydrate(id, events)?))
                .collect()
        }

        async fn update(
            &self,
            record: &RentRecord,
            expected_version: usize,
        ) -> Result<(), RentLedgerStoreError> {
            let mut guard = self.records.lock().unwrap();
            let entry = guard
                .iter_mut()
                .find(|(id, _, _, _)| *id == record.id)
                .ok_or(RentLedgerStoreError::ConcurrentModification(record.id))?;
            if entry.3.len() != expected_version {
                return Err(RentLedgerStoreError::ConcurrentModification(record.id));
            }
            entry.3 = record.events_snapshot();
            Ok(())
        }
    }

    struct Harness {
        rent: CoreRent<MemRentLedgerStore, MemTenantDirectory>,
        tenants: Tenants<MemTenantDirectory>,
        store: MemRentLedgerStore,
        month: BillingMonth,
        today: chrono::NaiveDate,
    }

    fn harness() -> Harness {
        let config = RentConfig::default();
        let now = Utc::now();
        let month = BillingMonth::containing(now, config.billing_offset());
        let today = now.with_timezone(&config.billing_offset()).date_naive();
        let store = MemRentLedgerStore::default();
        let tenants = Tenants::new(MemTenantDirectory::default());
        let rent = CoreRent::new(store.clone(), &tenants, config);
        Harness {
            rent,
            tenants,
            store,
            month,
            today,
        }
    }

    async fn active_tenant(h: &Harness, phone: &str, rent_cents: u64) -> Tenant {
        h.tenants
            .create_tenant(
                "Wanjiku Kamau",
                phone,
                "A-1",
                KesCents::from(rent_cents),
                h.today - chrono::Months::new(6),
                h.today + chrono::Months::new(6),
            )
            .await
            .unwrap()
    }

    /// Seed a record for an arbitrary month directly in the store.
    async fn seed_record(
        h: &Harness,
        tenant_id: TenantId,
        month: BillingMonth,
        base_rent: u64,
        credit_balance: u64,
        amount_paid: u64,
    ) -> RentRecord {
        let mut record = h
            .store
            .create(
                NewRentRecord::builder()
                    .id(RentRecordId::new())
                    .tenant_id(tenant_id)
                    .month(month)
                    .base_rent(KesCents::from(base_rent))
                    .credit_balance(KesCents::from(credit_balance))
                    .due_date(month.day(5).unwrap())
                    .build()
                    .expect("could not build new rent record"),
            )
            .await
            .unwrap();
        if amount_paid > 0 {
            let version = record.version();
            assert!(
                record
                    .apply_payment(
                        PaymentId::new(),
                        KesCents::from(amount_paid),
                        None,
                        month.day(10).unwrap(),
                    )
                    .did_execute()
            );
            h.store.update(&record, version).await.unwrap();
        }
        record
    }

    #[tokio::test]
    async fn generation_is_idempotent_per_tenant_per_month() {
        let h = harness();
        let first = active_tenant(&h, "+254712345678", 10_000).await;
        let second = active_tenant(&h, "+254798765432", 8_000).await;
        let expired = active_tenant(&h, "+254700000001", 9_000).await;
        h.tenants
            .update_status(expired.id, TenancyStatus::Expired)
            .await
            .unwrap();

        let summary = h.rent.generate_monthly_rent().await.unwrap();
        assert_eq!(summary.generated, 2);
        assert_eq!(summary.skipped, 0);
        assert!(summary.failed.is_empty());

        let summary = h.rent.generate_monthly_rent().await.unwrap();
        assert_eq!(summary.generated, 0);
        assert_eq!(summary.skipped, 2);

        // One record each, and the balance was posted exactly once.
        for (tenant, rent_cents) in [(&first, 10_000u64), (&second, 8_000)] {
            let history = h.rent.rent_history(tenant.id).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].month, h.month);
            assert_eq!(history[0].carried_forward_amount(), KesCents::from(rent_cents));
            let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
            assert_eq!(reloaded.balance, SignedKesCents::from(KesCents::from(rent_cents)));
            assert_eq!(reloaded.current_month, Some(h.month));
        }
        // The expired tenant was not billed.
        assert!(h.rent.rent_history(expired.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn arrears_carry_into_the_generated_month() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        seed_record(&h, tenant.id, h.month.previous(), 10_000, 0, 4_000).await;

        h.rent.generate_monthly_rent().await.unwrap();

        let record = h
            .store
            .find_for_month(tenant.id, h.month)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.previous_balance, KesCents::from(6_000));
        assert_eq!(record.credit_balance, KesCents::ZERO);
        assert_eq!(record.carried_forward_amount(), KesCents::from(16_000));
    }

    #[tokio::test]
    async fn credit_carries_into_the_generated_month() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        seed_record(&h, tenant.id, h.month.previous(), 10_000, 0, 15_000).await;

        h.rent.generate_monthly_rent().await.unwrap();

        let record = h
            .store
            .find_for_month(tenant.id, h.month)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.previous_balance, KesCents::ZERO);
        assert_eq!(record.credit_balance, KesCents::from(5_000));
        assert_eq!(record.carried_forward_amount(), KesCents::from(5_000));
    }

    #[tokio::test]
    async fn unconsumed_credit_keeps_compounding() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        // Prior month fully covered by inherited credit, nothing paid:
        // 30_000 credit - 10_000 rent leaves 20_000 to roll on.
        seed_record(&h, tenant.id, h.month.previous(), 10_000, 30_000, 0).await;

        h.rent.generate_monthly_rent().await.unwrap();

        let record = h
            .store
            .find_for_month(tenant.id, h.month)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.previous_balance, KesCents::ZERO);
        assert_eq!(record.credit_balance, KesCents::from(20_000));
        assert_eq!(record.carried_forward_amount(), KesCents::ZERO);
        assert_eq!(record.status(), PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn lost_create_race_is_absorbed_as_skip() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        seed_record(&h, tenant.id, h.month, 10_000, 0, 0).await;

        let summary = h.rent.generate_monthly_rent().await.unwrap();
        assert_eq!(summary.generated, 0);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failed.is_empty());
        assert_eq!(h.rent.rent_history(tenant.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_tenant_failure_does_not_abort_the_batch() {
        let h = harness();
        let healthy_a = active_tenant(&h, "+254712345678", 10_000).await;
        let failing = active_tenant(&h, "+254798765432", 8_000).await;
        let healthy_b = active_tenant(&h, "+254700000001", 9_000).await;
        *h.store.fail_create_for.lock().unwrap() = Some(failing.id);

        let summary = h.rent.generate_monthly_rent().await.unwrap();
        assert_eq!(summary.generated, 2);
        assert_eq!(summary.failed, vec![failing.id]);
        assert_eq!(h.rent.rent_history(healthy_a.id).await.unwrap().len(), 1);
        assert_eq!(h.rent.rent_history(healthy_b.id).await.unwrap().len(), 1);
        assert!(h.rent.rent_history(failing.id).await.unwrap().is_empty());

        // The next run repairs the failed tenant.
        *h.store.fail_create_for.lock().unwrap() = None;
        let summary = h.rent.generate_monthly_rent().await.unwrap();
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(h.rent.rent_history(failing.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payments_update_record_and_tenant_balance() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        h.rent.generate_monthly_rent().await.unwrap();
        let effective = h.month.day(10).unwrap();

        let record = h
            .rent
            .record_payment(tenant.id, KesCents::from(3_000), effective, None)
            .await
            .unwrap();
        assert_eq!(record.amount_paid, KesCents::from(3_000));
        assert_eq!(record.status(), PaymentStatus::Partial);
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::from(7_000));
        assert_eq!(reloaded.payment_status, PaymentStatus::Partial);

        let record = h
            .rent
            .record_payment(tenant.id, KesCents::from(4_000), effective, None)
            .await
            .unwrap();
        assert_eq!(record.amount_paid, KesCents::from(7_000));
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::from(3_000));

        let record = h
            .rent
            .record_payment(tenant.id, KesCents::from(3_000), effective, None)
            .await
            .unwrap();
        assert_eq!(record.status(), PaymentStatus::Paid);
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::ZERO);
        assert_eq!(reloaded.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn zero_and_recordless_payments_are_rejected_before_mutation() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;

        let result = h
            .rent
            .record_payment(tenant.id, KesCents::ZERO, h.today, None)
            .await;
        assert!(matches!(result, Err(CoreRentError::ZeroPaymentAmount)));

        // No record was ever generated for this month.
        let result = h
            .rent
            .record_payment(tenant.id, KesCents::from(1_000), h.today, None)
            .await;
        assert!(matches!(
            result,
            Err(CoreRentError::RentRecordNotFound { .. })
        ));
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::ZERO);
    }

    #[tokio::test]
    async fn catching_up_on_an_old_month_rebuilds_the_balance() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        seed_record(&h, tenant.id, h.month.previous(), 10_000, 0, 0).await;
        h.rent.generate_monthly_rent().await.unwrap();

        // The marker points at the current month; paying off February must
        // not subtract from the current month's running balance.
        let effective = h.month.previous().day(20).unwrap();
        h.rent
            .record_payment(tenant.id, KesCents::from(4_000), effective, None)
            .await
            .unwrap();

        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::from(6_000));
        assert_eq!(reloaded.payment_status, PaymentStatus::Partial);
    }

    #[tokio::test]
    async fn gateway_payments_resolve_by_phone_suffix_and_never_error() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        h.rent.generate_monthly_rent().await.unwrap();
        let effective = h.month.day(10).unwrap();

        // Same subscriber, different formatting than on file.
        h.rent
            .record_gateway_payment("0712345678", KesCents::from(4_000), effective, Some("SGR1"))
            .await;
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::from(6_000));

        // Redelivered confirmation: same receipt, no double application.
        h.rent
            .record_gateway_payment("0712345678", KesCents::from(4_000), effective, Some("SGR1"))
            .await;
        let record = h
            .store
            .find_for_month(tenant.id, h.month)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.amount_paid, KesCents::from(4_000));
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::from(6_000));

        // Unknown subscriber: dropped, nothing changes, no error surfaces.
        h.rent
            .record_gateway_payment("0700999999", KesCents::from(4_000), effective, Some("SGR2"))
            .await;
        assert_eq!(h.rent.rent_history(tenant.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn utility_update_recomputes_the_current_month() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 12_000).await;
        h.rent.generate_monthly_rent().await.unwrap();

        let record = h
            .rent
            .update_utility_charges(
                tenant.id,
                UtilityChargesUpdate {
                    water: Some(KesCents::from(500)),
                    electricity: Some(KesCents::from(1_200)),
                    garbage: Some(KesCents::from(300)),
                    security: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(record.amount(), KesCents::from(14_000));
        assert_eq!(record.carried_forward_amount(), KesCents::from(14_000));

        // A later partial update keeps the other line items.
        let record = h
            .rent
            .update_utility_charges(
                tenant.id,
                UtilityChargesUpdate {
                    water: Some(KesCents::from(700)),
                    ..UtilityChargesUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.charges.electricity, KesCents::from(1_200));
        assert_eq!(record.amount(), KesCents::from(14_200));
    }

    #[tokio::test]
    async fn utility_update_before_generation_creates_and_posts_the_month() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 12_000).await;

        let record = h
            .rent
            .update_utility_charges(
                tenant.id,
                UtilityChargesUpdate {
                    water: Some(KesCents::from(500)),
                    ..UtilityChargesUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.month, h.month);
        assert_eq!(record.base_rent, KesCents::from(12_000));
        assert_eq!(record.previous_balance, KesCents::ZERO);
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::from(12_000));

        // The later generation pass skips the record and must not double
        // the tenant's obligation.
        let summary = h.rent.generate_monthly_rent().await.unwrap();
        assert_eq!(summary.generated, 0);
        assert_eq!(summary.skipped, 1);
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.balance, SignedKesCents::from(12_000));
    }

    #[tokio::test]
    async fn history_returns_most_recent_month_first() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        seed_record(&h, tenant.id, h.month.previous().previous(), 10_000, 0, 10_000).await;
        seed_record(&h, tenant.id, h.month.previous(), 10_000, 0, 0).await;
        h.rent.generate_monthly_rent().await.unwrap();

        let history = h.rent.rent_history(tenant.id).await.unwrap();
        let months: Vec<_> = history.iter().map(|r| r.month).collect();
        assert_eq!(
            months,
            vec![
                h.month,
                h.month.previous(),
                h.month.previous().previous()
            ]
        );
    }

    #[tokio::test]
    async fn overdue_records_mark_the_tenant_on_the_daily_pass() {
        let h = harness();
        let tenant = active_tenant(&h, "+254712345678", 10_000).await;
        // A record whose due date has long passed, still unpaid.
        let record = h
            .store
            .create(
                NewRentRecord::builder()
                    .id(RentRecordId::new())
                    .tenant_id(tenant.id)
                    .month(h.month)
                    .base_rent(KesCents::from(10_000))
                    .due_date(h.today - chrono::Days::new(10))
                    .build()
                    .expect("could not build new rent record"),
            )
            .await
            .unwrap();
        assert_eq!(record.status_as_of(h.today), PaymentStatus::Overdue);

        h.rent.generate_monthly_rent().await.unwrap();
        let reloaded = h.tenants.find_by_id(tenant.id).await.unwrap();
        assert_eq!(reloaded.payment_status, PaymentStatus::Overdue);
    }
}
