use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use es_entity::{IntoEvents, TryFromEvents};

use crate::{
    primitives::{BillingMonth, RentRecordId, TenantId},
    rent_record::{NewRentRecord, RentRecord, RentRecordEvent},
    store::{RentLedgerStore, RentLedgerStoreError},
};

/// Postgres-backed rent ledger store. Records are stored as JSONB event
/// lists; the `(tenant_id, month)` unique constraint is what makes record
/// creation race-safe, and the `version` column carries the event count for
/// compare-and-swap updates.
#[derive(Clone)]
pub struct PgRentLedgerStore {
    pool: PgPool,
}

impl PgRentLedgerStore {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    pub async fn setup(pool: &PgPool) -> Result<(), RentLedgerStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rent_records (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                month VARCHAR(7) NOT NULL,
                version INTEGER NOT NULL,
                events JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (tenant_id, month)
            )
            "#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rent_records_tenant ON rent_records (tenant_id)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> Result<RentRecord, RentLedgerStoreError> {
        let id: uuid::Uuid = row.try_get("id")?;
        let events: serde_json::Value = row.try_get("events")?;
        let events: Vec<RentRecordEvent> = serde_json::from_value(events)?;
        Ok(RentRecord::rehydrate(RentRecordId::from(id), events)?)
    }
}

#[async_trait]
impl RentLedgerStore for PgRentLedgerStore {
    async fn create(&self, new_record: NewRentRecord) -> Result<RentRecord, RentLedgerStoreError> {
        let record = RentRecord::try_from_events(new_record.into_events())?;
        let events = serde_json::to_value(record.events_snapshot())?;
        let result = sqlx::query(
            r#"
            INSERT INTO rent_records (id, tenant_id, month, version, events)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(uuid::Uuid::from(record.id))
        .bind(uuid::Uuid::from(record.tenant_id))
        .bind(record.month.to_string())
        .bind(record.version() as i32)
        .bind(events)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(record),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RentLedgerStoreError::DuplicateRecord {
                    tenant_id: record.tenant_id,
                    month: record.month,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_for_month(
        &self,
        tenant_id: TenantId,
        month: BillingMonth,
    ) -> Result<Option<RentRecord>, RentLedgerStoreError> {
        let row = sqlx::query("SELECT id, events FROM rent_records WHERE tenant_id = $1 AND month = $2")
            .bind(uuid::Uuid::from(tenant_id))
            .bind(month.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<RentRecord>, RentLedgerStoreError> {
        let rows = sqlx::query(
            "SELECT id, events FROM rent_records WHERE tenant_id = $1 ORDER BY month DESC",
        )
        .bind(uuid::Uuid::from(tenant_id))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn update(
        &self,
        record: &RentRecord,
        expected_version: usize,
    ) -> Result<(), RentLedgerStoreError> {
        let events = serde_json::to_value(record.events_snapshot())?;
        let result = sqlx::query(
            r#"
            UPDATE rent_records
            SET events = $3, version = $4
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(uuid::Uuid::from(record.id))
        .bind(expected_version as i32)
        .bind(events)
        .bind(record.version() as i32)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RentLedgerStoreError::ConcurrentModification(record.id));
        }
        Ok(())
    }
}
