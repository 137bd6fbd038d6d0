use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use es_entity::{IntoEvents, TryFromEvents};

use crate::{
    directory::{TenantDirectory, TenantDirectoryError},
    entity::{NewTenant, Tenant, TenantEvent},
    primitives::TenantId,
};

/// Postgres-backed tenant directory. Each tenant is stored as its JSONB
/// event list plus the projection columns lookups run against; the `version`
/// column carries the event count for compare-and-swap updates.
#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    pub async fn setup(pool: &PgPool) -> Result<(), TenantDirectoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id UUID PRIMARY KEY,
                phone_suffix VARCHAR NOT NULL,
                status VARCHAR NOT NULL,
                version INTEGER NOT NULL,
                events JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tenants_phone_suffix ON tenants (phone_suffix)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tenants_status ON tenants (status)")
            .execute(pool)
            .await?;
        Ok(())
    }

    fn tenant_from_row(row: &PgRow) -> Result<Tenant, TenantDirectoryError> {
        let id: uuid::Uuid = row.try_get("id")?;
        let events: serde_json::Value = row.try_get("events")?;
        let events: Vec<TenantEvent> = serde_json::from_value(events)?;
        Ok(Tenant::rehydrate(TenantId::from(id), events)?)
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn create(&self, new_tenant: NewTenant) -> Result<Tenant, TenantDirectoryError> {
        let tenant = Tenant::try_from_events(new_tenant.into_events())?;
        let events = serde_json::to_value(tenant.events_snapshot())?;
        sqlx::query(
            r#"
            INSERT INTO tenants (id, phone_suffix, status, version, events)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(uuid::Uuid::from(tenant.id))
        .bind(tenant.phone_suffix())
        .bind(tenant.status.to_string())
        .bind(tenant.version() as i32)
        .bind(events)
        .execute(&self.pool)
        .await?;
        Ok(tenant)
    }

    async fn find_by_id(&self, id: TenantId) -> Result<Tenant, TenantDirectoryError> {
        let row = sqlx::query("SELECT id, events FROM tenants WHERE id = $1")
            .bind(uuid::Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or(TenantDirectoryError::NotFound(id))?;
        Self::tenant_from_row(&row)
    }

    async fn list_active(&self) -> Result<Vec<Tenant>, TenantDirectoryError> {
        let rows = sqlx::query(
            "SELECT id, events FROM tenants WHERE status = $1 ORDER BY created_at",
        )
        .bind(crate::primitives::TenancyStatus::Active.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::tenant_from_row).collect()
    }

    async fn find_by_phone_suffix(
        &self,
        suffix: &str,
    ) -> Result<Option<Tenant>, TenantDirectoryError> {
        let row = sqlx::query(
            "SELECT id, events FROM tenants WHERE phone_suffix = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(suffix)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::tenant_from_row).transpose()
    }

    async fn update(
        &self,
        tenant: &Tenant,
        expected_version: usize,
    ) -> Result<(), TenantDirectoryError> {
        let events = serde_json::to_value(tenant.events_snapshot())?;
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET events = $3, version = $4, status = $5, phone_suffix = $6
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(uuid::Uuid::from(tenant.id))
        .bind(expected_version as i32)
        .bind(events)
        .bind(tenant.version() as i32)
        .bind(tenant.status.to_string())
        .bind(tenant.phone_suffix())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(TenantDirectoryError::ConcurrentModification(tenant.id));
        }
        Ok(())
    }
}
