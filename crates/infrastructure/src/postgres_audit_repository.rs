//! PostgreSQL-backed audit trail.

use async_trait::async_trait;
use sqlx::PgPool;

use leadworks_application::{AuditEvent, AuditRepository};
use leadworks_core::{AppError, AppResult};

/// Append-only audit trail persisted to PostgreSQL.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_audit_events
                (id, tenant_id, actor_id, action, resource_type, resource_id, detail, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(event.tenant.map(|tenant| tenant.as_uuid()))
        .bind(event.actor.as_uuid())
        .bind(event.action.as_str())
        .bind(event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.detail)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to persist audit event: {error}")))?;

        Ok(())
    }
}
