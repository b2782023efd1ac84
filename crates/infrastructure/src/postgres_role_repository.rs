//! PostgreSQL-backed role repository.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use leadworks_application::RoleRepository;
use leadworks_core::{AppError, AppResult, NonEmptyString, Slug, TenantId};
use leadworks_domain::{PermissionTable, Role, RoleId, RoleType, UserTypeKind};

/// PostgreSQL-backed repository for role persistence.
///
/// Slug and name uniqueness are enforced by database constraints on
/// `(tenant_id, slug)` and `(tenant_id, name)`, and the default-role upsert
/// is a single `ON CONFLICT` statement, so both stay atomic under
/// concurrent writers.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    tenant_id: Option<uuid::Uuid>,
    name: String,
    slug: String,
    description: Option<String>,
    role_type: String,
    for_user_types: serde_json::Value,
    level: i16,
    permissions: serde_json::Value,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl RoleRow {
    fn into_role(self) -> AppResult<Role> {
        let permissions: PermissionTable =
            serde_json::from_value(self.permissions).map_err(|error| {
                AppError::Internal(format!(
                    "failed to decode permissions for role '{}': {error}",
                    self.id
                ))
            })?;
        let for_user_types: BTreeSet<UserTypeKind> = serde_json::from_value(self.for_user_types)
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to decode user types for role '{}': {error}",
                    self.id
                ))
            })?;
        let role_type = self.role_type.parse::<RoleType>()?;
        let level = u8::try_from(self.level).map_err(|error| {
            AppError::Internal(format!("invalid level for role '{}': {error}", self.id))
        })?;

        Ok(Role::from_storage(
            RoleId::from_uuid(self.id),
            NonEmptyString::new(self.name)?,
            Slug::new(self.slug)?,
            self.description,
            permissions,
            role_type,
            for_user_types,
            level,
            self.tenant_id.map(TenantId::from_uuid),
            self.is_active,
            self.created_at,
        ))
    }
}

fn encode_permissions(role: &Role) -> AppResult<serde_json::Value> {
    serde_json::to_value(role.permissions()).map_err(|error| {
        AppError::Internal(format!("failed to encode role permissions: {error}"))
    })
}

fn encode_user_types(role: &Role) -> AppResult<serde_json::Value> {
    serde_json::to_value(role.for_user_types())
        .map_err(|error| AppError::Internal(format!("failed to encode role user types: {error}")))
}

fn map_slug_conflict(error: sqlx::Error, slug: &Slug) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::DuplicateSlug(format!(
            "role slug '{slug}' is already taken in this tenant"
        ));
    }

    AppError::Internal(format!("failed to persist role: {error}"))
}

const ROLE_COLUMNS: &str = "id, tenant_id, name, slug, description, role_type, \
     for_user_types, level, permissions, is_active, created_at";

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn insert(&self, role: Role) -> AppResult<Role> {
        sqlx::query(
            r#"
            INSERT INTO authz_roles
                (id, tenant_id, name, slug, description, role_type,
                 for_user_types, level, permissions, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.tenant().map(|tenant| tenant.as_uuid()))
        .bind(role.name().as_str())
        .bind(role.slug().as_str())
        .bind(role.description())
        .bind(role.role_type().as_str())
        .bind(encode_user_types(&role)?)
        .bind(i16::from(role.level()))
        .bind(encode_permissions(&role)?)
        .bind(role.is_active())
        .bind(role.created_at())
        .execute(&self.pool)
        .await
        .map_err(|error| map_slug_conflict(error, role.slug()))?;

        Ok(role)
    }

    async fn find(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM authz_roles WHERE id = $1"
        ))
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        row.map(RoleRow::into_role).transpose()
    }

    async fn find_many(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>> {
        let ids: Vec<uuid::Uuid> = role_ids.iter().map(RoleId::as_uuid).collect();

        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM authz_roles WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load roles: {error}")))?;

        rows.into_iter().map(RoleRow::into_role).collect()
    }

    async fn list(&self, tenant: TenantId) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM authz_roles \
             WHERE tenant_id = $1 OR tenant_id IS NULL \
             ORDER BY name"
        ))
        .bind(tenant.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        rows.into_iter().map(RoleRow::into_role).collect()
    }

    async fn update(&self, role: Role) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE authz_roles
            SET name = $2,
                description = $3,
                for_user_types = $4,
                level = $5,
                permissions = $6,
                is_active = $7
            WHERE id = $1
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.name().as_str())
        .bind(role.description())
        .bind(encode_user_types(&role)?)
        .bind(i16::from(role.level()))
        .bind(encode_permissions(&role)?)
        .bind(role.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update role: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                role.id()
            )));
        }

        Ok(())
    }

    async fn delete(&self, role_id: RoleId) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM authz_roles WHERE id = $1")
            .bind(role_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' does not exist"
            )));
        }

        Ok(())
    }

    async fn upsert_by_name(&self, role: Role) -> AppResult<Role> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            r#"
            INSERT INTO authz_roles
                (id, tenant_id, name, slug, description, role_type,
                 for_user_types, level, permissions, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id, name) DO UPDATE
            SET description = EXCLUDED.description,
                for_user_types = EXCLUDED.for_user_types,
                level = EXCLUDED.level,
                permissions = EXCLUDED.permissions
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(role.id().as_uuid())
        .bind(role.tenant().map(|tenant| tenant.as_uuid()))
        .bind(role.name().as_str())
        .bind(role.slug().as_str())
        .bind(role.description())
        .bind(role.role_type().as_str())
        .bind(encode_user_types(&role)?)
        .bind(i16::from(role.level()))
        .bind(encode_permissions(&role)?)
        .bind(role.is_active())
        .bind(role.created_at())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to upsert role: {error}")))?;

        row.into_role()
    }
}
