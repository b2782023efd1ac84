//! PostgreSQL-backed user repository.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use leadworks_application::UserRepository;
use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{PermissionTable, RoleId, User, UserId, UserTypeKind};

/// PostgreSQL-backed repository for principal persistence.
///
/// Direct role assignments live in a join table written with
/// `ON CONFLICT DO NOTHING` inserts and targeted deletes. Custom permission
/// grants merge into the stored table under a row lock, so concurrent grants
/// union instead of overwriting each other.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_roles(&self, user_ids: &[uuid::Uuid]) -> AppResult<RoleIndex> {
        let rows = sqlx::query_as::<_, UserRoleRow>(
            "SELECT user_id, role_id FROM authz_user_roles WHERE user_id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user roles: {error}")))?;

        let mut index: RoleIndex = HashMap::new();
        for row in rows {
            index
                .entry(row.user_id)
                .or_default()
                .insert(RoleId::from_uuid(row.role_id));
        }

        Ok(index)
    }

    async fn require_user(
        transaction: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> AppResult<()> {
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM authz_users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut **transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load user: {error}")))?;

        if exists.is_none() {
            return Err(AppError::NotFound(format!(
                "user '{user_id}' does not exist"
            )));
        }

        Ok(())
    }
}

type RoleIndex = HashMap<uuid::Uuid, BTreeSet<RoleId>>;

#[derive(Debug, FromRow)]
struct UserRow {
    id: uuid::Uuid,
    tenant_id: Option<uuid::Uuid>,
    user_type: String,
    custom_permissions: serde_json::Value,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, FromRow)]
struct UserRoleRow {
    user_id: uuid::Uuid,
    role_id: uuid::Uuid,
}

impl UserRow {
    fn into_user(self, roles: BTreeSet<RoleId>) -> AppResult<User> {
        let custom_permissions: PermissionTable = serde_json::from_value(self.custom_permissions)
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to decode permissions for user '{}': {error}",
                    self.id
                ))
            })?;
        let user_type = UserTypeKind::from_str(&self.user_type)?;

        Ok(User::from_storage(
            UserId::from_uuid(self.id),
            self.tenant_id.map(TenantId::from_uuid),
            user_type,
            roles,
            custom_permissions,
            self.is_active,
            self.created_at,
        ))
    }
}

fn encode_permissions(permissions: &PermissionTable) -> AppResult<serde_json::Value> {
    serde_json::to_value(permissions).map_err(|error| {
        AppError::Internal(format!("failed to encode custom permissions: {error}"))
    })
}

const USER_COLUMNS: &str =
    "id, tenant_id, user_type, custom_permissions, is_active, created_at";

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn insert(&self, user: User) -> AppResult<User> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO authz_users
                (id, tenant_id, user_type, custom_permissions, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id().as_uuid())
        .bind(user.tenant().map(|tenant| tenant.as_uuid()))
        .bind(user.user_type().as_str())
        .bind(encode_permissions(user.custom_permissions())?)
        .bind(user.is_active())
        .bind(user.created_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to persist user: {error}")))?;

        for role_id in user.roles() {
            sqlx::query(
                "INSERT INTO authz_user_roles (user_id, role_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user.id().as_uuid())
            .bind(role_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to persist user role: {error}"))
            })?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(user)
    }

    async fn find(&self, user_id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM authz_users WHERE id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user: {error}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut roles = self.load_roles(&[row.id]).await?;
        let row_roles = roles.remove(&row.id).unwrap_or_default();
        row.into_user(row_roles).map(Some)
    }

    async fn list(&self, tenant: TenantId) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM authz_users WHERE tenant_id = $1 ORDER BY created_at"
        ))
        .bind(tenant.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list users: {error}")))?;

        let user_ids: Vec<uuid::Uuid> = rows.iter().map(|row| row.id).collect();
        let mut roles = self.load_roles(&user_ids).await?;

        rows.into_iter()
            .map(|row| {
                let row_roles = roles.remove(&row.id).unwrap_or_default();
                row.into_user(row_roles)
            })
            .collect()
    }

    async fn assign_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        Self::require_user(&mut transaction, user_id).await?;

        for role_id in role_ids {
            sqlx::query(
                "INSERT INTO authz_user_roles (user_id, role_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user_id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to persist user role: {error}"))
            })?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn remove_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        Self::require_user(&mut transaction, user_id).await?;

        let ids: Vec<uuid::Uuid> = role_ids.iter().map(RoleId::as_uuid).collect();
        sqlx::query("DELETE FROM authz_user_roles WHERE user_id = $1 AND role_id = ANY($2)")
            .bind(user_id.as_uuid())
            .bind(&ids)
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete user roles: {error}")))?;

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn grant_custom_permissions(
        &self,
        user_id: UserId,
        permissions: PermissionTable,
    ) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        // Row lock so the read-merge-write below is atomic per user.
        let stored: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT custom_permissions FROM authz_users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user: {error}")))?;

        let Some(stored) = stored else {
            return Err(AppError::NotFound(format!(
                "user '{user_id}' does not exist"
            )));
        };

        let mut merged: PermissionTable = serde_json::from_value(stored).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode permissions for user '{user_id}': {error}"
            ))
        })?;
        merged.merge_from(&permissions);

        sqlx::query("UPDATE authz_users SET custom_permissions = $2 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(encode_permissions(&merged)?)
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to update user: {error}")))?;

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn set_active(&self, user_id: UserId, is_active: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE authz_users SET is_active = $2 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to update user: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "user '{user_id}' does not exist"
            )));
        }

        Ok(())
    }
}
