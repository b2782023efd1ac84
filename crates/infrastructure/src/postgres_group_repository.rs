//! PostgreSQL-backed group repository.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use leadworks_application::GroupRepository;
use leadworks_core::{AppError, AppResult, NonEmptyString, Slug, TenantId};
use leadworks_domain::{Group, GroupId, PermissionTable, RoleId, UserId};

/// PostgreSQL-backed repository for group persistence.
///
/// Membership and role assignments live in join tables and are written with
/// `ON CONFLICT DO NOTHING` inserts and targeted deletes, so concurrent
/// mutations union instead of overwriting each other. Detail updates touch
/// only the group row and never the join tables.
#[derive(Clone)]
pub struct PostgresGroupRepository {
    pool: PgPool,
}

impl PostgresGroupRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_members(&self, group_ids: &[uuid::Uuid]) -> AppResult<MemberIndex> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT group_id, user_id FROM authz_group_members WHERE group_id = ANY($1)",
        )
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load group members: {error}")))?;

        let mut index: MemberIndex = HashMap::new();
        for row in rows {
            index
                .entry(row.group_id)
                .or_default()
                .insert(UserId::from_uuid(row.user_id));
        }

        Ok(index)
    }

    async fn load_roles(&self, group_ids: &[uuid::Uuid]) -> AppResult<RoleIndex> {
        let rows = sqlx::query_as::<_, GroupRoleRow>(
            "SELECT group_id, role_id FROM authz_group_roles WHERE group_id = ANY($1)",
        )
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load group roles: {error}")))?;

        let mut index: RoleIndex = HashMap::new();
        for row in rows {
            index
                .entry(row.group_id)
                .or_default()
                .insert(RoleId::from_uuid(row.role_id));
        }

        Ok(index)
    }

    async fn hydrate(&self, rows: Vec<GroupRow>) -> AppResult<Vec<Group>> {
        let group_ids: Vec<uuid::Uuid> = rows.iter().map(|row| row.id).collect();
        let mut members = self.load_members(&group_ids).await?;
        let mut roles = self.load_roles(&group_ids).await?;

        rows.into_iter()
            .map(|row| {
                let row_members = members.remove(&row.id).unwrap_or_default();
                let row_roles = roles.remove(&row.id).unwrap_or_default();
                row.into_group(row_members, row_roles)
            })
            .collect()
    }

    async fn require_group(
        transaction: &mut Transaction<'_, Postgres>,
        group_id: GroupId,
    ) -> AppResult<()> {
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM authz_groups WHERE id = $1")
            .bind(group_id.as_uuid())
            .fetch_optional(&mut **transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load group: {error}")))?;

        if exists.is_none() {
            return Err(AppError::NotFound(format!(
                "group '{group_id}' does not exist"
            )));
        }

        Ok(())
    }
}

type MemberIndex = HashMap<uuid::Uuid, BTreeSet<UserId>>;
type RoleIndex = HashMap<uuid::Uuid, BTreeSet<RoleId>>;

#[derive(Debug, FromRow)]
struct GroupRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    parent_group_id: Option<uuid::Uuid>,
    group_permissions: serde_json::Value,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, FromRow)]
struct MemberRow {
    group_id: uuid::Uuid,
    user_id: uuid::Uuid,
}

#[derive(Debug, FromRow)]
struct GroupRoleRow {
    group_id: uuid::Uuid,
    role_id: uuid::Uuid,
}

impl GroupRow {
    fn into_group(self, members: BTreeSet<UserId>, roles: BTreeSet<RoleId>) -> AppResult<Group> {
        let group_permissions: PermissionTable = serde_json::from_value(self.group_permissions)
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to decode permissions for group '{}': {error}",
                    self.id
                ))
            })?;

        Ok(Group::from_storage(
            GroupId::from_uuid(self.id),
            NonEmptyString::new(self.name)?,
            Slug::new(self.slug)?,
            self.description,
            TenantId::from_uuid(self.tenant_id),
            self.parent_group_id.map(GroupId::from_uuid),
            members,
            roles,
            group_permissions,
            self.is_active,
            self.created_at,
        ))
    }
}

fn encode_permissions(group: &Group) -> AppResult<serde_json::Value> {
    serde_json::to_value(group.group_permissions()).map_err(|error| {
        AppError::Internal(format!("failed to encode group permissions: {error}"))
    })
}

fn map_slug_conflict(error: sqlx::Error, slug: &Slug) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::DuplicateSlug(format!(
            "group slug '{slug}' is already taken in this tenant"
        ));
    }

    AppError::Internal(format!("failed to persist group: {error}"))
}

const GROUP_COLUMNS: &str = "id, tenant_id, name, slug, description, parent_group_id, \
     group_permissions, is_active, created_at";

#[async_trait]
impl GroupRepository for PostgresGroupRepository {
    async fn insert(&self, group: Group) -> AppResult<Group> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO authz_groups
                (id, tenant_id, name, slug, description, parent_group_id,
                 group_permissions, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(group.id().as_uuid())
        .bind(group.tenant().as_uuid())
        .bind(group.name().as_str())
        .bind(group.slug().as_str())
        .bind(group.description())
        .bind(group.parent_group().map(|parent| parent.as_uuid()))
        .bind(encode_permissions(&group)?)
        .bind(group.is_active())
        .bind(group.created_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_slug_conflict(error, group.slug()))?;

        for user_id in group.members() {
            sqlx::query(
                "INSERT INTO authz_group_members (group_id, user_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(group.id().as_uuid())
            .bind(user_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to persist group member: {error}"))
            })?;
        }

        for role_id in group.roles() {
            sqlx::query(
                "INSERT INTO authz_group_roles (group_id, role_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(group.id().as_uuid())
            .bind(role_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to persist group role: {error}"))
            })?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(group)
    }

    async fn find(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM authz_groups WHERE id = $1"
        ))
        .bind(group_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load group: {error}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        self.hydrate(vec![row]).await.map(|mut groups| groups.pop())
    }

    async fn list(&self, tenant: TenantId) -> AppResult<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM authz_groups WHERE tenant_id = $1 ORDER BY name"
        ))
        .bind(tenant.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list groups: {error}")))?;

        self.hydrate(rows).await
    }

    async fn update_details(&self, group: Group) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE authz_groups
            SET name = $2,
                description = $3,
                parent_group_id = $4,
                group_permissions = $5,
                is_active = $6
            WHERE id = $1
            "#,
        )
        .bind(group.id().as_uuid())
        .bind(group.name().as_str())
        .bind(group.description())
        .bind(group.parent_group().map(|parent| parent.as_uuid()))
        .bind(encode_permissions(&group)?)
        .bind(group.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update group: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "group '{}' does not exist",
                group.id()
            )));
        }

        Ok(())
    }

    async fn delete(&self, group_id: GroupId) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        sqlx::query("DELETE FROM authz_group_members WHERE group_id = $1")
            .bind(group_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete group members: {error}"))
            })?;

        sqlx::query("DELETE FROM authz_group_roles WHERE group_id = $1")
            .bind(group_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete group roles: {error}"))
            })?;

        let result = sqlx::query("DELETE FROM authz_groups WHERE id = $1")
            .bind(group_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete group: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "group '{group_id}' does not exist"
            )));
        }

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn add_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        Self::require_group(&mut transaction, group_id).await?;

        for user_id in user_ids {
            sqlx::query(
                "INSERT INTO authz_group_members (group_id, user_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(group_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to persist group member: {error}"))
            })?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn remove_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        Self::require_group(&mut transaction, group_id).await?;

        let ids: Vec<uuid::Uuid> = user_ids.iter().map(UserId::as_uuid).collect();
        sqlx::query("DELETE FROM authz_group_members WHERE group_id = $1 AND user_id = ANY($2)")
            .bind(group_id.as_uuid())
            .bind(&ids)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete group members: {error}"))
            })?;

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn assign_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        Self::require_group(&mut transaction, group_id).await?;

        for role_id in role_ids {
            sqlx::query(
                "INSERT INTO authz_group_roles (group_id, role_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(group_id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to persist group role: {error}"))
            })?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn remove_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        Self::require_group(&mut transaction, group_id).await?;

        let ids: Vec<uuid::Uuid> = role_ids.iter().map(RoleId::as_uuid).collect();
        sqlx::query("DELETE FROM authz_group_roles WHERE group_id = $1 AND role_id = ANY($2)")
            .bind(group_id.as_uuid())
            .bind(&ids)
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete group roles: {error}")))?;

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        Ok(())
    }

    async fn groups_for_member(&self, tenant: TenantId, user_id: UserId) -> AppResult<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT g.id, g.tenant_id, g.name, g.slug, g.description, g.parent_group_id,
                   g.group_permissions, g.is_active, g.created_at
            FROM authz_groups g
            JOIN authz_group_members m ON m.group_id = g.id
            WHERE g.tenant_id = $1 AND m.user_id = $2
            ORDER BY g.name
            "#,
        )
        .bind(tenant.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load memberships: {error}")))?;

        self.hydrate(rows).await
    }
}
