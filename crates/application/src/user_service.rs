//! User store ports and application service.
//!
//! Owns principal lifecycle: creation under the tenant-forcing rule,
//! activation toggles, direct role assignment and custom permission grants.
//! Deactivated principals deny every resolver query until reactivated.

use std::sync::Arc;

use async_trait::async_trait;

use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{PermissionTable, RoleId, User, UserId, UserTypeKind};

use crate::audit::{AuditAction, AuditEvent, AuditRepository};
use crate::tenant_guard;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Repository port for principal persistence.
///
/// Role assignment and permission grants are atomic merges against current
/// state, mirroring the group store's set semantics.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a new user record.
    async fn insert(&self, user: User) -> AppResult<User>;

    /// Finds a user by id.
    async fn find(&self, user_id: UserId) -> AppResult<Option<User>>;

    /// Lists the tenant's users.
    async fn list(&self, tenant: TenantId) -> AppResult<Vec<User>>;

    /// Set-union merge of direct role assignments.
    async fn assign_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()>;

    /// Set-difference removal of direct role assignments.
    async fn remove_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()>;

    /// Unions the given grants into the user's custom permission table.
    async fn grant_custom_permissions(
        &self,
        user_id: UserId,
        permissions: PermissionTable,
    ) -> AppResult<()>;

    /// Sets the activation flag. Fails with [`AppError::NotFound`] when
    /// absent.
    async fn set_active(&self, user_id: UserId, is_active: bool) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input payload for creating principals.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    /// Principal class of the new user.
    pub user_type: UserTypeKind,
    /// Explicit target tenant; required for operator actors creating
    /// tenant-scoped users, ignored for tenant-scoped actors.
    pub tenant: Option<TenantId>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Application service for principal administration.
#[derive(Clone)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl UserService {
    /// Creates a new user service from repository implementations.
    #[must_use]
    pub fn new(
        repository: Arc<dyn UserRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            repository,
            audit_repository,
        }
    }

    /// Creates a principal under the tenant-forcing rule.
    ///
    /// Tenant-scoped actors always create into their own tenant; a supplied
    /// tenant value is ignored. Operator actors must name the target tenant
    /// explicitly. Operator principals can only be created by operators and
    /// may be tenant-less.
    pub async fn create_user(&self, actor: &User, input: CreateUserInput) -> AppResult<User> {
        let user = if input.user_type.is_operator() {
            if !actor.is_operator() {
                return Err(AppError::Forbidden(
                    "only operators may create operator principals".to_owned(),
                ));
            }
            User::operator(input.tenant)
        } else {
            let tenant = tenant_guard::resolve_target_tenant(actor, input.tenant)?;
            User::new(tenant, input.user_type)
        };

        let created = self.repository.insert(user).await?;
        self.append_user_event(actor, &created, AuditAction::UserCreated, None)
            .await?;

        Ok(created)
    }

    /// Returns a user visible to the actor. Cross-tenant ids resolve to
    /// [`AppError::NotFound`].
    pub async fn get_user(&self, actor: &User, user_id: UserId) -> AppResult<User> {
        self.find_visible(actor, user_id).await
    }

    /// Lists the target tenant's users.
    pub async fn list_users(&self, actor: &User, tenant: Option<TenantId>) -> AppResult<Vec<User>> {
        let tenant = tenant_guard::resolve_target_tenant(actor, tenant)?;
        self.repository.list(tenant).await
    }

    /// Assigns direct roles; already-present ids are a no-op.
    pub async fn assign_roles(
        &self,
        actor: &User,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        let user = self.find_visible(actor, user_id).await?;

        self.repository.assign_roles(user_id, role_ids).await?;
        self.append_user_event(
            actor,
            &user,
            AuditAction::UserGrantsChanged,
            Some(format!("assigned {} role(s)", role_ids.len())),
        )
        .await
    }

    /// Removes direct roles; absent ids are a no-op.
    pub async fn remove_roles(
        &self,
        actor: &User,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        let user = self.find_visible(actor, user_id).await?;

        self.repository.remove_roles(user_id, role_ids).await?;
        self.append_user_event(
            actor,
            &user,
            AuditAction::UserGrantsChanged,
            Some(format!("removed {} role(s)", role_ids.len())),
        )
        .await
    }

    /// Unions grants into the user's custom permission table.
    pub async fn grant_custom_permissions(
        &self,
        actor: &User,
        user_id: UserId,
        permissions: PermissionTable,
    ) -> AppResult<()> {
        let user = self.find_visible(actor, user_id).await?;

        self.repository
            .grant_custom_permissions(user_id, permissions)
            .await?;
        self.append_user_event(
            actor,
            &user,
            AuditAction::UserGrantsChanged,
            Some("custom permissions granted".to_owned()),
        )
        .await
    }

    /// Deactivates a principal; every subsequent resolver query denies.
    pub async fn deactivate_user(&self, actor: &User, user_id: UserId) -> AppResult<()> {
        self.set_active(actor, user_id, false).await
    }

    /// Reactivates a principal.
    pub async fn reactivate_user(&self, actor: &User, user_id: UserId) -> AppResult<()> {
        self.set_active(actor, user_id, true).await
    }

    async fn set_active(&self, actor: &User, user_id: UserId, is_active: bool) -> AppResult<()> {
        let user = self.find_visible(actor, user_id).await?;

        self.repository.set_active(user_id, is_active).await?;
        self.append_user_event(
            actor,
            &user,
            AuditAction::UserActivationChanged,
            Some(format!("is_active set to {is_active}")),
        )
        .await
    }

    async fn find_visible(&self, actor: &User, user_id: UserId) -> AppResult<User> {
        let user = self
            .repository
            .find(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{user_id}' does not exist")))?;

        if !tenant_guard::can_access(actor, user.tenant()) {
            return Err(AppError::NotFound(format!(
                "user '{user_id}' does not exist"
            )));
        }

        Ok(user)
    }

    async fn append_user_event(
        &self,
        actor: &User,
        user: &User,
        action: AuditAction,
        detail: Option<String>,
    ) -> AppResult<()> {
        self.audit_repository
            .append_event(AuditEvent {
                tenant: user.tenant(),
                actor: actor.id(),
                action,
                resource_type: "user",
                resource_id: user.id().to_string(),
                detail,
            })
            .await
    }
}
