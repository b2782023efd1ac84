//! Permission resolution for principals.
//!
//! The resolver answers "may this principal perform this action on this
//! feature" by unioning every applicable permission source: the principal's
//! own custom permissions, its directly assigned roles, and, for each group
//! it belongs to, the group's direct permission table plus the group's
//! assigned roles. The union is a per-feature set merge, so evaluation order
//! never changes the outcome.
//!
//! `has_permission` and `can_access` are total: they always return a
//! boolean. Dangling role or group references contribute nothing, and a
//! failing store read degrades to deny, never to an error or an allow.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{ActionKind, Feature, PermissionTable, RoleId, User};

use crate::group_service::GroupRepository;
use crate::role_service::RoleRepository;
use crate::tenant_guard;

/// Application service answering permission and tenant-scope queries.
///
/// State is read fresh from the stores on every call; no caching. Two
/// concurrent resolutions may observe different results when a mutation is
/// interleaved between them, but each observes only fully written records.
#[derive(Clone)]
pub struct AuthorizationService {
    role_repository: Arc<dyn RoleRepository>,
    group_repository: Arc<dyn GroupRepository>,
}

impl AuthorizationService {
    /// Creates a new authorization service from repository implementations.
    #[must_use]
    pub fn new(
        role_repository: Arc<dyn RoleRepository>,
        group_repository: Arc<dyn GroupRepository>,
    ) -> Self {
        Self {
            role_repository,
            group_repository,
        }
    }

    /// Returns whether the principal may perform `action` on `feature`.
    ///
    /// The feature arrives as a boundary string; an unrecognized value means
    /// "no permission entry exists" and denies. Operators bypass the
    /// permission table entirely; this is the single highest-risk rule in
    /// the engine and is enforced only here and in [`Self::can_access`].
    pub async fn has_permission(&self, principal: &User, feature: &str, action: ActionKind) -> bool {
        if !principal.is_active() {
            return false;
        }

        if principal.is_operator() {
            return true;
        }

        let Ok(feature) = Feature::from_str(feature) else {
            return false;
        };

        let effective = match self.resolve_effective_permissions(principal).await {
            Ok(effective) => effective,
            Err(error) => {
                warn!(
                    principal = %principal.id(),
                    %error,
                    "permission resolution failed; denying"
                );
                return false;
            }
        };

        let allowed = effective.allows(feature, action);
        debug!(
            principal = %principal.id(),
            feature = feature.as_str(),
            action = action.as_str(),
            allowed,
            "resolved permission"
        );

        allowed
    }

    /// Ensures the principal may perform `action` on `feature`.
    pub async fn require_permission(
        &self,
        principal: &User,
        feature: Feature,
        action: ActionKind,
    ) -> AppResult<()> {
        if self
            .has_permission(principal, feature.as_str(), action)
            .await
        {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "principal '{}' is missing '{}' on '{}'",
            principal.id(),
            action.as_str(),
            feature.as_str()
        )))
    }

    /// Returns whether the principal may address a resource owned by
    /// `resource_tenant`. Orthogonal to [`Self::has_permission`]: callers
    /// apply both on every tenant-owned path.
    #[must_use]
    pub fn can_access(&self, principal: &User, resource_tenant: Option<TenantId>) -> bool {
        tenant_guard::can_access(principal, resource_tenant)
    }

    /// Computes the principal's full effective permission table.
    ///
    /// Exposed for display and debugging surfaces; `has_permission` shares
    /// this union path. Operators are not special-cased here; the bypass
    /// belongs to the boolean entry points only.
    pub async fn effective_permissions(&self, principal: &User) -> AppResult<PermissionTable> {
        if !principal.is_active() {
            return Ok(PermissionTable::new());
        }

        self.resolve_effective_permissions(principal).await
    }

    /// Unions custom permissions, direct roles, and group contributions in
    /// a fixed order. Missing role ids and inactive roles or groups are
    /// skipped; the parent-group reference is organizational and never
    /// traversed.
    async fn resolve_effective_permissions(&self, principal: &User) -> AppResult<PermissionTable> {
        let mut effective = principal.custom_permissions().clone();

        let direct_roles: Vec<RoleId> = principal.roles().iter().copied().collect();
        self.merge_role_permissions(&mut effective, &direct_roles)
            .await?;

        let Some(tenant) = principal.tenant() else {
            return Ok(effective);
        };

        let groups = self
            .group_repository
            .groups_for_member(tenant, principal.id())
            .await?;
        for group in groups {
            if !group.is_active() {
                continue;
            }

            effective.merge_from(group.group_permissions());

            let group_roles: Vec<RoleId> = group.roles().iter().copied().collect();
            self.merge_role_permissions(&mut effective, &group_roles)
                .await?;
        }

        Ok(effective)
    }

    async fn merge_role_permissions(
        &self,
        effective: &mut PermissionTable,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        if role_ids.is_empty() {
            return Ok(());
        }

        let roles = self.role_repository.find_many(role_ids).await?;
        if roles.len() < role_ids.len() {
            debug!(
                requested = role_ids.len(),
                resolved = roles.len(),
                "skipping dangling role references"
            );
        }

        for role in roles {
            if role.is_active() {
                effective.merge_from(role.permissions());
            }
        }

        Ok(())
    }
}
