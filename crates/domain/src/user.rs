//! Principal domain types.
//!
//! A user is the principal whose access is evaluated by the resolver. The
//! operator class is the privileged tier: exempt from tenant scoping and
//! from the permission table entirely.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use leadworks_core::{AppError, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::{ActionKind, Feature, PermissionTable};
use crate::role::RoleId;

/// Unique identifier for a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random user identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a user identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Principal classes recognized by the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum UserTypeKind {
    /// Privileged operator tier: exempt from tenant scoping and permission
    /// checks. The bypass is total and enforced in exactly one place, the
    /// authorization entry points.
    Operator,
    /// Tenant administrator.
    Admin,
    /// Regular tenant user.
    Standard,
}

impl UserTypeKind {
    /// Returns a stable storage value for this user type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Admin => "admin",
            Self::Standard => "standard",
        }
    }

    /// Returns whether this class is exempt from tenant scoping.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        matches!(self, Self::Operator)
    }
}

impl FromStr for UserTypeKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "operator" => Ok(Self::Operator),
            "admin" => Ok(Self::Admin),
            "standard" => Ok(Self::Standard),
            _ => Err(AppError::Validation(format!(
                "unknown user type '{value}'"
            ))),
        }
    }
}

/// A principal: direct roles, custom permissions and an activation flag.
///
/// Group memberships are stored on the groups themselves; the resolver asks
/// the group store which groups a principal belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    tenant: Option<TenantId>,
    user_type: UserTypeKind,
    roles: BTreeSet<RoleId>,
    custom_permissions: PermissionTable,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl User {
    /// Creates a tenant-scoped principal.
    #[must_use]
    pub fn new(tenant: TenantId, user_type: UserTypeKind) -> Self {
        Self {
            id: UserId::new(),
            tenant: Some(tenant),
            user_type,
            roles: BTreeSet::new(),
            custom_permissions: PermissionTable::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Creates an operator principal, optionally pinned to a tenant.
    #[must_use]
    pub fn operator(tenant: Option<TenantId>) -> Self {
        Self {
            id: UserId::new(),
            tenant,
            user_type: UserTypeKind::Operator,
            roles: BTreeSet::new(),
            custom_permissions: PermissionTable::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Rebuilds a principal from already-validated stored parts.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_storage(
        id: UserId,
        tenant: Option<TenantId>,
        user_type: UserTypeKind,
        roles: BTreeSet<RoleId>,
        custom_permissions: PermissionTable,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant,
            user_type,
            roles,
            custom_permissions,
            is_active,
            created_at,
        }
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the owning tenant, if any.
    #[must_use]
    pub fn tenant(&self) -> Option<TenantId> {
        self.tenant
    }

    /// Returns the principal class.
    #[must_use]
    pub fn user_type(&self) -> UserTypeKind {
        self.user_type
    }

    /// Returns whether this principal bypasses tenant scoping and checks.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        self.user_type.is_operator()
    }

    /// Returns the directly assigned role ids.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    /// Returns the direct custom permission table.
    #[must_use]
    pub fn custom_permissions(&self) -> &PermissionTable {
        &self.custom_permissions
    }

    /// Returns whether the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Adds role ids; already-present ids are a no-op.
    pub fn assign_roles(&mut self, role_ids: impl IntoIterator<Item = RoleId>) {
        self.roles.extend(role_ids);
    }

    /// Removes role ids; absent ids are a no-op.
    pub fn remove_roles<'a>(&mut self, role_ids: impl IntoIterator<Item = &'a RoleId>) {
        for role_id in role_ids {
            self.roles.remove(role_id);
        }
    }

    /// Unions grants into the principal's custom permission table.
    pub fn grant_custom(&mut self, feature: Feature, actions: impl IntoIterator<Item = ActionKind>) {
        self.custom_permissions.grant(feature, actions);
    }

    /// Sets the activation flag. Inactive principals deny every check.
    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use leadworks_core::TenantId;

    use super::{User, UserTypeKind};
    use crate::role::RoleId;

    #[test]
    fn user_type_roundtrip_storage_value() {
        for value in [UserTypeKind::Operator, UserTypeKind::Admin, UserTypeKind::Standard] {
            let restored = UserTypeKind::from_str(value.as_str());
            assert!(restored.is_ok_and(|parsed| parsed == value));
        }
    }

    #[test]
    fn role_assignment_is_idempotent() {
        let mut user = User::new(TenantId::new(), UserTypeKind::Standard);
        let role_id = RoleId::new();

        user.assign_roles([role_id]);
        user.assign_roles([role_id]);
        assert_eq!(user.roles().len(), 1);

        user.remove_roles([&role_id]);
        user.remove_roles([&role_id]);
        assert!(user.roles().is_empty());
    }

    #[test]
    fn operator_may_have_no_tenant() {
        let operator = User::operator(None);
        assert!(operator.is_operator());
        assert!(operator.tenant().is_none());
    }
}
