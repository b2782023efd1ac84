//! Audit trail port shared by the administrative services.

use async_trait::async_trait;

use leadworks_core::{AppResult, TenantId};
use leadworks_domain::UserId;

/// Stable audit actions emitted by application use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// Emitted when a custom role is created.
    RoleCreated,
    /// Emitted when a role is updated.
    RoleUpdated,
    /// Emitted when a role is deleted.
    RoleDeleted,
    /// Emitted when the default role set is seeded for a tenant.
    RolesSeeded,
    /// Emitted when a group is created.
    GroupCreated,
    /// Emitted when a group is updated.
    GroupUpdated,
    /// Emitted when a group is deleted.
    GroupDeleted,
    /// Emitted when group membership changes.
    GroupMembersChanged,
    /// Emitted when group role assignments change.
    GroupRolesChanged,
    /// Emitted when a user is created.
    UserCreated,
    /// Emitted when a user's roles or grants change.
    UserGrantsChanged,
    /// Emitted when a user is activated or deactivated.
    UserActivationChanged,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "role.created",
            Self::RoleUpdated => "role.updated",
            Self::RoleDeleted => "role.deleted",
            Self::RolesSeeded => "role.defaults_seeded",
            Self::GroupCreated => "group.created",
            Self::GroupUpdated => "group.updated",
            Self::GroupDeleted => "group.deleted",
            Self::GroupMembersChanged => "group.members_changed",
            Self::GroupRolesChanged => "group.roles_changed",
            Self::UserCreated => "user.created",
            Self::UserGrantsChanged => "user.grants_changed",
            Self::UserActivationChanged => "user.activation_changed",
        }
    }
}

/// One audit trail entry produced by an administrative mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Tenant the mutated resource belongs to; `None` for system resources.
    pub tenant: Option<TenantId>,
    /// Acting principal.
    pub actor: UserId,
    /// Stable action identifier.
    pub action: AuditAction,
    /// Mutated resource type (`"role"`, `"group"`, `"user"`).
    pub resource_type: &'static str,
    /// Mutated resource identifier.
    pub resource_id: String,
    /// Optional human-readable detail.
    pub detail: Option<String>,
}

/// Repository port for appending audit trail entries.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one event to the audit trail.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}
