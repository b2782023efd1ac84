//! Group domain types.
//!
//! A group collects member users, assigned roles and an optional direct
//! permission table. `parent_group` records organizational nesting only and
//! is never traversed during permission resolution.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use leadworks_core::{AppResult, NonEmptyString, Slug, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::{ActionKind, Feature, PermissionTable};
use crate::role::RoleId;
use crate::user::UserId;

/// Unique identifier for a group record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Creates a new random group identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a group identifier from an existing UUID value.
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

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A tenant-scoped collection of members, assigned roles and direct grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    id: GroupId,
    name: NonEmptyString,
    slug: Slug,
    description: Option<String>,
    tenant: TenantId,
    parent_group: Option<GroupId>,
    members: BTreeSet<UserId>,
    roles: BTreeSet<RoleId>,
    group_permissions: PermissionTable,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Group {
    /// Creates a validated empty group.
    pub fn new(
        tenant: TenantId,
        name: impl Into<String>,
        slug: impl Into<String>,
        description: Option<String>,
        parent_group: Option<GroupId>,
    ) -> AppResult<Self> {
        Ok(Self {
            id: GroupId::new(),
            name: NonEmptyString::new(name)?,
            slug: Slug::new(slug)?,
            description,
            tenant,
            parent_group,
            members: BTreeSet::new(),
            roles: BTreeSet::new(),
            group_permissions: PermissionTable::new(),
            is_active: true,
            created_at: Utc::now(),
        })
    }

    /// Rebuilds a group from already-validated stored parts.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_storage(
        id: GroupId,
        name: NonEmptyString,
        slug: Slug,
        description: Option<String>,
        tenant: TenantId,
        parent_group: Option<GroupId>,
        members: BTreeSet<UserId>,
        roles: BTreeSet<RoleId>,
        group_permissions: PermissionTable,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            slug,
            description,
            tenant,
            parent_group,
            members,
            roles,
            group_permissions,
            is_active,
            created_at,
        }
    }

    /// Returns the group identifier.
    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the slug, unique within the owning tenant.
    #[must_use]
    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Returns the organizational parent, if any. Display only: the parent
    /// contributes nothing to the permissions of this group's members.
    #[must_use]
    pub fn parent_group(&self) -> Option<GroupId> {
        self.parent_group
    }

    /// Returns the member user ids.
    #[must_use]
    pub fn members(&self) -> &BTreeSet<UserId> {
        &self.members
    }

    /// Returns the assigned role ids.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    /// Returns the group's direct permission table.
    #[must_use]
    pub fn group_permissions(&self) -> &PermissionTable {
        &self.group_permissions
    }

    /// Returns whether the group contributes grants during resolution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns whether the given user is a member.
    #[must_use]
    pub fn has_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    /// Adds members; already-present ids are a no-op.
    pub fn add_members(&mut self, user_ids: impl IntoIterator<Item = UserId>) {
        self.members.extend(user_ids);
    }

    /// Removes members; absent ids are a no-op.
    pub fn remove_members<'a>(&mut self, user_ids: impl IntoIterator<Item = &'a UserId>) {
        for user_id in user_ids {
            self.members.remove(user_id);
        }
    }

    /// Assigns roles; already-assigned ids are a no-op.
    pub fn assign_roles(&mut self, role_ids: impl IntoIterator<Item = RoleId>) {
        self.roles.extend(role_ids);
    }

    /// Removes roles; unassigned ids are a no-op.
    pub fn remove_roles<'a>(&mut self, role_ids: impl IntoIterator<Item = &'a RoleId>) {
        for role_id in role_ids {
            self.roles.remove(role_id);
        }
    }

    /// Unions grants into the group's direct permission table.
    pub fn grant(&mut self, feature: Feature, actions: impl IntoIterator<Item = ActionKind>) {
        self.group_permissions.grant(feature, actions);
    }

    /// Replaces the group's direct permission table.
    pub fn set_group_permissions(&mut self, group_permissions: PermissionTable) {
        self.group_permissions = group_permissions;
    }

    /// Renames the group.
    pub fn set_name(&mut self, name: impl Into<String>) -> AppResult<()> {
        self.name = NonEmptyString::new(name)?;
        Ok(())
    }

    /// Replaces the description.
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Re-parents the group. Organizational only.
    pub fn set_parent_group(&mut self, parent_group: Option<GroupId>) {
        self.parent_group = parent_group;
    }

    /// Sets the activation flag.
    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }
}

#[cfg(test)]
mod tests {
    use leadworks_core::TenantId;

    use super::Group;
    use crate::role::RoleId;
    use crate::user::UserId;

    fn group() -> Group {
        match Group::new(TenantId::new(), "Sales", "sales", None, None) {
            Ok(group) => group,
            Err(error) => panic!("group construction failed: {error}"),
        }
    }

    #[test]
    fn member_addition_is_idempotent_union() {
        let mut group = group();
        let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());

        group.add_members([u1, u2]);
        group.add_members([u2, u3]);

        assert_eq!(group.members().len(), 3);
        assert!(group.has_member(u1) && group.has_member(u2) && group.has_member(u3));
    }

    #[test]
    fn removing_absent_member_is_a_no_op() {
        let mut group = group();
        let member = UserId::new();
        group.add_members([member]);

        group.remove_members([&UserId::new()]);
        assert_eq!(group.members().len(), 1);
    }

    #[test]
    fn removing_unassigned_role_is_a_no_op() {
        let mut group = group();
        let assigned = RoleId::new();
        group.assign_roles([assigned]);

        group.remove_roles([&RoleId::new()]);
        assert_eq!(group.roles().len(), 1);
        assert!(group.roles().contains(&assigned));
    }
}
