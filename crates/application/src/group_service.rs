//! Group store ports and application service.
//!
//! Owns group lifecycle plus membership and role-assignment mutation. All
//! membership operations carry set semantics: adding a present member or
//! removing an absent one is a no-op, never an error, and concurrent
//! mutations merge instead of overwriting each other.

use std::sync::Arc;

use async_trait::async_trait;

use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{ActionKind, Feature, Group, GroupId, RoleId, User, UserId};

use crate::audit::{AuditAction, AuditEvent, AuditRepository};
use crate::tenant_guard;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Repository port for group persistence.
///
/// Membership and role-assignment mutations are atomic set-merges against
/// current state: two concurrent `add_members` calls with overlapping sets
/// land as the union of both, never as one overwriting the other.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Inserts a new group.
    ///
    /// Fails with [`AppError::DuplicateSlug`] when `(tenant, slug)` is
    /// already taken; the check and the insert are one atomic step.
    async fn insert(&self, group: Group) -> AppResult<Group>;

    /// Finds a group by id.
    async fn find(&self, group_id: GroupId) -> AppResult<Option<Group>>;

    /// Lists the tenant's groups.
    async fn list(&self, tenant: TenantId) -> AppResult<Vec<Group>>;

    /// Persists the group's detail fields (name, description, parent,
    /// activation flag, direct permission table). Stored membership and
    /// role-assignment sets are preserved: they are owned by the dedicated
    /// merge operations below. Fails with [`AppError::NotFound`] when
    /// absent.
    async fn update_details(&self, group: Group) -> AppResult<()>;

    /// Hard-deletes a group. Member users and referenced roles are left
    /// untouched. Fails with [`AppError::NotFound`] when absent.
    async fn delete(&self, group_id: GroupId) -> AppResult<()>;

    /// Set-union merge of members into the group.
    async fn add_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()>;

    /// Set-difference removal of members from the group.
    async fn remove_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()>;

    /// Set-union merge of role assignments into the group.
    async fn assign_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()>;

    /// Set-difference removal of role assignments from the group.
    async fn remove_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()>;

    /// Lists the tenant's groups that contain the given user as a member.
    async fn groups_for_member(&self, tenant: TenantId, user_id: UserId) -> AppResult<Vec<Group>>;
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input payload for creating groups.
#[derive(Debug, Clone)]
pub struct CreateGroupInput {
    /// Display name.
    pub name: String,
    /// Slug, unique within the target tenant.
    pub slug: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional organizational parent; must exist in the same tenant.
    pub parent_group: Option<GroupId>,
    /// Explicit target tenant; required for operator actors, ignored for
    /// tenant-scoped actors.
    pub tenant: Option<TenantId>,
}

/// Partial update for a group's detail fields. `None` fields are left
/// unchanged; membership and role assignments have dedicated operations.
#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New activation flag.
    pub is_active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Application service for group administration.
#[derive(Clone)]
pub struct GroupService {
    repository: Arc<dyn GroupRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl GroupService {
    /// Creates a new group service from repository implementations.
    #[must_use]
    pub fn new(
        repository: Arc<dyn GroupRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            repository,
            audit_repository,
        }
    }

    /// Creates a group in the actor's tenant scope.
    pub async fn create_group(&self, actor: &User, input: CreateGroupInput) -> AppResult<Group> {
        let tenant = tenant_guard::resolve_target_tenant(actor, input.tenant)?;

        if let Some(parent_id) = input.parent_group {
            self.require_parent_in_tenant(tenant, parent_id).await?;
        }

        let group = Group::new(
            tenant,
            input.name,
            input.slug,
            input.description,
            input.parent_group,
        )?;

        let created = self.repository.insert(group).await?;
        self.append_group_event(actor, &created, AuditAction::GroupCreated, None)
            .await?;

        Ok(created)
    }

    /// Returns a group visible to the actor. Cross-tenant ids resolve to
    /// [`AppError::NotFound`].
    pub async fn get_group(&self, actor: &User, group_id: GroupId) -> AppResult<Group> {
        self.find_visible(actor, group_id).await
    }

    /// Lists the target tenant's groups.
    pub async fn list_groups(
        &self,
        actor: &User,
        tenant: Option<TenantId>,
    ) -> AppResult<Vec<Group>> {
        let tenant = tenant_guard::resolve_target_tenant(actor, tenant)?;
        let mut groups = self.repository.list(tenant).await?;
        groups.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));
        Ok(groups)
    }

    /// Applies a partial update to a group's detail fields.
    pub async fn update_group(
        &self,
        actor: &User,
        group_id: GroupId,
        patch: GroupPatch,
    ) -> AppResult<Group> {
        let mut group = self.find_visible(actor, group_id).await?;

        if let Some(name) = patch.name {
            group.set_name(name)?;
        }
        if let Some(description) = patch.description {
            group.set_description(Some(description));
        }
        if let Some(is_active) = patch.is_active {
            group.set_active(is_active);
        }

        self.repository.update_details(group.clone()).await?;
        self.append_group_event(actor, &group, AuditAction::GroupUpdated, None)
            .await?;

        Ok(group)
    }

    /// Re-parents a group. The new parent must exist in the same tenant;
    /// the reference is organizational only and never affects resolution.
    pub async fn set_parent_group(
        &self,
        actor: &User,
        group_id: GroupId,
        parent_group: Option<GroupId>,
    ) -> AppResult<Group> {
        let mut group = self.find_visible(actor, group_id).await?;

        if let Some(parent_id) = parent_group {
            if parent_id == group_id {
                return Err(AppError::Validation(
                    "a group cannot be its own parent".to_owned(),
                ));
            }
            self.require_parent_in_tenant(group.tenant(), parent_id).await?;
        }

        group.set_parent_group(parent_group);
        self.repository.update_details(group.clone()).await?;
        self.append_group_event(actor, &group, AuditAction::GroupUpdated, None)
            .await?;

        Ok(group)
    }

    /// Unions grants into the group's direct permission table.
    pub async fn grant_permissions(
        &self,
        actor: &User,
        group_id: GroupId,
        feature: Feature,
        actions: impl IntoIterator<Item = ActionKind> + Send,
    ) -> AppResult<Group> {
        let mut group = self.find_visible(actor, group_id).await?;
        group.grant(feature, actions);

        self.repository.update_details(group.clone()).await?;
        self.append_group_event(actor, &group, AuditAction::GroupUpdated, None)
            .await?;

        Ok(group)
    }

    /// Hard-deletes a group.
    ///
    /// Members and referenced roles survive; they simply lose this group's
    /// contribution to their effective permissions on the next resolution.
    pub async fn delete_group(&self, actor: &User, group_id: GroupId) -> AppResult<()> {
        let group = self.find_visible(actor, group_id).await?;

        self.repository.delete(group_id).await?;
        self.append_group_event(actor, &group, AuditAction::GroupDeleted, None)
            .await?;

        Ok(())
    }

    /// Adds members to a group; already-present ids are a no-op.
    pub async fn add_members(
        &self,
        actor: &User,
        group_id: GroupId,
        user_ids: &[UserId],
    ) -> AppResult<()> {
        let group = self.find_visible(actor, group_id).await?;

        self.repository.add_members(group_id, user_ids).await?;
        self.append_group_event(
            actor,
            &group,
            AuditAction::GroupMembersChanged,
            Some(format!("added {} member(s)", user_ids.len())),
        )
        .await
    }

    /// Removes members from a group; absent ids are a no-op.
    pub async fn remove_members(
        &self,
        actor: &User,
        group_id: GroupId,
        user_ids: &[UserId],
    ) -> AppResult<()> {
        let group = self.find_visible(actor, group_id).await?;

        self.repository.remove_members(group_id, user_ids).await?;
        self.append_group_event(
            actor,
            &group,
            AuditAction::GroupMembersChanged,
            Some(format!("removed {} member(s)", user_ids.len())),
        )
        .await
    }

    /// Assigns roles to a group; already-assigned ids are a no-op.
    pub async fn assign_roles(
        &self,
        actor: &User,
        group_id: GroupId,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        let group = self.find_visible(actor, group_id).await?;

        self.repository.assign_roles(group_id, role_ids).await?;
        self.append_group_event(
            actor,
            &group,
            AuditAction::GroupRolesChanged,
            Some(format!("assigned {} role(s)", role_ids.len())),
        )
        .await
    }

    /// Removes roles from a group; unassigned ids are a no-op.
    pub async fn remove_roles(
        &self,
        actor: &User,
        group_id: GroupId,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        let group = self.find_visible(actor, group_id).await?;

        self.repository.remove_roles(group_id, role_ids).await?;
        self.append_group_event(
            actor,
            &group,
            AuditAction::GroupRolesChanged,
            Some(format!("removed {} role(s)", role_ids.len())),
        )
        .await
    }

    async fn find_visible(&self, actor: &User, group_id: GroupId) -> AppResult<Group> {
        let group = self
            .repository
            .find(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group '{group_id}' does not exist")))?;

        if !tenant_guard::can_access(actor, Some(group.tenant())) {
            return Err(AppError::NotFound(format!(
                "group '{group_id}' does not exist"
            )));
        }

        Ok(group)
    }

    async fn require_parent_in_tenant(
        &self,
        tenant: TenantId,
        parent_id: GroupId,
    ) -> AppResult<()> {
        let parent = self.repository.find(parent_id).await?;
        match parent {
            Some(parent) if parent.tenant() == tenant => Ok(()),
            _ => Err(AppError::NotFound(format!(
                "parent group '{parent_id}' does not exist in this tenant"
            ))),
        }
    }

    async fn append_group_event(
        &self,
        actor: &User,
        group: &Group,
        action: AuditAction,
        detail: Option<String>,
    ) -> AppResult<()> {
        self.audit_repository
            .append_event(AuditEvent {
                tenant: Some(group.tenant()),
                actor: actor.id(),
                action,
                resource_type: "group",
                resource_id: group.id().to_string(),
                detail,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use leadworks_core::{AppError, AppResult, TenantId};
    use leadworks_domain::{Group, GroupId, RoleId, User, UserId, UserTypeKind};

    use crate::audit::{AuditEvent, AuditRepository};

    use super::{CreateGroupInput, GroupRepository, GroupService};

    #[derive(Default)]
    struct FakeAuditRepository {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditRepository for FakeAuditRepository {
        async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeGroupRepository {
        groups: Mutex<HashMap<GroupId, Group>>,
    }

    #[async_trait]
    impl GroupRepository for FakeGroupRepository {
        async fn insert(&self, group: Group) -> AppResult<Group> {
            let mut groups = self.groups.lock().await;
            let taken = groups.values().any(|existing| {
                existing.tenant() == group.tenant() && existing.slug() == group.slug()
            });
            if taken {
                return Err(AppError::DuplicateSlug(format!(
                    "group slug '{}' is already taken",
                    group.slug()
                )));
            }

            groups.insert(group.id(), group.clone());
            Ok(group)
        }

        async fn find(&self, group_id: GroupId) -> AppResult<Option<Group>> {
            Ok(self.groups.lock().await.get(&group_id).cloned())
        }

        async fn list(&self, tenant: TenantId) -> AppResult<Vec<Group>> {
            Ok(self
                .groups
                .lock()
                .await
                .values()
                .filter(|group| group.tenant() == tenant)
                .cloned()
                .collect())
        }

        async fn update_details(&self, group: Group) -> AppResult<()> {
            let mut groups = self.groups.lock().await;
            let Some(stored) = groups.get(&group.id()) else {
                return Err(AppError::NotFound(format!(
                    "group '{}' does not exist",
                    group.id()
                )));
            };

            let mut merged = group;
            let members: Vec<_> = stored.members().iter().copied().collect();
            let roles: Vec<_> = stored.roles().iter().copied().collect();
            merged.add_members(members);
            merged.assign_roles(roles);
            groups.insert(merged.id(), merged);
            Ok(())
        }

        async fn delete(&self, group_id: GroupId) -> AppResult<()> {
            if self.groups.lock().await.remove(&group_id).is_none() {
                return Err(AppError::NotFound(format!(
                    "group '{group_id}' does not exist"
                )));
            }
            Ok(())
        }

        async fn add_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()> {
            let mut groups = self.groups.lock().await;
            if let Some(group) = groups.get_mut(&group_id) {
                group.add_members(user_ids.iter().copied());
            }
            Ok(())
        }

        async fn remove_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()> {
            let mut groups = self.groups.lock().await;
            if let Some(group) = groups.get_mut(&group_id) {
                group.remove_members(user_ids.iter());
            }
            Ok(())
        }

        async fn assign_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()> {
            let mut groups = self.groups.lock().await;
            if let Some(group) = groups.get_mut(&group_id) {
                group.assign_roles(role_ids.iter().copied());
            }
            Ok(())
        }

        async fn remove_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()> {
            let mut groups = self.groups.lock().await;
            if let Some(group) = groups.get_mut(&group_id) {
                group.remove_roles(role_ids.iter());
            }
            Ok(())
        }

        async fn groups_for_member(
            &self,
            tenant: TenantId,
            user_id: UserId,
        ) -> AppResult<Vec<Group>> {
            Ok(self
                .groups
                .lock()
                .await
                .values()
                .filter(|group| group.tenant() == tenant && group.has_member(user_id))
                .cloned()
                .collect())
        }
    }

    fn service() -> GroupService {
        GroupService::new(
            Arc::new(FakeGroupRepository::default()),
            Arc::new(FakeAuditRepository::default()),
        )
    }

    fn sales_input() -> CreateGroupInput {
        CreateGroupInput {
            name: "Sales".to_owned(),
            slug: "sales".to_owned(),
            description: None,
            parent_group: None,
            tenant: None,
        }
    }

    async fn create(service: &GroupService, actor: &User, input: CreateGroupInput) -> Group {
        match service.create_group(actor, input).await {
            Ok(group) => group,
            Err(error) => panic!("group creation failed: {error}"),
        }
    }

    #[tokio::test]
    async fn duplicate_slug_in_same_tenant_is_rejected() {
        let service = service();
        let actor = User::new(TenantId::new(), UserTypeKind::Admin);

        create(&service, &actor, sales_input()).await;
        let second = service.create_group(&actor, sales_input()).await;
        assert!(matches!(second, Err(AppError::DuplicateSlug(_))));
    }

    #[tokio::test]
    async fn member_addition_is_idempotent_union() {
        let service = service();
        let actor = User::new(TenantId::new(), UserTypeKind::Admin);
        let group = create(&service, &actor, sales_input()).await;

        let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());
        assert!(service.add_members(&actor, group.id(), &[u1, u2]).await.is_ok());
        assert!(service.add_members(&actor, group.id(), &[u2, u3]).await.is_ok());

        let reloaded = service.get_group(&actor, group.id()).await;
        assert!(reloaded.is_ok_and(|group| group.members().len() == 3));
    }

    #[tokio::test]
    async fn removing_unassigned_role_is_a_no_op() {
        let service = service();
        let actor = User::new(TenantId::new(), UserTypeKind::Admin);
        let group = create(&service, &actor, sales_input()).await;

        let assigned = RoleId::new();
        assert!(service.assign_roles(&actor, group.id(), &[assigned]).await.is_ok());
        assert!(service.remove_roles(&actor, group.id(), &[RoleId::new()]).await.is_ok());

        let reloaded = service.get_group(&actor, group.id()).await;
        assert!(reloaded.is_ok_and(|group| group.roles().contains(&assigned)));
    }

    #[tokio::test]
    async fn parent_group_must_exist_in_same_tenant() {
        let service = service();
        let actor_one = User::new(TenantId::new(), UserTypeKind::Admin);
        let actor_two = User::new(TenantId::new(), UserTypeKind::Admin);

        let foreign = create(&service, &actor_two, sales_input()).await;

        let input = CreateGroupInput {
            parent_group: Some(foreign.id()),
            ..sales_input()
        };
        let result = service.create_group(&actor_one, input).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn group_cannot_be_its_own_parent() {
        let service = service();
        let actor = User::new(TenantId::new(), UserTypeKind::Admin);
        let group = create(&service, &actor, sales_input()).await;

        let result = service
            .set_parent_group(&actor, group.id(), Some(group.id()))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn cross_tenant_group_resolves_to_not_found() {
        let service = service();
        let owner = User::new(TenantId::new(), UserTypeKind::Admin);
        let outsider = User::new(TenantId::new(), UserTypeKind::Admin);

        let group = create(&service, &owner, sales_input()).await;
        let result = service.get_group(&outsider, group.id()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn detail_update_preserves_membership() {
        let service = service();
        let actor = User::new(TenantId::new(), UserTypeKind::Admin);
        let group = create(&service, &actor, sales_input()).await;

        let member = UserId::new();
        assert!(service.add_members(&actor, group.id(), &[member]).await.is_ok());

        let patch = super::GroupPatch {
            description: Some("Primary sales team".to_owned()),
            ..super::GroupPatch::default()
        };
        assert!(service.update_group(&actor, group.id(), patch).await.is_ok());

        let reloaded = service.get_group(&actor, group.id()).await;
        assert!(reloaded.is_ok_and(|group| group.has_member(member)));
    }
}
