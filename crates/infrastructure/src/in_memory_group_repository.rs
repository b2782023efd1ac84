//! In-memory group repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use leadworks_application::GroupRepository;
use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{Group, GroupId, RoleId, UserId};

/// In-memory group store backed by a read-write lock.
///
/// Membership and role-assignment mutations merge into the stored sets under
/// the write lock, so concurrent calls union instead of overwriting each
/// other. `update_details` never touches the stored membership sets.
#[derive(Debug, Default)]
pub struct InMemoryGroupRepository {
    groups: RwLock<HashMap<GroupId, Group>>,
}

impl InMemoryGroupRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
        }
    }

    fn missing(group_id: GroupId) -> AppError {
        AppError::NotFound(format!("group '{group_id}' does not exist"))
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn insert(&self, group: Group) -> AppResult<Group> {
        let mut groups = self.groups.write().await;

        let taken = groups
            .values()
            .any(|existing| existing.tenant() == group.tenant() && existing.slug() == group.slug());
        if taken {
            return Err(AppError::DuplicateSlug(format!(
                "group slug '{}' is already taken in this tenant",
                group.slug()
            )));
        }

        groups.insert(group.id(), group.clone());
        Ok(group)
    }

    async fn find(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        Ok(self.groups.read().await.get(&group_id).cloned())
    }

    async fn list(&self, tenant: TenantId) -> AppResult<Vec<Group>> {
        let groups = self.groups.read().await;

        let mut listed: Vec<Group> = groups
            .values()
            .filter(|group| group.tenant() == tenant)
            .cloned()
            .collect();
        listed.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));

        Ok(listed)
    }

    async fn update_details(&self, group: Group) -> AppResult<()> {
        let mut groups = self.groups.write().await;
        let stored = groups
            .get_mut(&group.id())
            .ok_or_else(|| Self::missing(group.id()))?;

        stored.set_name(group.name().as_str())?;
        stored.set_description(group.description().map(str::to_owned));
        stored.set_parent_group(group.parent_group());
        stored.set_group_permissions(group.group_permissions().clone());
        stored.set_active(group.is_active());

        Ok(())
    }

    async fn delete(&self, group_id: GroupId) -> AppResult<()> {
        if self.groups.write().await.remove(&group_id).is_none() {
            return Err(Self::missing(group_id));
        }

        Ok(())
    }

    async fn add_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()> {
        let mut groups = self.groups.write().await;
        let stored = groups.get_mut(&group_id).ok_or_else(|| Self::missing(group_id))?;
        stored.add_members(user_ids.iter().copied());
        Ok(())
    }

    async fn remove_members(&self, group_id: GroupId, user_ids: &[UserId]) -> AppResult<()> {
        let mut groups = self.groups.write().await;
        let stored = groups.get_mut(&group_id).ok_or_else(|| Self::missing(group_id))?;
        stored.remove_members(user_ids.iter());
        Ok(())
    }

    async fn assign_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut groups = self.groups.write().await;
        let stored = groups.get_mut(&group_id).ok_or_else(|| Self::missing(group_id))?;
        stored.assign_roles(role_ids.iter().copied());
        Ok(())
    }

    async fn remove_roles(&self, group_id: GroupId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut groups = self.groups.write().await;
        let stored = groups.get_mut(&group_id).ok_or_else(|| Self::missing(group_id))?;
        stored.remove_roles(role_ids.iter());
        Ok(())
    }

    async fn groups_for_member(&self, tenant: TenantId, user_id: UserId) -> AppResult<Vec<Group>> {
        let groups = self.groups.read().await;

        let mut listed: Vec<Group> = groups
            .values()
            .filter(|group| group.tenant() == tenant && group.has_member(user_id))
            .cloned()
            .collect();
        listed.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));

        Ok(listed)
    }
}
