//! In-memory user repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use leadworks_application::UserRepository;
use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{PermissionTable, RoleId, User, UserId};

/// In-memory principal store backed by a read-write lock.
///
/// Role assignments and custom permission grants merge into the stored
/// record under the write lock, mirroring the group store's set semantics.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    fn missing(user_id: UserId) -> AppError {
        AppError::NotFound(format!("user '{user_id}' does not exist"))
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: User) -> AppResult<User> {
        self.users.write().await.insert(user.id(), user.clone());
        Ok(user)
    }

    async fn find(&self, user_id: UserId) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn list(&self, tenant: TenantId) -> AppResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|user| user.tenant() == Some(tenant))
            .cloned()
            .collect())
    }

    async fn assign_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut users = self.users.write().await;
        let stored = users.get_mut(&user_id).ok_or_else(|| Self::missing(user_id))?;
        stored.assign_roles(role_ids.iter().copied());
        Ok(())
    }

    async fn remove_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()> {
        let mut users = self.users.write().await;
        let stored = users.get_mut(&user_id).ok_or_else(|| Self::missing(user_id))?;
        stored.remove_roles(role_ids.iter());
        Ok(())
    }

    async fn grant_custom_permissions(
        &self,
        user_id: UserId,
        permissions: PermissionTable,
    ) -> AppResult<()> {
        let mut users = self.users.write().await;
        let stored = users.get_mut(&user_id).ok_or_else(|| Self::missing(user_id))?;
        for (feature, actions) in permissions.entries() {
            stored.grant_custom(feature, actions.iter().copied());
        }
        Ok(())
    }

    async fn set_active(&self, user_id: UserId, is_active: bool) -> AppResult<()> {
        let mut users = self.users.write().await;
        let stored = users.get_mut(&user_id).ok_or_else(|| Self::missing(user_id))?;
        stored.set_active(is_active);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use leadworks_application::UserRepository;
    use leadworks_core::TenantId;
    use leadworks_domain::{ActionKind, Feature, PermissionTable, RoleId, User, UserTypeKind};

    use super::InMemoryUserRepository;

    #[tokio::test]
    async fn role_assignment_merges_idempotently() {
        let repository = InMemoryUserRepository::new();
        let user = User::new(TenantId::new(), UserTypeKind::Standard);
        let user_id = user.id();
        assert!(repository.insert(user).await.is_ok());

        let shared = RoleId::new();
        assert!(repository.assign_roles(user_id, &[shared, RoleId::new()]).await.is_ok());
        assert!(repository.assign_roles(user_id, &[shared]).await.is_ok());

        let found = repository.find(user_id).await;
        assert!(found.is_ok_and(|user| user.is_some_and(|user| user.roles().len() == 2)));
    }

    #[tokio::test]
    async fn custom_grants_accumulate() {
        let repository = InMemoryUserRepository::new();
        let user = User::new(TenantId::new(), UserTypeKind::Standard);
        let user_id = user.id();
        assert!(repository.insert(user).await.is_ok());

        let mut first = PermissionTable::new();
        first.grant(Feature::LeadManagement, [ActionKind::Read]);
        let mut second = PermissionTable::new();
        second.grant(Feature::LeadManagement, [ActionKind::Update]);

        assert!(repository.grant_custom_permissions(user_id, first).await.is_ok());
        assert!(repository.grant_custom_permissions(user_id, second).await.is_ok());

        let found = repository.find(user_id).await;
        assert!(found.is_ok_and(|user| {
            user.is_some_and(|user| {
                user.custom_permissions().allows(Feature::LeadManagement, ActionKind::Read)
                    && user
                        .custom_permissions()
                        .allows(Feature::LeadManagement, ActionKind::Update)
            })
        }));
    }

    #[tokio::test]
    async fn missing_user_mutation_is_not_found() {
        let repository = InMemoryUserRepository::new();
        let result = repository.set_active(leadworks_domain::UserId::new(), false).await;
        assert!(result.is_err());
    }
}
