//! In-memory role repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use leadworks_application::RoleRepository;
use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{Role, RoleId};

/// In-memory role store backed by a read-write lock.
///
/// Every mutation holds the write lock for its full read-modify-write, which
/// gives single-entity atomicity and makes `upsert_by_name` a true
/// conditional write rather than a racy existence check followed by an
/// insert.
#[derive(Debug, Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<HashMap<RoleId, Role>>,
}

impl InMemoryRoleRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn insert(&self, role: Role) -> AppResult<Role> {
        let mut roles = self.roles.write().await;

        let taken = roles
            .values()
            .any(|existing| existing.tenant() == role.tenant() && existing.slug() == role.slug());
        if taken {
            return Err(AppError::DuplicateSlug(format!(
                "role slug '{}' is already taken in this tenant",
                role.slug()
            )));
        }

        roles.insert(role.id(), role.clone());
        Ok(role)
    }

    async fn find(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.roles.read().await.get(&role_id).cloned())
    }

    async fn find_many(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>> {
        let roles = self.roles.read().await;
        Ok(role_ids
            .iter()
            .filter_map(|role_id| roles.get(role_id).cloned())
            .collect())
    }

    async fn list(&self, tenant: TenantId) -> AppResult<Vec<Role>> {
        let roles = self.roles.read().await;

        let mut listed: Vec<Role> = roles
            .values()
            .filter(|role| role.is_system() || role.tenant() == Some(tenant))
            .cloned()
            .collect();
        listed.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));

        Ok(listed)
    }

    async fn update(&self, role: Role) -> AppResult<()> {
        let mut roles = self.roles.write().await;

        if !roles.contains_key(&role.id()) {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                role.id()
            )));
        }

        roles.insert(role.id(), role);
        Ok(())
    }

    async fn delete(&self, role_id: RoleId) -> AppResult<()> {
        if self.roles.write().await.remove(&role_id).is_none() {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' does not exist"
            )));
        }

        Ok(())
    }

    async fn upsert_by_name(&self, role: Role) -> AppResult<Role> {
        let mut roles = self.roles.write().await;

        let existing = roles
            .values()
            .find(|existing| {
                existing.tenant() == role.tenant()
                    && existing.name().as_str() == role.name().as_str()
            })
            .map(Role::id);

        let stored = match existing.and_then(|role_id| roles.get(&role_id).cloned()) {
            Some(mut stored) => {
                stored.set_permissions(role.permissions().clone());
                stored.set_for_user_types(role.for_user_types().clone());
                stored.set_level(role.level());
                stored.set_description(role.description().map(str::to_owned));
                stored
            }
            None => role,
        };

        roles.insert(stored.id(), stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use leadworks_application::RoleRepository;
    use leadworks_core::{AppError, TenantId};
    use leadworks_domain::{ActionKind, Feature, PermissionTable, Role};

    use super::InMemoryRoleRepository;

    fn viewer(tenant: TenantId) -> Role {
        let mut permissions = PermissionTable::new();
        permissions.grant(Feature::LeadManagement, [ActionKind::Read]);

        match Role::custom(tenant, "Viewer", "viewer", None, permissions, BTreeSet::new(), 1) {
            Ok(role) => role,
            Err(error) => panic!("role construction failed: {error}"),
        }
    }

    #[tokio::test]
    async fn duplicate_slug_is_atomic_conflict() {
        let repository = InMemoryRoleRepository::new();
        let tenant = TenantId::new();

        assert!(repository.insert(viewer(tenant)).await.is_ok());
        let second = repository.insert(viewer(tenant)).await;
        assert!(matches!(second, Err(AppError::DuplicateSlug(_))));

        // Same slug in another tenant is a different scope.
        assert!(repository.insert(viewer(TenantId::new())).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_upserts_converge_on_one_role() {
        let repository = Arc::new(InMemoryRoleRepository::new());
        let tenant = TenantId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repository = repository.clone();
            handles.push(tokio::spawn(async move {
                repository.upsert_by_name(viewer(tenant)).await
            }));
        }
        for handle in handles {
            let joined = handle.await;
            assert!(joined.is_ok_and(|result| result.is_ok()));
        }

        let listed = repository.list(tenant).await;
        assert!(listed.is_ok_and(|roles| roles.len() == 1));
    }

    #[tokio::test]
    async fn upsert_restores_canonical_definition() {
        let repository = InMemoryRoleRepository::new();
        let tenant = TenantId::new();

        let seeded = repository.upsert_by_name(viewer(tenant)).await;
        let Ok(seeded) = seeded else {
            panic!("upsert failed");
        };

        let mut drifted = seeded.clone();
        drifted.set_permissions(PermissionTable::new());
        assert!(repository.update(drifted).await.is_ok());

        let restored = repository.upsert_by_name(viewer(tenant)).await;
        assert!(restored.is_ok_and(|role| {
            role.id() == seeded.id()
                && role.permissions().allows(Feature::LeadManagement, ActionKind::Read)
        }));
    }

    #[tokio::test]
    async fn find_many_skips_missing_ids() {
        let repository = InMemoryRoleRepository::new();
        let tenant = TenantId::new();

        let role = viewer(tenant);
        let role_id = role.id();
        assert!(repository.insert(role).await.is_ok());

        let found = repository
            .find_many(&[role_id, leadworks_domain::RoleId::new()])
            .await;
        assert!(found.is_ok_and(|roles| roles.len() == 1));
    }
}
