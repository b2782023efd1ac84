//! Role store ports and application service.
//!
//! Owns role lifecycle: creation, patching, deletion, listing and the
//! idempotent seeding of the default role set. System roles are protected
//! here: tenant-level callers can read them but never alter or delete them.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::{ActionKind, Feature, PermissionTable, Role, RoleId, User, UserTypeKind};

use crate::audit::{AuditAction, AuditEvent, AuditRepository};
use crate::tenant_guard;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Repository port for role persistence.
///
/// Every mutation is atomic at the single-entity level: a concurrent reader
/// observes either the previous or the new role, never a partially written
/// one.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Inserts a new role.
    ///
    /// Fails with [`AppError::DuplicateSlug`] when `(tenant, slug)` is
    /// already taken. The uniqueness check and the insert are one atomic
    /// step, never a separate existence check followed by a write.
    async fn insert(&self, role: Role) -> AppResult<Role>;

    /// Finds a role by id.
    async fn find(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds roles by id; missing ids are silently absent from the result.
    async fn find_many(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>>;

    /// Lists the tenant's custom roles plus all system roles.
    async fn list(&self, tenant: TenantId) -> AppResult<Vec<Role>>;

    /// Replaces a stored role in full. Fails with [`AppError::NotFound`]
    /// when absent.
    async fn update(&self, role: Role) -> AppResult<()>;

    /// Deletes a role. Fails with [`AppError::NotFound`] when absent.
    /// References held by users or groups are left dangling by design.
    async fn delete(&self, role_id: RoleId) -> AppResult<()>;

    /// Atomic conditional write keyed on `(tenant, name)`: inserts the role
    /// when the key is absent, otherwise updates the stored role's
    /// permissions, user types, level and description to the given
    /// definition. Returns the stored role. Safe under concurrent first-run
    /// races.
    async fn upsert_by_name(&self, role: Role) -> AppResult<Role>;
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input payload for creating custom roles.
#[derive(Debug, Clone)]
pub struct CreateRoleInput {
    /// Display name.
    pub name: String,
    /// Slug, unique within the target tenant.
    pub slug: String,
    /// Optional description.
    pub description: Option<String>,
    /// Grants to attach to the role.
    pub permissions: PermissionTable,
    /// Advisory set of principal classes this role targets.
    pub for_user_types: BTreeSet<UserTypeKind>,
    /// Role level.
    pub level: u8,
    /// Explicit target tenant; required for operator actors, ignored for
    /// tenant-scoped actors.
    pub tenant: Option<TenantId>,
}

/// Partial update for a role. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Replacement permission table.
    pub permissions: Option<PermissionTable>,
    /// Replacement advisory user type set.
    pub for_user_types: Option<BTreeSet<UserTypeKind>>,
    /// New role level.
    pub level: Option<u8>,
    /// New activation flag.
    pub is_active: Option<bool>,
}

impl RolePatch {
    /// Returns whether the patch touches fields that are frozen on system
    /// roles for every caller.
    #[must_use]
    fn touches_protected_fields(&self) -> bool {
        self.permissions.is_some() || self.for_user_types.is_some() || self.level.is_some()
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Application service for role administration.
#[derive(Clone)]
pub struct RoleService {
    repository: Arc<dyn RoleRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RoleService {
    /// Creates a new role service from repository implementations.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            repository,
            audit_repository,
        }
    }

    /// Creates a custom role in the actor's tenant scope.
    pub async fn create_role(&self, actor: &User, input: CreateRoleInput) -> AppResult<Role> {
        let tenant = tenant_guard::resolve_target_tenant(actor, input.tenant)?;

        let role = Role::custom(
            tenant,
            input.name,
            input.slug,
            input.description,
            input.permissions,
            input.for_user_types,
            input.level,
        )?;

        let created = self.repository.insert(role).await?;
        self.append_role_event(actor, &created, AuditAction::RoleCreated, None)
            .await?;

        Ok(created)
    }

    /// Returns a role visible to the actor.
    ///
    /// System roles are globally visible; custom roles only within their
    /// tenant. Cross-tenant ids resolve to [`AppError::NotFound`] so that
    /// role ids do not leak across tenants.
    pub async fn get_role(&self, actor: &User, role_id: RoleId) -> AppResult<Role> {
        let role = self.find_visible(actor, role_id).await?;
        Ok(role)
    }

    /// Lists the target tenant's custom roles plus all system roles.
    pub async fn list_roles(&self, actor: &User, tenant: Option<TenantId>) -> AppResult<Vec<Role>> {
        let tenant = tenant_guard::resolve_target_tenant(actor, tenant)?;
        let mut roles = self.repository.list(tenant).await?;
        roles.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));
        Ok(roles)
    }

    /// Applies a partial update to a role.
    ///
    /// System roles reject changes to permissions, user types and level for
    /// every caller, and any change at all from tenant-level callers.
    pub async fn update_role(
        &self,
        actor: &User,
        role_id: RoleId,
        patch: RolePatch,
    ) -> AppResult<Role> {
        let mut role = self.find_visible(actor, role_id).await?;

        if role.is_system() {
            if patch.touches_protected_fields() {
                return Err(AppError::SystemRoleImmutable(format!(
                    "role '{}' is a system role; its grants cannot be changed",
                    role.slug()
                )));
            }

            if !actor.is_operator() {
                return Err(AppError::SystemRoleImmutable(format!(
                    "role '{}' is a system role and cannot be altered by tenant callers",
                    role.slug()
                )));
            }
        }

        if let Some(name) = patch.name {
            role.set_name(name)?;
        }
        if let Some(description) = patch.description {
            role.set_description(Some(description));
        }
        if let Some(permissions) = patch.permissions {
            role.set_permissions(permissions);
        }
        if let Some(for_user_types) = patch.for_user_types {
            role.set_for_user_types(for_user_types);
        }
        if let Some(level) = patch.level {
            role.set_level(level);
        }
        if let Some(is_active) = patch.is_active {
            role.set_active(is_active);
        }

        self.repository.update(role.clone()).await?;
        self.append_role_event(actor, &role, AuditAction::RoleUpdated, None)
            .await?;

        Ok(role)
    }

    /// Deletes a custom role.
    ///
    /// Deletion never cascades: users and groups that still reference the
    /// id keep the dangling reference, which resolves as an empty grant.
    pub async fn delete_role(&self, actor: &User, role_id: RoleId) -> AppResult<()> {
        let role = self.find_visible(actor, role_id).await?;

        if role.is_system() {
            return Err(AppError::SystemRoleImmutable(format!(
                "role '{}' is a system role and cannot be deleted",
                role.slug()
            )));
        }

        self.repository.delete(role_id).await?;
        self.append_role_event(actor, &role, AuditAction::RoleDeleted, None)
            .await?;

        Ok(())
    }

    /// Seeds the canonical default roles for a tenant.
    ///
    /// Each role is written through an atomic conditional upsert keyed on
    /// `(tenant, name)`, so the operation is idempotent and safe against
    /// concurrent first-run races: repeated or simultaneous calls converge
    /// on one copy of each role with the canonical definition.
    pub async fn ensure_default_roles(&self, tenant: TenantId) -> AppResult<Vec<Role>> {
        let mut seeded = Vec::new();
        for role in default_roles(tenant)? {
            seeded.push(self.repository.upsert_by_name(role).await?);
        }

        info!(%tenant, count = seeded.len(), "ensured default roles");
        Ok(seeded)
    }

    async fn find_visible(&self, actor: &User, role_id: RoleId) -> AppResult<Role> {
        let role = self
            .repository
            .find(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        if !role.is_system() && !tenant_guard::can_access(actor, role.tenant()) {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        }

        Ok(role)
    }

    async fn append_role_event(
        &self,
        actor: &User,
        role: &Role,
        action: AuditAction,
        detail: Option<String>,
    ) -> AppResult<()> {
        self.audit_repository
            .append_event(AuditEvent {
                tenant: role.tenant(),
                actor: actor.id(),
                action,
                resource_type: "role",
                resource_id: role.id().to_string(),
                detail,
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Default role set
// ---------------------------------------------------------------------------

const BUSINESS_FEATURES: &[Feature] = &[
    Feature::LeadManagement,
    Feature::ContactManagement,
    Feature::AccountManagement,
    Feature::OpportunityManagement,
    Feature::ActivityManagement,
];

/// Canonical definitions of the seeded `User`, `Manager` and `Admin` roles.
fn default_roles(tenant: TenantId) -> AppResult<Vec<Role>> {
    let mut user_permissions = PermissionTable::new();
    for feature in BUSINESS_FEATURES {
        user_permissions.grant(*feature, [ActionKind::Read]);
    }

    let mut manager_permissions = PermissionTable::new();
    for feature in BUSINESS_FEATURES {
        manager_permissions.grant(
            *feature,
            [
                ActionKind::Create,
                ActionKind::Read,
                ActionKind::Update,
                ActionKind::Delete,
                ActionKind::Convert,
                ActionKind::Import,
                ActionKind::Export,
            ],
        );
    }
    manager_permissions.grant(Feature::ReportManagement, [ActionKind::Read, ActionKind::Export]);

    let mut admin_permissions = PermissionTable::new();
    for feature in Feature::all() {
        admin_permissions.grant(*feature, [ActionKind::Manage]);
    }

    Ok(vec![
        Role::custom(
            tenant,
            "User",
            "user",
            Some("Read access to business records".to_owned()),
            user_permissions,
            BTreeSet::from([UserTypeKind::Standard, UserTypeKind::Admin]),
            1,
        )?,
        Role::custom(
            tenant,
            "Manager",
            "manager",
            Some("Full access to business records".to_owned()),
            manager_permissions,
            BTreeSet::from([UserTypeKind::Standard, UserTypeKind::Admin]),
            2,
        )?,
        Role::custom(
            tenant,
            "Admin",
            "admin",
            Some("Manage access to every feature".to_owned()),
            admin_permissions,
            BTreeSet::from([UserTypeKind::Admin]),
            3,
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use leadworks_core::{AppError, AppResult, TenantId};
    use leadworks_domain::{
        ActionKind, Feature, PermissionTable, Role, RoleId, User, UserTypeKind,
    };

    use crate::audit::{AuditEvent, AuditRepository};

    use super::{CreateRoleInput, RolePatch, RoleRepository, RoleService};

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
    struct FakeRoleRepository {
        roles: Mutex<HashMap<RoleId, Role>>,
    }

    impl FakeRoleRepository {
        async fn seed(&self, role: Role) -> RoleId {
            let role_id = role.id();
            self.roles.lock().await.insert(role_id, role);
            role_id
        }
    }

    #[async_trait]
    impl RoleRepository for FakeRoleRepository {
        async fn insert(&self, role: Role) -> AppResult<Role> {
            let mut roles = self.roles.lock().await;
            let taken = roles.values().any(|existing| {
                existing.tenant() == role.tenant() && existing.slug() == role.slug()
            });
            if taken {
                return Err(AppError::DuplicateSlug(format!(
                    "role slug '{}' is already taken",
                    role.slug()
                )));
            }

            roles.insert(role.id(), role.clone());
            Ok(role)
        }

        async fn find(&self, role_id: RoleId) -> AppResult<Option<Role>> {
            Ok(self.roles.lock().await.get(&role_id).cloned())
        }

        async fn find_many(&self, role_ids: &[RoleId]) -> AppResult<Vec<Role>> {
            let roles = self.roles.lock().await;
            Ok(role_ids
                .iter()
                .filter_map(|role_id| roles.get(role_id).cloned())
                .collect())
        }

        async fn list(&self, tenant: TenantId) -> AppResult<Vec<Role>> {
            Ok(self
                .roles
                .lock()
                .await
                .values()
                .filter(|role| role.is_system() || role.tenant() == Some(tenant))
                .cloned()
                .collect())
        }

        async fn update(&self, role: Role) -> AppResult<()> {
            let mut roles = self.roles.lock().await;
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
            if self.roles.lock().await.remove(&role_id).is_none() {
                return Err(AppError::NotFound(format!(
                    "role '{role_id}' does not exist"
                )));
            }
            Ok(())
        }

        async fn upsert_by_name(&self, role: Role) -> AppResult<Role> {
            let mut roles = self.roles.lock().await;
            let existing = roles
                .values()
                .find(|existing| {
                    existing.tenant() == role.tenant()
                        && existing.name().as_str() == role.name().as_str()
                })
                .cloned();

            let stored = match existing {
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

    fn service() -> (RoleService, Arc<FakeRoleRepository>) {
        let repository = Arc::new(FakeRoleRepository::default());
        let service = RoleService::new(repository.clone(), Arc::new(FakeAuditRepository::default()));
        (service, repository)
    }

    fn viewer_input(tenant: Option<TenantId>) -> CreateRoleInput {
        let mut permissions = PermissionTable::new();
        permissions.grant(Feature::LeadManagement, [ActionKind::Read]);

        CreateRoleInput {
            name: "Viewer".to_owned(),
            slug: "viewer".to_owned(),
            description: None,
            permissions,
            for_user_types: BTreeSet::from([UserTypeKind::Standard]),
            level: 1,
            tenant,
        }
    }

    fn system_role() -> Role {
        match Role::system(
            "Platform Operator",
            "platform_operator",
            None,
            PermissionTable::new(),
            BTreeSet::new(),
            10,
        ) {
            Ok(role) => role,
            Err(error) => panic!("system role construction failed: {error}"),
        }
    }

    #[tokio::test]
    async fn duplicate_slug_in_same_tenant_is_rejected() {
        let (service, _) = service();
        let tenant = TenantId::new();
        let actor = User::new(tenant, UserTypeKind::Admin);

        let first = service.create_role(&actor, viewer_input(None)).await;
        assert!(first.is_ok());

        let second = service.create_role(&actor, viewer_input(None)).await;
        assert!(matches!(second, Err(AppError::DuplicateSlug(_))));
    }

    #[tokio::test]
    async fn same_slug_in_different_tenant_succeeds() {
        let (service, _) = service();
        let actor_one = User::new(TenantId::new(), UserTypeKind::Admin);
        let actor_two = User::new(TenantId::new(), UserTypeKind::Admin);

        assert!(service.create_role(&actor_one, viewer_input(None)).await.is_ok());
        assert!(service.create_role(&actor_two, viewer_input(None)).await.is_ok());
    }

    #[tokio::test]
    async fn operator_create_without_tenant_fails() {
        let (service, _) = service();
        let operator = User::operator(None);

        let result = service.create_role(&operator, viewer_input(None)).await;
        assert!(matches!(result, Err(AppError::TenantRequired(_))));

        let result = service
            .create_role(&operator, viewer_input(Some(TenantId::new())))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn system_role_grants_cannot_be_patched() {
        let (service, repository) = service();
        let role_id = repository.seed(system_role()).await;
        let operator = User::operator(None);

        let patch = RolePatch {
            permissions: Some(PermissionTable::new()),
            ..RolePatch::default()
        };
        let result = service.update_role(&operator, role_id, patch).await;
        assert!(matches!(result, Err(AppError::SystemRoleImmutable(_))));
    }

    #[tokio::test]
    async fn tenant_caller_cannot_rename_system_role() {
        let (service, repository) = service();
        let role_id = repository.seed(system_role()).await;
        let admin = User::new(TenantId::new(), UserTypeKind::Admin);

        let patch = RolePatch {
            name: Some("Renamed".to_owned()),
            ..RolePatch::default()
        };
        let result = service.update_role(&admin, role_id, patch).await;
        assert!(matches!(result, Err(AppError::SystemRoleImmutable(_))));
    }

    #[tokio::test]
    async fn system_role_cannot_be_deleted() {
        let (service, repository) = service();
        let role_id = repository.seed(system_role()).await;
        let operator = User::operator(None);

        let result = service.delete_role(&operator, role_id).await;
        assert!(matches!(result, Err(AppError::SystemRoleImmutable(_))));
    }

    #[tokio::test]
    async fn cross_tenant_role_resolves_to_not_found() {
        let (service, _) = service();
        let owner = User::new(TenantId::new(), UserTypeKind::Admin);
        let outsider = User::new(TenantId::new(), UserTypeKind::Admin);

        let created = service.create_role(&owner, viewer_input(None)).await;
        let Ok(created) = created else {
            panic!("role creation failed");
        };

        let result = service.get_role(&outsider, created.id()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn default_role_seeding_is_idempotent() {
        let (service, repository) = service();
        let tenant = TenantId::new();

        let first = service.ensure_default_roles(tenant).await;
        assert!(first.is_ok_and(|roles| roles.len() == 3));

        let second = service.ensure_default_roles(tenant).await;
        assert!(second.is_ok_and(|roles| roles.len() == 3));

        let stored = repository.roles.lock().await;
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn seeding_restores_canonical_grants() {
        let (service, _) = service();
        let tenant = TenantId::new();
        let actor = User::new(tenant, UserTypeKind::Admin);

        let seeded = service.ensure_default_roles(tenant).await;
        let Ok(seeded) = seeded else {
            panic!("seeding failed");
        };
        let Some(admin_role) = seeded.iter().find(|role| role.name().as_str() == "Admin") else {
            panic!("admin role missing");
        };

        // Drift the admin role, then reseed: grants return to canonical.
        let patch = RolePatch {
            permissions: Some(PermissionTable::new()),
            ..RolePatch::default()
        };
        assert!(service.update_role(&actor, admin_role.id(), patch).await.is_ok());

        let reseeded = service.ensure_default_roles(tenant).await;
        let Ok(reseeded) = reseeded else {
            panic!("reseeding failed");
        };
        let restored = reseeded
            .iter()
            .find(|role| role.name().as_str() == "Admin")
            .is_some_and(|role| {
                role.permissions().allows(Feature::LeadManagement, ActionKind::Manage)
            });
        assert!(restored);
    }
}
