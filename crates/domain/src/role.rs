//! Role domain types.
//!
//! A role is a named, reusable bundle of permission grants. System roles are
//! tenant-independent, immutable and never deleted; custom roles belong to a
//! tenant and are unique by `(tenant, slug)`.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use leadworks_core::{AppError, AppResult, NonEmptyString, Slug, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::PermissionTable;
use crate::user::UserTypeKind;

/// Unique identifier for a role record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
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

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Origin class of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// Built-in role: immutable and undeletable by tenant callers.
    System,
    /// Tenant-defined role.
    Custom,
}

impl RoleType {
    /// Returns a stable storage value for this role type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for RoleType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Self::System),
            "custom" => Ok(Self::Custom),
            _ => Err(AppError::Validation(format!(
                "unknown role type '{value}'"
            ))),
        }
    }
}

/// A named bundle of permission grants, reusable across users and groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
    slug: Slug,
    description: Option<String>,
    permissions: PermissionTable,
    role_type: RoleType,
    for_user_types: BTreeSet<UserTypeKind>,
    level: u8,
    tenant: Option<TenantId>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Role {
    /// Creates a validated tenant-scoped custom role.
    pub fn custom(
        tenant: TenantId,
        name: impl Into<String>,
        slug: impl Into<String>,
        description: Option<String>,
        permissions: PermissionTable,
        for_user_types: BTreeSet<UserTypeKind>,
        level: u8,
    ) -> AppResult<Self> {
        Ok(Self {
            id: RoleId::new(),
            name: NonEmptyString::new(name)?,
            slug: Slug::new(slug)?,
            description,
            permissions,
            role_type: RoleType::Custom,
            for_user_types,
            level,
            tenant: Some(tenant),
            is_active: true,
            created_at: Utc::now(),
        })
    }

    /// Creates a validated system role, visible read-only to every tenant.
    pub fn system(
        name: impl Into<String>,
        slug: impl Into<String>,
        description: Option<String>,
        permissions: PermissionTable,
        for_user_types: BTreeSet<UserTypeKind>,
        level: u8,
    ) -> AppResult<Self> {
        Ok(Self {
            id: RoleId::new(),
            name: NonEmptyString::new(name)?,
            slug: Slug::new(slug)?,
            description,
            permissions,
            role_type: RoleType::System,
            for_user_types,
            level,
            tenant: None,
            is_active: true,
            created_at: Utc::now(),
        })
    }

    /// Rebuilds a role from already-validated stored parts.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_storage(
        id: RoleId,
        name: NonEmptyString,
        slug: Slug,
        description: Option<String>,
        permissions: PermissionTable,
        role_type: RoleType,
        for_user_types: BTreeSet<UserTypeKind>,
        level: u8,
        tenant: Option<TenantId>,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            slug,
            description,
            permissions,
            role_type,
            for_user_types,
            level,
            tenant,
            is_active,
            created_at,
        }
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
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

    /// Returns the role's permission table.
    #[must_use]
    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    /// Returns the role origin class.
    #[must_use]
    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    /// Returns whether this is a protected system role.
    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self.role_type, RoleType::System)
    }

    /// Returns the advisory set of principal classes this role targets.
    #[must_use]
    pub fn for_user_types(&self) -> &BTreeSet<UserTypeKind> {
        &self.for_user_types
    }

    /// Returns the role level (higher levels outrank lower ones in UI sorts).
    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Returns the owning tenant; `None` for system roles.
    #[must_use]
    pub fn tenant(&self) -> Option<TenantId> {
        self.tenant
    }

    /// Returns whether the role contributes grants during resolution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Renames the role.
    pub fn set_name(&mut self, name: impl Into<String>) -> AppResult<()> {
        self.name = NonEmptyString::new(name)?;
        Ok(())
    }

    /// Replaces the description.
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Replaces the permission table.
    pub fn set_permissions(&mut self, permissions: PermissionTable) {
        self.permissions = permissions;
    }

    /// Replaces the advisory user type set.
    pub fn set_for_user_types(&mut self, for_user_types: BTreeSet<UserTypeKind>) {
        self.for_user_types = for_user_types;
    }

    /// Replaces the role level.
    pub fn set_level(&mut self, level: u8) {
        self.level = level;
    }

    /// Sets the activation flag.
    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }
}
