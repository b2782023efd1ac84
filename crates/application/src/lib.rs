//! Application services and ports for the Leadworks authorization engine.

#![forbid(unsafe_code)]

mod audit;
mod authorization_service;
mod group_service;
mod role_service;
pub mod tenant_guard;
mod user_service;

pub use audit::{AuditAction, AuditEvent, AuditRepository};
pub use authorization_service::AuthorizationService;
pub use group_service::{CreateGroupInput, GroupPatch, GroupRepository, GroupService};
pub use role_service::{CreateRoleInput, RolePatch, RoleRepository, RoleService};
pub use user_service::{CreateUserInput, UserRepository, UserService};
