//! Domain entities and invariants for the Leadworks authorization engine.

#![forbid(unsafe_code)]

mod group;
mod permission;
mod role;
mod user;

pub use group::{Group, GroupId};
pub use permission::{ActionKind, Feature, PermissionTable};
pub use role::{Role, RoleId, RoleType};
pub use user::{User, UserId, UserTypeKind};
