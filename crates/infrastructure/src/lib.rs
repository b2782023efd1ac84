//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_repository;
mod in_memory_group_repository;
mod in_memory_role_repository;
mod in_memory_user_repository;
mod postgres_audit_repository;
mod postgres_group_repository;
mod postgres_role_repository;
mod postgres_user_repository;

pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_group_repository::InMemoryGroupRepository;
pub use in_memory_role_repository::InMemoryRoleRepository;
pub use in_memory_user_repository::InMemoryUserRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_group_repository::PostgresGroupRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use postgres_user_repository::PostgresUserRepository;
