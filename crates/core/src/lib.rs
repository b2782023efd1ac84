//! Shared primitives for all Rust crates in Leadworks.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type used across Leadworks crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Maximum accepted slug length.
pub const SLUG_MAX_LENGTH: usize = 64;

/// A validated URL-safe identifier used for uniqueness scopes.
///
/// Slugs are lowercase and restricted to `[a-z0-9_-]`. Uniqueness within a
/// tenant is enforced by the stores, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    /// Creates a validated slug.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();

        if value.is_empty() {
            return Err(AppError::Validation("slug must not be empty".to_owned()));
        }

        if value.len() > SLUG_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "slug must not exceed {SLUG_MAX_LENGTH} characters"
            )));
        }

        let valid = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(AppError::Validation(format!(
                "slug '{value}' must contain only lowercase letters, digits, '_' or '-'"
            )));
        }

        Ok(Self(value))
    }

    /// Derives a slug from free-form text (spaces become underscores).
    pub fn from_display_name(value: &str) -> AppResult<Self> {
        let lowered = value.trim().to_lowercase();
        let slug: String = lowered
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
            .collect();

        Self::new(slug)
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<Slug> for String {
    fn from(value: Slug) -> Self {
        value.0
    }
}

impl Display for Slug {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Tenant identifier used as the partition key for every persisted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a random tenant identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a tenant identifier from an existing UUID value.
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

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation on a `(tenant, slug)` or `(tenant, name)` scope.
    #[error("duplicate slug: {0}")]
    DuplicateSlug(String),

    /// Attempted mutation of a protected system role.
    #[error("system role immutable: {0}")]
    SystemRoleImmutable(String),

    /// Operator-initiated create omitted an explicit target tenant.
    #[error("tenant required: {0}")]
    TenantRequired(String),

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::{NonEmptyString, Slug, TenantId};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn tenant_id_formats_as_uuid() {
        let tenant_id = TenantId::new();
        assert_eq!(tenant_id.to_string().len(), 36);
    }

    #[test]
    fn slug_accepts_lowercase_identifier() {
        assert!(Slug::new("sales_team-2").is_ok());
    }

    #[test]
    fn slug_rejects_uppercase_and_spaces() {
        assert!(Slug::new("Sales Team").is_err());
        assert!(Slug::new("").is_err());
    }

    #[test]
    fn slug_from_display_name_normalizes() {
        let slug = Slug::from_display_name("  Sales Team ");
        assert!(slug.is_ok_and(|s| s.as_str() == "sales_team"));
    }

    #[test]
    fn slug_rejects_overlong_value() {
        let long = "a".repeat(super::SLUG_MAX_LENGTH + 1);
        assert!(Slug::new(long).is_err());
    }
}
