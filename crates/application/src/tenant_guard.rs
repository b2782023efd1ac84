//! Cross-tenant access rules.
//!
//! Tenant scoping is orthogonal to the permission resolver: callers apply
//! both checks on every path that touches a tenant-owned resource. Having a
//! feature permission never substitutes for a tenant match, and the operator
//! bypass lives here and in [`crate::AuthorizationService`] only, so it is
//! auditable in one place rather than re-implemented per call site.

use leadworks_core::{AppError, AppResult, TenantId};
use leadworks_domain::User;

/// Returns whether the principal may address a resource owned by
/// `resource_tenant`.
///
/// Operators may address any resource, including tenant-less system
/// resources (`resource_tenant == None`). Every other principal matches only
/// resources of its own tenant; a tenant-scoped principal without a tenant
/// matches nothing.
#[must_use]
pub fn can_access(principal: &User, resource_tenant: Option<TenantId>) -> bool {
    if principal.is_operator() {
        return true;
    }

    match (principal.tenant(), resource_tenant) {
        (Some(own), Some(target)) => own == target,
        _ => false,
    }
}

/// Resolves the tenant a creation flow must write into.
///
/// Operators carry no implicit tenant, so they must name the target
/// explicitly; omitting it fails with [`AppError::TenantRequired`]. For
/// tenant-scoped principals the own tenant always wins and any
/// caller-supplied value is ignored.
pub fn resolve_target_tenant(
    principal: &User,
    requested: Option<TenantId>,
) -> AppResult<TenantId> {
    if principal.is_operator() {
        return requested.ok_or_else(|| {
            AppError::TenantRequired(
                "operator-initiated create must name an explicit target tenant".to_owned(),
            )
        });
    }

    principal.tenant().ok_or_else(|| {
        AppError::TenantRequired("principal has no tenant to create resources in".to_owned())
    })
}

#[cfg(test)]
mod tests {
    use leadworks_core::TenantId;
    use leadworks_domain::{User, UserTypeKind};

    use super::{can_access, resolve_target_tenant};

    #[test]
    fn operator_accesses_every_tenant_and_none() {
        let operator = User::operator(None);
        assert!(can_access(&operator, Some(TenantId::new())));
        assert!(can_access(&operator, None));
    }

    #[test]
    fn tenant_principal_matches_own_tenant_only() {
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let principal = User::new(t1, UserTypeKind::Standard);

        assert!(can_access(&principal, Some(t1)));
        assert!(!can_access(&principal, Some(t2)));
        assert!(!can_access(&principal, None));
    }

    #[test]
    fn operator_create_requires_explicit_tenant() {
        let operator = User::operator(None);
        assert!(resolve_target_tenant(&operator, None).is_err());

        let target = TenantId::new();
        let resolved = resolve_target_tenant(&operator, Some(target));
        assert!(resolved.is_ok_and(|tenant| tenant == target));
    }

    #[test]
    fn tenant_principal_create_ignores_requested_tenant() {
        let own = TenantId::new();
        let principal = User::new(own, UserTypeKind::Admin);

        let resolved = resolve_target_tenant(&principal, Some(TenantId::new()));
        assert!(resolved.is_ok_and(|tenant| tenant == own));
    }
}
