use thiserror::Error;
use tracing::debug;

use maquila_core::TenantId;

use crate::{ActorContext, PrincipalId, Role, RoleDirectory, TenantMembership};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    pub fn role(&self) -> Role {
        self.membership.role
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("principal {principal_id} is not a member of company {company_id}")]
    UnknownPrincipal {
        principal_id: PrincipalId,
        company_id: TenantId,
    },

    #[error("forbidden: requires role '{required}', actor has '{actual}'")]
    Forbidden { required: Role, actual: Role },

    #[error("role '{granter}' may not grant '{role}'")]
    CannotGrant { granter: Role, role: Role },
}

/// Resolve the actor of a request through the role directory.
pub fn resolve_principal<D>(directory: &D, ctx: &ActorContext) -> Result<Principal, AuthzError>
where
    D: RoleDirectory + ?Sized,
{
    let role = directory
        .role_of(ctx.company_id, ctx.principal_id)
        .ok_or(AuthzError::UnknownPrincipal {
            principal_id: ctx.principal_id,
            company_id: ctx.company_id,
        })?;

    Ok(Principal {
        principal_id: ctx.principal_id,
        active_tenant_id: ctx.company_id,
        membership: TenantMembership {
            tenant_id: ctx.company_id,
            role,
        },
    })
}

/// Require the principal to hold exactly `required` in its active company.
///
/// No role implies another: administrative roles do not stand in for stage
/// roles.
pub fn authorize_role(principal: &Principal, required: Role) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal.role() == required {
        Ok(())
    } else {
        debug!(
            principal_id = %principal.principal_id,
            required = %required,
            actual = %principal.role(),
            "role check denied"
        );
        Err(AuthzError::Forbidden {
            required,
            actual: principal.role(),
        })
    }
}

/// Decide whether `granter` may assign `role` to someone in `company_id`.
///
/// - super admins may grant any role in any company;
/// - company admins may grant any non-super-admin role in their own company;
/// - nobody else may grant roles.
pub fn authorize_role_grant(
    granter: &Principal,
    company_id: TenantId,
    role: Role,
) -> Result<(), AuthzError> {
    if granter.active_tenant_id != granter.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    match granter.role() {
        Role::SuperAdmin => Ok(()),
        Role::CompanyAdmin if role == Role::SuperAdmin => Err(AuthzError::CannotGrant {
            granter: Role::CompanyAdmin,
            role,
        }),
        Role::CompanyAdmin if granter.active_tenant_id != company_id => {
            Err(AuthzError::TenantMismatch)
        }
        Role::CompanyAdmin => Ok(()),
        other => Err(AuthzError::CannotGrant {
            granter: other,
            role,
        }),
    }
}
