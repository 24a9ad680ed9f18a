//! `maquila-auth`: role-based authorization boundary.
//!
//! Decoupled from transport and storage: callers pass an explicit
//! [`ActorContext`] and a [`RoleDirectory`] resolves it into a [`Principal`].

pub mod authorize;
pub mod directory;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize_role, authorize_role_grant, resolve_principal};
pub use directory::{InMemoryRoleDirectory, RoleDirectory};
pub use principal::{ActorContext, PrincipalId, TenantMembership};
pub use roles::Role;
