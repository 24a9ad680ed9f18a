//! Role directory: who holds which role in which company.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use maquila_core::TenantId;

use crate::{PrincipalId, Role};

/// Source of truth for role assignments, consumed by the lifecycle
/// controller to authorize every transition.
pub trait RoleDirectory: Send + Sync {
    /// Role of `principal_id` inside `company_id`, or `None` if the principal
    /// is not a member of that company.
    fn role_of(&self, company_id: TenantId, principal_id: PrincipalId) -> Option<Role>;
}

impl<D> RoleDirectory for Arc<D>
where
    D: RoleDirectory + ?Sized,
{
    fn role_of(&self, company_id: TenantId, principal_id: PrincipalId) -> Option<Role> {
        (**self).role_of(company_id, principal_id)
    }
}

/// In-memory role directory for tests/dev and the bundled runtime.
///
/// Super admins are platform-wide: they resolve to [`Role::SuperAdmin`] in
/// every company. Everyone else holds exactly one role per company.
#[derive(Debug, Default)]
pub struct InMemoryRoleDirectory {
    memberships: RwLock<HashMap<(TenantId, PrincipalId), Role>>,
    super_admins: RwLock<HashSet<PrincipalId>>,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign (or replace) a principal's role in a company.
    ///
    /// Assigning [`Role::SuperAdmin`] grants the platform-wide role instead.
    pub fn assign(&self, company_id: TenantId, principal_id: PrincipalId, role: Role) {
        if role == Role::SuperAdmin {
            self.grant_super_admin(principal_id);
            return;
        }
        if let Ok(mut map) = self.memberships.write() {
            map.insert((company_id, principal_id), role);
        }
    }

    /// Remove a principal from a company, returning the role it held.
    pub fn revoke(&self, company_id: TenantId, principal_id: PrincipalId) -> Option<Role> {
        self.memberships
            .write()
            .ok()?
            .remove(&(company_id, principal_id))
    }

    pub fn grant_super_admin(&self, principal_id: PrincipalId) {
        if let Ok(mut set) = self.super_admins.write() {
            set.insert(principal_id);
        }
    }

    /// All members of a company with their roles (super admins excluded).
    pub fn members(&self, company_id: TenantId) -> Vec<(PrincipalId, Role)> {
        let map = match self.memberships.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((c, p), r)| (*c == company_id).then_some((*p, *r)))
            .collect()
    }
}

impl RoleDirectory for InMemoryRoleDirectory {
    fn role_of(&self, company_id: TenantId, principal_id: PrincipalId) -> Option<Role> {
        let is_super_admin = self
            .super_admins
            .read()
            .map(|set| set.contains(&principal_id))
            .unwrap_or(false);
        if is_super_admin {
            return Some(Role::SuperAdmin);
        }

        self.memberships
            .read()
            .ok()?
            .get(&(company_id, principal_id))
            .copied()
    }
}
