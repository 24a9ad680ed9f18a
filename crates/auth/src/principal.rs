use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use maquila_core::TenantId;

use crate::Role;

/// Identity of an authenticated principal (a company user).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<PrincipalId> for Uuid {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Per-request context: which company the actor is acting within, and who
/// the actor is.
///
/// Passed explicitly into every controller call; there is no ambient
/// "current company" or "current user".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorContext {
    pub company_id: TenantId,
    pub principal_id: PrincipalId,
}

impl ActorContext {
    pub fn new(company_id: TenantId, principal_id: PrincipalId) -> Self {
        Self {
            company_id,
            principal_id,
        }
    }
}

/// A principal's membership in a company: one role per company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub role: Role,
}
