use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role held by a principal inside one company.
///
/// The five stage roles each own one step of the order lifecycle; the two
/// administrative roles manage companies and memberships but never advance
/// orders.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator; manages companies across tenants.
    SuperAdmin,
    /// Manages memberships within a single company.
    CompanyAdmin,
    Registration,
    Roasting,
    Production,
    Invoicing,
    Delivery,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::SuperAdmin,
        Role::CompanyAdmin,
        Role::Registration,
        Role::Roasting,
        Role::Production,
        Role::Invoicing,
        Role::Delivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::CompanyAdmin => "company_admin",
            Role::Registration => "registration",
            Role::Roasting => "roasting",
            Role::Production => "production",
            Role::Invoicing => "invoicing",
            Role::Delivery => "delivery",
        }
    }

    /// True for roles that own an order lifecycle stage.
    pub fn is_stage_role(&self) -> bool {
        !matches!(self, Role::SuperAdmin | Role::CompanyAdmin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
