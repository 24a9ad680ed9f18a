use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maquila_core::{Aggregate, AggregateRoot, DomainError, TenantId};
use maquila_events::Event;

/// Company subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Active,
    Suspended,
    Cancelled,
}

/// Aggregate root: Company. Its id is the tenant id it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    id: TenantId,
    name: String,
    nit: String,
    status: CompanyStatus,
    suspension_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Company {
    /// Create an empty, not-yet-registered instance for rehydration.
    pub fn empty(id: TenantId) -> Self {
        Self {
            id,
            name: String::new(),
            nit: String::new(),
            status: CompanyStatus::Active,
            suspension_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tax identification number, used in order numbers.
    pub fn nit(&self) -> &str {
        &self.nit
    }

    pub fn status(&self) -> CompanyStatus {
        self.status
    }

    pub fn suspension_reason(&self) -> Option<&str> {
        self.suspension_reason.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Only registered, active companies may operate on their data.
    pub fn is_active(&self) -> bool {
        self.created && self.status == CompanyStatus::Active
    }
}

impl AggregateRoot for Company {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCompany {
    pub tenant_id: TenantId,
    pub name: String,
    pub nit: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendCompany {
    pub tenant_id: TenantId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateCompany {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCompany {
    pub tenant_id: TenantId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyCommand {
    RegisterCompany(RegisterCompany),
    SuspendCompany(SuspendCompany),
    ActivateCompany(ActivateCompany),
    CancelCompany(CancelCompany),
}

/// Event: CompanyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistered {
    pub tenant_id: TenantId,
    pub name: String,
    pub nit: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CompanySuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySuspended {
    pub tenant_id: TenantId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CompanyActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyActivated {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CompanyCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyCancelled {
    pub tenant_id: TenantId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyEvent {
    CompanyRegistered(CompanyRegistered),
    CompanySuspended(CompanySuspended),
    CompanyActivated(CompanyActivated),
    CompanyCancelled(CompanyCancelled),
}

impl Event for CompanyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CompanyEvent::CompanyRegistered(_) => "maquila.company.registered",
            CompanyEvent::CompanySuspended(_) => "maquila.company.suspended",
            CompanyEvent::CompanyActivated(_) => "maquila.company.activated",
            CompanyEvent::CompanyCancelled(_) => "maquila.company.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CompanyEvent::CompanyRegistered(e) => e.occurred_at,
            CompanyEvent::CompanySuspended(e) => e.occurred_at,
            CompanyEvent::CompanyActivated(e) => e.occurred_at,
            CompanyEvent::CompanyCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Company {
    type Command = CompanyCommand;
    type Event = CompanyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CompanyEvent::CompanyRegistered(e) => {
                self.id = e.tenant_id;
                self.name = e.name.clone();
                self.nit = e.nit.clone();
                self.status = CompanyStatus::Active;
                self.suspension_reason = None;
                self.created = true;
            }
            CompanyEvent::CompanySuspended(e) => {
                self.status = CompanyStatus::Suspended;
                self.suspension_reason = Some(e.reason.clone());
            }
            CompanyEvent::CompanyActivated(_) => {
                self.status = CompanyStatus::Active;
                self.suspension_reason = None;
            }
            CompanyEvent::CompanyCancelled(e) => {
                self.status = CompanyStatus::Cancelled;
                self.suspension_reason = Some(e.reason.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CompanyCommand::RegisterCompany(cmd) => self.handle_register(cmd),
            CompanyCommand::SuspendCompany(cmd) => self.handle_suspend(cmd),
            CompanyCommand::ActivateCompany(cmd) => self.handle_activate(cmd),
            CompanyCommand::CancelCompany(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Company {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.id != tenant_id {
            return Err(DomainError::invariant("tenant_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)
    }

    fn handle_register(&self, cmd: &RegisterCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("company already exists"));
        }
        self.ensure_tenant(cmd.tenant_id)?;

        let name = cmd.name.trim();
        let nit = cmd.nit.trim();
        if name.is_empty() {
            return Err(DomainError::validation("company name is required"));
        }
        if nit.is_empty() {
            return Err(DomainError::validation("company NIT is required"));
        }

        Ok(vec![CompanyEvent::CompanyRegistered(CompanyRegistered {
            tenant_id: cmd.tenant_id,
            name: name.to_string(),
            nit: nit.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;

        if self.status != CompanyStatus::Active {
            return Err(DomainError::invariant("only active companies can be suspended"));
        }

        Ok(vec![CompanyEvent::CompanySuspended(CompanySuspended {
            tenant_id: cmd.tenant_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;

        match self.status {
            CompanyStatus::Cancelled => Err(DomainError::invariant(
                "cannot activate a cancelled company",
            )),
            // Already active: nothing happened.
            CompanyStatus::Active => Ok(vec![]),
            CompanyStatus::Suspended => {
                Ok(vec![CompanyEvent::CompanyActivated(CompanyActivated {
                    tenant_id: cmd.tenant_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_cancel(&self, cmd: &CancelCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;

        if self.status == CompanyStatus::Cancelled {
            return Err(DomainError::invariant("company is already cancelled"));
        }

        Ok(vec![CompanyEvent::CompanyCancelled(CompanyCancelled {
            tenant_id: cmd.tenant_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
