//! Company administration: tenant lifecycle and role assignment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument, warn};

use maquila_auth::{
    ActorContext, AuthzError, InMemoryRoleDirectory, PrincipalId, Role, authorize_role,
    authorize_role_grant, resolve_principal,
};
use maquila_companies::{
    ActivateCompany, CancelCompany, Company, CompanyCommand, CompanyStatus, RegisterCompany,
    SuspendCompany,
};
use maquila_core::TenantId;
use maquila_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

pub const COMPANY_AGGREGATE_TYPE: &str = "maquila.company";

#[derive(Debug, Error)]
pub enum CompanyServiceError {
    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("company not found")]
    NotFound,

    #[error("company {0} is cancelled")]
    Cancelled(TenantId),

    #[error("rejected: {0}")]
    Rejected(String),

    /// Order numbers embed the NIT, so it identifies one company only.
    #[error("NIT {nit} is already registered to company {company_id}")]
    DuplicateNit { nit: String, company_id: TenantId },

    #[error("company registry unavailable")]
    Unavailable,

    #[error(transparent)]
    Dispatch(DispatchError),
}

impl From<DispatchError> for CompanyServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::NotFound => CompanyServiceError::NotFound,
            DispatchError::Validation(msg)
            | DispatchError::InvariantViolation(msg)
            | DispatchError::Conflict(msg) => CompanyServiceError::Rejected(msg),
            other => CompanyServiceError::Dispatch(other),
        }
    }
}

/// Super-admin operations on companies, plus member management for
/// company admins.
pub struct CompanyService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: Arc<InMemoryRoleDirectory>,
    /// Registered NITs. Cancelled companies keep theirs.
    nits: Mutex<HashMap<String, TenantId>>,
}

impl<S, B> CompanyService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        directory: Arc<InMemoryRoleDirectory>,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            nits: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self), fields(principal_id = %ctx.principal_id))]
    pub fn register(
        &self,
        ctx: &ActorContext,
        name: &str,
        nit: &str,
    ) -> Result<Company, CompanyServiceError> {
        self.require_super_admin(ctx)?;

        // Held until the company is stored so two registrations cannot race.
        let mut nits = self.nits.lock().map_err(|_| CompanyServiceError::Unavailable)?;
        let key = nit.trim();
        if let Some(existing) = nits.get(key) {
            warn!(nit = key, company_id = %existing, "duplicate NIT rejected");
            return Err(CompanyServiceError::DuplicateNit {
                nit: key.to_string(),
                company_id: *existing,
            });
        }

        let tenant_id = TenantId::new();
        let company = self.execute(
            tenant_id,
            CompanyCommand::RegisterCompany(RegisterCompany {
                tenant_id,
                name: name.to_string(),
                nit: nit.to_string(),
                occurred_at: Utc::now(),
            }),
        )?;
        nits.insert(company.nit().to_string(), tenant_id);

        info!(%tenant_id, nit = %company.nit(), "company registered");
        Ok(company)
    }

    #[instrument(skip(self), fields(principal_id = %ctx.principal_id))]
    pub fn suspend(
        &self,
        ctx: &ActorContext,
        company_id: TenantId,
        reason: &str,
    ) -> Result<Company, CompanyServiceError> {
        self.require_super_admin(ctx)?;
        let company = self.execute(
            company_id,
            CompanyCommand::SuspendCompany(SuspendCompany {
                tenant_id: company_id,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%company_id, reason, "company suspended");
        Ok(company)
    }

    #[instrument(skip(self), fields(principal_id = %ctx.principal_id))]
    pub fn activate(
        &self,
        ctx: &ActorContext,
        company_id: TenantId,
    ) -> Result<Company, CompanyServiceError> {
        self.require_super_admin(ctx)?;
        let company = self.execute(
            company_id,
            CompanyCommand::ActivateCompany(ActivateCompany {
                tenant_id: company_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%company_id, "company activated");
        Ok(company)
    }

    #[instrument(skip(self), fields(principal_id = %ctx.principal_id))]
    pub fn cancel(
        &self,
        ctx: &ActorContext,
        company_id: TenantId,
        reason: &str,
    ) -> Result<Company, CompanyServiceError> {
        self.require_super_admin(ctx)?;
        let company = self.execute(
            company_id,
            CompanyCommand::CancelCompany(CancelCompany {
                tenant_id: company_id,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%company_id, reason, "company cancelled");
        Ok(company)
    }

    pub fn get(&self, company_id: TenantId) -> Result<Company, CompanyServiceError> {
        let company: Company = self
            .dispatcher
            .load(company_id, company_id.company_aggregate_id(), |t, _| {
                Company::empty(t)
            })?;
        if !company.exists() {
            return Err(CompanyServiceError::NotFound);
        }
        Ok(company)
    }

    /// Give `member` a role in `company_id`.
    ///
    /// The actor (resolved in `ctx.company_id`) must be a super admin, or the
    /// company admin of `company_id` granting a non-super-admin role.
    #[instrument(skip(self), fields(principal_id = %ctx.principal_id))]
    pub fn assign_member(
        &self,
        ctx: &ActorContext,
        company_id: TenantId,
        member: PrincipalId,
        role: Role,
    ) -> Result<(), CompanyServiceError> {
        let granter = resolve_principal(self.directory.as_ref(), ctx)?;
        if let Err(err) = authorize_role_grant(&granter, company_id, role) {
            warn!(%company_id, %role, error = %err, "role assignment rejected");
            return Err(err.into());
        }

        if self.get(company_id)?.status() == CompanyStatus::Cancelled {
            return Err(CompanyServiceError::Cancelled(company_id));
        }

        self.directory.assign(company_id, member, role);
        info!(%company_id, member_id = %member, %role, "role assigned");
        Ok(())
    }

    fn require_super_admin(&self, ctx: &ActorContext) -> Result<(), CompanyServiceError> {
        let principal = resolve_principal(self.directory.as_ref(), ctx)?;
        authorize_role(&principal, Role::SuperAdmin).map_err(|err| {
            warn!(error = %err, "company administration rejected");
            CompanyServiceError::from(err)
        })
    }

    fn execute(
        &self,
        company_id: TenantId,
        command: CompanyCommand,
    ) -> Result<Company, CompanyServiceError> {
        let dispatched = self.dispatcher.dispatch(
            company_id,
            company_id.company_aggregate_id(),
            COMPANY_AGGREGATE_TYPE,
            command,
            |t, _| Company::empty(t),
        )?;
        Ok(dispatched.aggregate)
    }
}

impl<S, B> core::fmt::Debug for CompanyService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompanyService").finish_non_exhaustive()
    }
}
