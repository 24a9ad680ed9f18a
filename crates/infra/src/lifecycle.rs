//! Order lifecycle controller.
//!
//! Entry point for every order mutation and status query. Each call carries
//! an explicit [`ActorContext`]; the controller resolves the actor's role in
//! that company, checks that the company is active, and runs the command
//! through the [`CommandDispatcher`]. Transition legality and the stage
//! authorization table live in the `MaquilaOrder` aggregate.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument, warn};

use maquila_auth::{
    ActorContext, AuthzError, Principal, RoleDirectory, authorize_role, resolve_principal,
};
use maquila_companies::Company;
use maquila_core::{AggregateId, TenantId};
use maquila_events::{EventBus, EventEnvelope};
use maquila_orders::{
    AdvanceOrder, ClientId, CoffeeGrade, DeliveryMethod, Kilograms, MaquilaOrder, MaquilaOrderId,
    OrderCommand, OrderDetails, OrderStatus, ProductionReport, RegisterOrder, RoastingReport,
    Stage, StageRecord, StageReport,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::notifications::{Notifier, OrderNotification};
use crate::numbering::OrderNumberAllocator;

pub const ORDER_AGGREGATE_TYPE: &str = "maquila.order";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The target is not the immediate successor of the current status, or
    /// the order moved on while the request was in flight.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown order, or an order of another company.
    #[error("order not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl From<DispatchError> for LifecycleError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::InvalidTransition(msg) => LifecycleError::InvalidTransition(msg),
            DispatchError::Concurrency(_) => LifecycleError::InvalidTransition(
                "order changed concurrently; current state no longer matches".to_string(),
            ),
            DispatchError::Unauthorized(msg) => LifecycleError::Unauthorized(msg),
            DispatchError::NotFound => LifecycleError::NotFound,
            DispatchError::Validation(msg)
            | DispatchError::InvariantViolation(msg)
            | DispatchError::Conflict(msg) => LifecycleError::Validation(msg),
            other => LifecycleError::Infrastructure(other.to_string()),
        }
    }
}

impl From<AuthzError> for LifecycleError {
    fn from(value: AuthzError) -> Self {
        LifecycleError::Unauthorized(value.to_string())
    }
}

/// Intake data for a new order. The order number is assigned on registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub client_id: ClientId,
    pub quantity: Kilograms,
    pub coffee_grade: CoffeeGrade,
    pub unit_price: u64,
    pub packaging_type: String,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: Option<String>,
    pub committed_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
}

pub struct OrderLifecycleController<S, B, D, N> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: D,
    notifier: N,
    numbers: OrderNumberAllocator,
}

impl<S, B, D, N> OrderLifecycleController<S, B, D, N>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    D: RoleDirectory,
    N: Notifier,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        directory: D,
        notifier: N,
        numbers: OrderNumberAllocator,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            notifier,
            numbers,
        }
    }

    /// Create an order in `Registered`. Requires the registration role.
    #[instrument(
        skip(self, new_order),
        fields(company_id = %ctx.company_id, principal_id = %ctx.principal_id)
    )]
    pub fn register(
        &self,
        ctx: &ActorContext,
        new_order: NewOrder,
    ) -> Result<MaquilaOrder, LifecycleError> {
        let principal = self.resolve(ctx)?;
        let company = self.active_company(ctx.company_id)?;

        // Checked here as well so rejected actors do not consume order numbers.
        if let Err(err) = authorize_role(&principal, Stage::Registration.required_role()) {
            warn!(role = %principal.role(), "order registration rejected");
            return Err(err.into());
        }

        let occurred_at = Utc::now();
        let order_number = self
            .numbers
            .next(ctx.company_id, company.nit(), occurred_at.date_naive())
            .map_err(|e| LifecycleError::Infrastructure(e.to_string()))?;

        let order_id = MaquilaOrderId::new(AggregateId::new());
        let command = OrderCommand::RegisterOrder(RegisterOrder {
            tenant_id: ctx.company_id,
            order_id,
            registered_by: ctx.principal_id,
            actor_role: principal.role(),
            details: OrderDetails {
                client_id: new_order.client_id,
                order_number,
                quantity: new_order.quantity,
                coffee_grade: new_order.coffee_grade,
                unit_price: new_order.unit_price,
                packaging_type: new_order.packaging_type,
                delivery_method: new_order.delivery_method,
                delivery_address: new_order.delivery_address,
                committed_date: new_order.committed_date,
                notes: new_order.notes,
            },
            occurred_at,
        });

        let dispatched = self
            .dispatcher
            .dispatch(ctx.company_id, order_id.0, ORDER_AGGREGATE_TYPE, command, |_, id| {
                MaquilaOrder::empty(MaquilaOrderId::new(id))
            })
            .inspect_err(|err| warn!(%order_id, error = %err, "order registration rejected"))?;

        let order = dispatched.aggregate;
        info!(
            %order_id,
            order_number = %order_number_of(&order),
            "order registered"
        );
        self.notify(&order);
        Ok(order)
    }

    /// Move an order to `target`, which must be the immediate successor of
    /// its current status. Returns the new status.
    #[instrument(
        skip(self),
        fields(company_id = %ctx.company_id, principal_id = %ctx.principal_id)
    )]
    pub fn advance(
        &self,
        ctx: &ActorContext,
        order_id: MaquilaOrderId,
        target: OrderStatus,
    ) -> Result<OrderStatus, LifecycleError> {
        self.transition(ctx, order_id, target, None)
    }

    /// `InRoasting -> RoastingComplete`, recording the roasting process data.
    #[instrument(
        skip(self, report),
        fields(company_id = %ctx.company_id, principal_id = %ctx.principal_id)
    )]
    pub fn complete_roasting(
        &self,
        ctx: &ActorContext,
        order_id: MaquilaOrderId,
        report: RoastingReport,
    ) -> Result<OrderStatus, LifecycleError> {
        self.transition(
            ctx,
            order_id,
            OrderStatus::RoastingComplete,
            Some(StageReport::Roasting(report)),
        )
    }

    /// `InProduction -> ReadyToInvoice`, recording the production process data.
    #[instrument(
        skip(self, report),
        fields(company_id = %ctx.company_id, principal_id = %ctx.principal_id)
    )]
    pub fn complete_production(
        &self,
        ctx: &ActorContext,
        order_id: MaquilaOrderId,
        report: ProductionReport,
    ) -> Result<OrderStatus, LifecycleError> {
        self.transition(
            ctx,
            order_id,
            OrderStatus::ReadyToInvoice,
            Some(StageReport::Production(report)),
        )
    }

    fn transition(
        &self,
        ctx: &ActorContext,
        order_id: MaquilaOrderId,
        target: OrderStatus,
        report: Option<StageReport>,
    ) -> Result<OrderStatus, LifecycleError> {
        let principal = self.resolve(ctx)?;
        self.active_company(ctx.company_id)?;

        let with_report = report.is_some();
        let command = OrderCommand::AdvanceOrder(AdvanceOrder {
            tenant_id: ctx.company_id,
            order_id,
            performed_by: ctx.principal_id,
            actor_role: principal.role(),
            target,
            report,
            occurred_at: Utc::now(),
        });

        let dispatched = self
            .dispatcher
            .dispatch(ctx.company_id, order_id.0, ORDER_AGGREGATE_TYPE, command, |_, id| {
                MaquilaOrder::empty(MaquilaOrderId::new(id))
            })
            .map_err(LifecycleError::from)
            .inspect_err(|err| {
                warn!(
                    %order_id,
                    to = %target,
                    role = %principal.role(),
                    error = %err,
                    "order transition rejected"
                )
            })?;

        let order = dispatched.aggregate;
        let from = order
            .history()
            .iter()
            .rev()
            .nth(1)
            .map(|r| r.status.to_string())
            .unwrap_or_default();
        info!(
            %order_id,
            from = %from,
            to = %order.status(),
            role = %principal.role(),
            with_report,
            "order advanced"
        );
        self.notify(&order);
        Ok(order.status())
    }

    /// Current status of an order visible to the actor's company.
    #[instrument(
        skip(self),
        fields(company_id = %ctx.company_id, principal_id = %ctx.principal_id)
    )]
    pub fn current_state(
        &self,
        ctx: &ActorContext,
        order_id: MaquilaOrderId,
    ) -> Result<OrderStatus, LifecycleError> {
        self.order(ctx, order_id).map(|order| order.status())
    }

    /// Full order state, including details and transition history.
    pub fn order(
        &self,
        ctx: &ActorContext,
        order_id: MaquilaOrderId,
    ) -> Result<MaquilaOrder, LifecycleError> {
        self.resolve(ctx)?;

        let order: MaquilaOrder = self
            .dispatcher
            .load(ctx.company_id, order_id.0, |_, id| {
                MaquilaOrder::empty(MaquilaOrderId::new(id))
            })?;

        if !order.exists() || order.tenant_id() != Some(ctx.company_id) {
            return Err(LifecycleError::NotFound);
        }
        Ok(order)
    }

    /// One record per status entered, oldest first.
    pub fn history(
        &self,
        ctx: &ActorContext,
        order_id: MaquilaOrderId,
    ) -> Result<Vec<StageRecord>, LifecycleError> {
        self.order(ctx, order_id).map(|order| order.history().to_vec())
    }

    fn resolve(&self, ctx: &ActorContext) -> Result<Principal, LifecycleError> {
        resolve_principal(&self.directory, ctx).map_err(|err| {
            warn!(error = %err, "actor could not be resolved");
            LifecycleError::from(err)
        })
    }

    fn active_company(&self, company_id: TenantId) -> Result<Company, LifecycleError> {
        let company: Company = self
            .dispatcher
            .load(company_id, company_id.company_aggregate_id(), |t, _| {
                Company::empty(t)
            })?;

        if !company.is_active() {
            warn!(%company_id, status = ?company.status(), "company is not active");
            return Err(LifecycleError::Unauthorized(format!(
                "company {company_id} is not active"
            )));
        }
        Ok(company)
    }

    fn notify(&self, order: &MaquilaOrder) {
        let Some(notification) = OrderNotification::for_order(order, Utc::now()) else {
            return;
        };
        if let Err(err) = self.notifier.notify(&notification) {
            warn!(
                order_id = %notification.order_id,
                kind = ?notification.kind,
                error = %err,
                "notification failed"
            );
        }
    }
}

fn order_number_of(order: &MaquilaOrder) -> String {
    order
        .details()
        .map(|d| d.order_number.to_string())
        .unwrap_or_default()
}

impl<S, B, D, N> core::fmt::Debug for OrderLifecycleController<S, B, D, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OrderLifecycleController")
            .field("order_prefix", &self.numbers.prefix())
            .finish_non_exhaustive()
    }
}
