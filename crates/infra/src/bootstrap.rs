//! In-memory runtime wiring: store, bus, directory, services, projections
//! and their workers.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use maquila_auth::InMemoryRoleDirectory;
use maquila_core::TenantId;
use maquila_events::{EventEnvelope, InMemoryEventBus};
use maquila_orders::MaquilaOrderId;

use crate::command_dispatcher::CommandDispatcher;
use crate::companies::CompanyService;
use crate::config::MaquilaConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::lifecycle::OrderLifecycleController;
use crate::notifications::{NoopNotifier, Notifier, TracingNotifier};
use crate::numbering::OrderNumberAllocator;
use crate::projections::{ActivityEntry, ActivityLogProjection, OrderSummary, OrdersProjection};
use crate::read_model::InMemoryTenantStore;
use crate::workers::{ProjectionWorker, WorkerHandle};

pub type InMemoryStore = Arc<InMemoryEventStore>;
pub type InMemoryBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type InMemoryDispatcher = CommandDispatcher<InMemoryStore, InMemoryBus>;
pub type InMemoryLifecycle = OrderLifecycleController<
    InMemoryStore,
    InMemoryBus,
    Arc<InMemoryRoleDirectory>,
    Arc<dyn Notifier>,
>;
pub type InMemoryCompanies = CompanyService<InMemoryStore, InMemoryBus>;
pub type OrdersReadModel = OrdersProjection<Arc<InMemoryTenantStore<MaquilaOrderId, OrderSummary>>>;
pub type ActivityLog = ActivityLogProjection<Arc<InMemoryTenantStore<Uuid, ActivityEntry>>>;

pub struct InMemoryRuntime {
    pub config: MaquilaConfig,
    pub dispatcher: Arc<InMemoryDispatcher>,
    pub directory: Arc<InMemoryRoleDirectory>,
    pub lifecycle: InMemoryLifecycle,
    pub companies: InMemoryCompanies,
    pub orders: Arc<OrdersReadModel>,
    pub activity: Arc<ActivityLog>,
    workers: Vec<WorkerHandle>,
}

impl InMemoryRuntime {
    /// Wire the runtime with an explicit notifier. Does not touch the global
    /// tracing subscriber.
    pub fn build(config: MaquilaConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let store: InMemoryStore = Arc::new(InMemoryEventStore::new());
        let bus: InMemoryBus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus.clone()));
        let directory = Arc::new(InMemoryRoleDirectory::new());

        let orders: Arc<OrdersReadModel> =
            Arc::new(OrdersProjection::new(Arc::new(InMemoryTenantStore::new())));
        let activity: Arc<ActivityLog> =
            Arc::new(ActivityLogProjection::new(Arc::new(InMemoryTenantStore::new())));

        let mut workers = Vec::with_capacity(2);
        {
            let orders = orders.clone();
            workers.push(
                ProjectionWorker::spawn(
                    "maquila.projection.orders",
                    &bus,
                    None,
                    move |env: EventEnvelope<JsonValue>| orders.apply_envelope(&env),
                )
                .context("failed to start orders projection worker")?,
            );
        }
        {
            let activity = activity.clone();
            workers.push(
                ProjectionWorker::spawn(
                    "maquila.projection.activity",
                    &bus,
                    None,
                    move |env: EventEnvelope<JsonValue>| activity.apply_envelope(&env),
                )
                .context("failed to start activity log worker")?,
            );
        }

        let lifecycle = OrderLifecycleController::new(
            dispatcher.clone(),
            directory.clone(),
            notifier,
            OrderNumberAllocator::new(config.order_prefix.clone()),
        );
        let companies = CompanyService::new(dispatcher.clone(), directory.clone());

        Ok(Self {
            config,
            dispatcher,
            directory,
            lifecycle,
            companies,
            orders,
            activity,
            workers,
        })
    }

    /// Replay one company's events into fresh read models.
    pub fn rebuild_read_models(&self, tenant_id: TenantId) -> anyhow::Result<()> {
        let envelopes: Vec<EventEnvelope<JsonValue>> = self
            .dispatcher
            .store()
            .load_tenant(tenant_id)
            .context("failed to load tenant events")?
            .iter()
            .map(|e| e.to_envelope())
            .collect();

        self.orders
            .rebuild_from_scratch(envelopes.clone())
            .context("orders read model rebuild failed")?;
        self.activity
            .rebuild_from_scratch(envelopes)
            .context("activity log rebuild failed")?;

        info!(%tenant_id, "read models rebuilt");
        Ok(())
    }

    /// Stop the projection workers and wait for them to exit.
    pub fn shutdown(mut self) {
        for worker in self.workers.drain(..) {
            worker.shutdown();
        }
    }
}

impl core::fmt::Debug for InMemoryRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryRuntime")
            .field("config", &self.config)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Initialize observability from `config` and wire the in-memory runtime.
pub fn bootstrap(config: &MaquilaConfig) -> anyhow::Result<InMemoryRuntime> {
    maquila_observability::init_with(&config.log_filter, config.log_format);

    let notifier: Arc<dyn Notifier> = if config.notifications_enabled {
        Arc::new(TracingNotifier)
    } else {
        Arc::new(NoopNotifier)
    };

    let runtime = InMemoryRuntime::build(config.clone(), notifier)?;
    info!(
        order_prefix = %config.order_prefix,
        notifications = config.notifications_enabled,
        "maquila runtime ready"
    );
    Ok(runtime)
}

/// [`bootstrap`] with configuration read from `MAQUILA_*` variables.
pub fn bootstrap_from_env() -> anyhow::Result<InMemoryRuntime> {
    let config = MaquilaConfig::from_env().context("invalid MAQUILA_* configuration")?;
    bootstrap(&config)
}
