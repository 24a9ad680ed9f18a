//! Infrastructure and application layer: event store, command dispatch, the
//! order lifecycle controller, company administration, read models and the
//! in-memory runtime.

pub mod bootstrap;
pub mod command_dispatcher;
pub mod companies;
pub mod config;
pub mod event_store;
pub mod lifecycle;
pub mod notifications;
pub mod numbering;
pub mod projections;
pub mod read_model;
pub mod workers;

pub use bootstrap::{InMemoryRuntime, bootstrap, bootstrap_from_env};
pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use companies::{COMPANY_AGGREGATE_TYPE, CompanyService, CompanyServiceError};
pub use config::{ConfigError, MaquilaConfig};
pub use lifecycle::{LifecycleError, NewOrder, ORDER_AGGREGATE_TYPE, OrderLifecycleController};
pub use notifications::{
    Audience, InMemoryNotifier, NoopNotifier, NotificationKind, Notifier, NotifyError,
    OrderNotification, TracingNotifier,
};
pub use numbering::{NumberingError, OrderNumberAllocator};
