//! Domain events and their distribution mechanics.
//!
//! Events are facts produced by aggregates. They are persisted first (event
//! store, in `maquila-infra`) and then fanned out to consumers through an
//! [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
