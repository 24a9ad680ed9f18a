//! Append-only, tenant-scoped event store.
//!
//! One stream per `(tenant_id, aggregate_id)`; the stream version is the
//! sequence number of its last event.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
