//! Read model builders.
//!
//! Projections consume committed event envelopes from the bus. They are
//! rebuildable from the event store, partitioned by company, and idempotent
//! under at-least-once, unordered delivery (see [`cursor::StreamCursors`]).

pub mod activity_log;
pub mod cursor;
pub mod orders;

use thiserror::Error;

pub use activity_log::{ActivityAction, ActivityEntry, ActivityLogProjection};
pub use cursor::StreamCursors;
pub use orders::{OrderSummary, OrdersProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection state lock poisoned")]
    Poisoned,
}
