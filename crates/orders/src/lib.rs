//! Maquila orders domain module (event-sourced).
//!
//! Business rules for toll-processing orders: registration, and the
//! one-directional lifecycle from `Registered` to `Delivered` where every
//! step is owned by exactly one stage role, plus the process data recorded
//! when roasting and production finish. Pure, deterministic domain logic
//! (no IO, no storage).

pub mod order;
pub mod process;
pub mod stage;
pub mod status;

pub use order::{
    AdvanceOrder, ClientId, CoffeeGrade, DeliveryMethod, Kilograms, MaquilaOrder, MaquilaOrderId,
    OrderAdvanced, OrderCommand, OrderDetails, OrderEvent, OrderNumber, OrderRegistered,
    RegisterOrder, StageRecord,
};
pub use process::{
    GrainQuality, GrindSize, Percentage, ProductionReport, ProductionType, RoastLevel,
    RoastingEquipment, RoastingReport, StageReport,
};
pub use stage::{Stage, TRANSITION_TABLE, TransitionRule, next_rule, rule_for};
pub use status::OrderStatus;
