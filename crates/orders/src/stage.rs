//! Stage authorization table.
//!
//! Each lifecycle transition belongs to one stage, and each stage is owned by
//! exactly one role. Authorization is a lookup in this table, checked before
//! every transition.

use serde::{Deserialize, Serialize};

use maquila_auth::Role;

use crate::OrderStatus;

/// A unit of work in the maquila pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Registration,
    Roasting,
    Production,
    Invoicing,
    Delivery,
}

impl Stage {
    pub fn required_role(self) -> Role {
        match self {
            Stage::Registration => Role::Registration,
            Stage::Roasting => Role::Roasting,
            Stage::Production => Role::Production,
            Stage::Invoicing => Role::Invoicing,
            Stage::Delivery => Role::Delivery,
        }
    }
}

/// One legal edge of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub stage: Stage,
}

impl TransitionRule {
    pub fn required_role(&self) -> Role {
        self.stage.required_role()
    }
}

/// Every legal transition. Creation into `Registered` is the
/// [`Stage::Registration`] stage and is not an edge.
pub static TRANSITION_TABLE: [TransitionRule; 6] = [
    TransitionRule {
        from: OrderStatus::Registered,
        to: OrderStatus::InRoasting,
        stage: Stage::Roasting,
    },
    TransitionRule {
        from: OrderStatus::InRoasting,
        to: OrderStatus::RoastingComplete,
        stage: Stage::Roasting,
    },
    TransitionRule {
        from: OrderStatus::RoastingComplete,
        to: OrderStatus::InProduction,
        stage: Stage::Production,
    },
    TransitionRule {
        from: OrderStatus::InProduction,
        to: OrderStatus::ReadyToInvoice,
        stage: Stage::Production,
    },
    TransitionRule {
        from: OrderStatus::ReadyToInvoice,
        to: OrderStatus::Invoiced,
        stage: Stage::Invoicing,
    },
    TransitionRule {
        from: OrderStatus::Invoiced,
        to: OrderStatus::Delivered,
        stage: Stage::Delivery,
    },
];

/// The rule for `from -> to`, if that edge exists.
pub fn rule_for(from: OrderStatus, to: OrderStatus) -> Option<&'static TransitionRule> {
    TRANSITION_TABLE
        .iter()
        .find(|rule| rule.from == from && rule.to == to)
}

/// The only rule leaving `from` (`None` for the terminal status).
pub fn next_rule(from: OrderStatus) -> Option<&'static TransitionRule> {
    TRANSITION_TABLE.iter().find(|rule| rule.from == from)
}
