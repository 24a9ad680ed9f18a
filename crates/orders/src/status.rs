use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// The variants are declared in lifecycle order; an order only ever moves to
/// the immediate successor of its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Registered,
    InRoasting,
    RoastingComplete,
    InProduction,
    ReadyToInvoice,
    Invoiced,
    Delivered,
}

impl OrderStatus {
    /// The fixed lifecycle path, initial to terminal.
    pub const SEQUENCE: [OrderStatus; 7] = [
        OrderStatus::Registered,
        OrderStatus::InRoasting,
        OrderStatus::RoastingComplete,
        OrderStatus::InProduction,
        OrderStatus::ReadyToInvoice,
        OrderStatus::Invoiced,
        OrderStatus::Delivered,
    ];

    /// Zero-based position in [`OrderStatus::SEQUENCE`].
    pub fn position(self) -> usize {
        self as usize
    }

    pub fn successor(self) -> Option<OrderStatus> {
        Self::SEQUENCE.get(self.position() + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self.successor().is_none()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Registered => "registered",
            OrderStatus::InRoasting => "in_roasting",
            OrderStatus::RoastingComplete => "roasting_complete",
            OrderStatus::InProduction => "in_production",
            OrderStatus::ReadyToInvoice => "ready_to_invoice",
            OrderStatus::Invoiced => "invoiced",
            OrderStatus::Delivered => "delivered",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
