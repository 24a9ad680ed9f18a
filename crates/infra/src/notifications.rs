//! Order notifications.
//!
//! Every committed status change produces one [`OrderNotification`]. Delivery
//! is fire-and-forget: a [`Notifier`] failure is logged by the caller and
//! never turns a committed transition into an error.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use maquila_core::TenantId;
use maquila_orders::{ClientId, MaquilaOrder, MaquilaOrderId, OrderNumber, OrderStatus};

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "client_id", rename_all = "snake_case")]
pub enum Audience {
    Client(ClientId),
    BillingTeam,
    Operations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RegistrationConfirmation,
    ReadyForBilling,
    InvoiceReady,
    DeliveryConfirmation,
    StatusUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub tenant_id: TenantId,
    pub order_id: MaquilaOrderId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub kind: NotificationKind,
    pub audience: Audience,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl OrderNotification {
    /// Notification for the status `order` is currently in.
    ///
    /// `None` for an order that was never registered.
    pub fn for_order(order: &MaquilaOrder, at: DateTime<Utc>) -> Option<Self> {
        let tenant_id = order.tenant_id()?;
        let details = order.details()?;
        let status = order.status();
        let number = &details.order_number;

        let (kind, audience, message) = match status {
            OrderStatus::Registered => (
                NotificationKind::RegistrationConfirmation,
                Audience::Client(details.client_id),
                format!(
                    "Order {number} received: {}, committed for {}",
                    details.quantity, details.committed_date
                ),
            ),
            OrderStatus::ReadyToInvoice => (
                NotificationKind::ReadyForBilling,
                Audience::BillingTeam,
                format!("Order {number} is packed and ready to invoice"),
            ),
            OrderStatus::Invoiced => (
                NotificationKind::InvoiceReady,
                Audience::Client(details.client_id),
                format!("The invoice for order {number} is ready"),
            ),
            OrderStatus::Delivered => (
                NotificationKind::DeliveryConfirmation,
                Audience::Client(details.client_id),
                format!("Order {number} has been delivered"),
            ),
            other => (
                NotificationKind::StatusUpdate,
                Audience::Operations,
                format!("Order {number} is now {other}"),
            ),
        };

        Some(Self {
            tenant_id,
            order_id: order.id_typed(),
            order_number: number.clone(),
            status,
            kind,
            audience,
            message,
            at,
        })
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification channel.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: &OrderNotification) -> Result<(), NotifyError>;
}

/// Writes notifications to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: &OrderNotification) -> Result<(), NotifyError> {
        info!(
            tenant_id = %n.tenant_id,
            order_id = %n.order_id,
            order_number = %n.order_number,
            status = %n.status,
            kind = ?n.kind,
            audience = ?n.audience,
            "{}",
            n.message
        );
        Ok(())
    }
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &OrderNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Collects notifications in memory for inspection.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<OrderNotification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OrderNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: &OrderNotification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

impl<N> Notifier for std::sync::Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, notification: &OrderNotification) -> Result<(), NotifyError> {
        (**self).notify(notification)
    }
}
