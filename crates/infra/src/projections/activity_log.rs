//! Audit trail of order activity, one entry per registration and transition.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use maquila_auth::PrincipalId;
use maquila_core::TenantId;
use maquila_events::EventEnvelope;
use maquila_orders::{MaquilaOrderId, OrderEvent, OrderNumber, OrderStatus, StageReport};

use super::{ProjectionError, StreamCursors};
use crate::lifecycle::ORDER_AGGREGATE_TYPE;
use crate::read_model::TenantStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityAction {
    OrderRegistered,
    StatusChanged { from: OrderStatus, to: OrderStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Id of the event this entry was built from.
    pub entry_id: Uuid,
    pub tenant_id: TenantId,
    pub order_id: MaquilaOrderId,
    pub sequence_number: u64,
    pub actor: PrincipalId,
    pub action: ActivityAction,
    pub description: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ActivityLogProjection<S>
where
    S: TenantStore<Uuid, ActivityEntry>,
{
    store: S,
    /// Parked events keep the id of the envelope they arrived in.
    cursors: StreamCursors<(Uuid, OrderEvent)>,
    order_numbers: RwLock<HashMap<(TenantId, MaquilaOrderId), OrderNumber>>,
}

impl<S> ActivityLogProjection<S>
where
    S: TenantStore<Uuid, ActivityEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
            order_numbers: RwLock::new(HashMap::new()),
        }
    }

    /// Company activity, newest first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ActivityEntry> {
        let mut entries = self.store.list(tenant_id);
        entries.sort_by(|a, b| {
            b.at.cmp(&a.at)
                .then_with(|| b.sequence_number.cmp(&a.sequence_number))
        });
        entries
    }

    pub fn recent(&self, tenant_id: TenantId, limit: usize) -> Vec<ActivityEntry> {
        let mut entries = self.list(tenant_id);
        entries.truncate(limit);
        entries
    }

    /// One order's trail, newest first.
    pub fn for_order(&self, tenant_id: TenantId, order_id: MaquilaOrderId) -> Vec<ActivityEntry> {
        self.list(tenant_id)
            .into_iter()
            .filter(|e| e.order_id == order_id)
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if !envelope.is_from(ORDER_AGGREGATE_TYPE) {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();

        let ev: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if ev.tenant_id() != tenant_id || ev.order_id().0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event does not belong to the envelope's stream".to_string(),
            ));
        }

        let parked = (envelope.event_id(), ev);
        if !self
            .cursors
            .offer(tenant_id, aggregate_id, envelope.sequence_number(), parked)?
        {
            return Ok(());
        }

        while let Some((seq, (event_id, next))) = self.cursors.next_ready(tenant_id, aggregate_id) {
            let entry = self.entry_for(tenant_id, event_id, seq, next);
            self.store.upsert(tenant_id, entry.entry_id, entry);
            self.cursors.advance(tenant_id, aggregate_id, seq);
        }
        Ok(())
    }

    fn entry_for(
        &self,
        tenant_id: TenantId,
        entry_id: Uuid,
        seq: u64,
        ev: OrderEvent,
    ) -> ActivityEntry {
        match ev {
            OrderEvent::OrderRegistered(e) => {
                let description = format!(
                    "Order {} registered: {} {:?}, committed for {}",
                    e.details.order_number,
                    e.details.quantity,
                    e.details.coffee_grade,
                    e.details.committed_date
                );
                if let Ok(mut numbers) = self.order_numbers.write() {
                    numbers.insert((tenant_id, e.order_id), e.details.order_number);
                }
                ActivityEntry {
                    entry_id,
                    tenant_id,
                    order_id: e.order_id,
                    sequence_number: seq,
                    actor: e.registered_by,
                    action: ActivityAction::OrderRegistered,
                    description,
                    at: e.occurred_at,
                }
            }
            OrderEvent::OrderAdvanced(e) => {
                let mut description = format!(
                    "Order {} moved from {} to {}",
                    self.label(tenant_id, e.order_id),
                    e.from,
                    e.to
                );
                match &e.report {
                    Some(StageReport::Roasting(r)) => {
                        if let Some(y) = r.yield_percent() {
                            description.push_str(&format!(" (yield {y}, {:?})", r.final_quality));
                        }
                    }
                    Some(StageReport::Production(p)) => {
                        description.push_str(&format!(
                            " ({} units, {})",
                            p.units_produced, p.final_weight
                        ));
                    }
                    None => {}
                }
                ActivityEntry {
                    entry_id,
                    tenant_id,
                    order_id: e.order_id,
                    sequence_number: seq,
                    actor: e.performed_by,
                    action: ActivityAction::StatusChanged {
                        from: e.from,
                        to: e.to,
                    },
                    description,
                    at: e.occurred_at,
                }
            }
        }
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants: Vec<TenantId> = envs.iter().map(|e| e.tenant_id()).collect();
        tenants.sort_by_key(|t| *t.as_uuid());
        tenants.dedup();
        for t in tenants {
            self.store.clear_tenant(t);
            self.cursors.clear_tenant(t);
            if let Ok(mut numbers) = self.order_numbers.write() {
                numbers.retain(|(tenant, _), _| *tenant != t);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid(),
                *e.aggregate_id().as_uuid(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }

    fn label(&self, tenant_id: TenantId, order_id: MaquilaOrderId) -> String {
        self.order_numbers
            .read()
            .ok()
            .and_then(|n| n.get(&(tenant_id, order_id)).map(|num| num.to_string()))
            .unwrap_or_else(|| order_id.to_string())
    }
}
