use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use maquila_auth::Role;
use maquila_core::TenantId;
use maquila_events::EventEnvelope;
use maquila_orders::{
    ClientId, CoffeeGrade, DeliveryMethod, GrainQuality, Kilograms, MaquilaOrderId, OrderEvent,
    OrderNumber, OrderStatus, Percentage, StageReport, next_rule,
};

use super::{ProjectionError, StreamCursors};
use crate::lifecycle::ORDER_AGGREGATE_TYPE;
use crate::read_model::TenantStore;

/// Per-company order listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: MaquilaOrderId,
    pub order_number: OrderNumber,
    pub client_id: ClientId,
    pub quantity: Kilograms,
    pub coffee_grade: CoffeeGrade,
    pub delivery_method: DeliveryMethod,
    pub committed_date: NaiveDate,
    pub status: OrderStatus,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Filled in when roasting and production report their process data.
    #[serde(default)]
    pub roasting_yield: Option<Percentage>,
    #[serde(default)]
    pub grain_quality: Option<GrainQuality>,
    #[serde(default)]
    pub hulling_reduction: Option<Percentage>,
    #[serde(default)]
    pub final_weight: Option<Kilograms>,
    #[serde(default)]
    pub units_produced: Option<u32>,
}

impl OrderSummary {
    /// Role that owns the next transition (`None` once delivered).
    pub fn next_owner(&self) -> Option<Role> {
        next_rule(self.status).map(|rule| rule.required_role())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.committed_date < today
    }
}

/// Orders read model: summaries plus role work queues.
#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: TenantStore<MaquilaOrderId, OrderSummary>,
{
    store: S,
    cursors: StreamCursors<OrderEvent>,
}

impl<S> OrdersProjection<S>
where
    S: TenantStore<MaquilaOrderId, OrderSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, order_id: &MaquilaOrderId) -> Option<OrderSummary> {
        self.store.get(tenant_id, order_id)
    }

    /// All orders of a company, earliest committed date first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<OrderSummary> {
        let mut orders = self.store.list(tenant_id);
        orders.sort_by(|a, b| {
            a.committed_date
                .cmp(&b.committed_date)
                .then_with(|| a.order_number.as_str().cmp(b.order_number.as_str()))
        });
        orders
    }

    pub fn by_status(&self, tenant_id: TenantId, status: OrderStatus) -> Vec<OrderSummary> {
        self.list(tenant_id)
            .into_iter()
            .filter(|o| o.status == status)
            .collect()
    }

    /// Orders waiting on `role` to perform their next transition.
    pub fn work_queue(&self, tenant_id: TenantId, role: Role) -> Vec<OrderSummary> {
        self.list(tenant_id)
            .into_iter()
            .filter(|o| o.next_owner() == Some(role))
            .collect()
    }

    /// Undelivered orders whose committed date has passed.
    pub fn overdue(&self, tenant_id: TenantId, today: NaiveDate) -> Vec<OrderSummary> {
        self.list(tenant_id)
            .into_iter()
            .filter(|o| !o.status.is_terminal() && o.is_overdue(today))
            .collect()
    }

    /// Apply one delivered envelope.
    ///
    /// Redeliveries are ignored. An event that arrives ahead of its
    /// predecessors is held back and applied once the gap is filled.
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

        if ev.tenant_id() != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if ev.order_id().0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if !self
            .cursors
            .offer(tenant_id, aggregate_id, envelope.sequence_number(), ev)?
        {
            return Ok(());
        }

        while let Some((seq, next)) = self.cursors.next_ready(tenant_id, aggregate_id) {
            self.apply_in_order(tenant_id, next);
            self.cursors.advance(tenant_id, aggregate_id, seq);
        }
        Ok(())
    }

    fn apply_in_order(&self, tenant_id: TenantId, ev: OrderEvent) {
        match ev {
            OrderEvent::OrderRegistered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.order_id,
                    OrderSummary {
                        order_id: e.order_id,
                        order_number: e.details.order_number,
                        client_id: e.details.client_id,
                        quantity: e.details.quantity,
                        coffee_grade: e.details.coffee_grade,
                        delivery_method: e.details.delivery_method,
                        committed_date: e.details.committed_date,
                        status: OrderStatus::Registered,
                        registered_at: e.occurred_at,
                        updated_at: e.occurred_at,
                        roasting_yield: None,
                        grain_quality: None,
                        hulling_reduction: None,
                        final_weight: None,
                        units_produced: None,
                    },
                );
            }
            OrderEvent::OrderAdvanced(e) => {
                // Registration is always the first event of a stream.
                let Some(mut summary) = self.store.get(tenant_id, &e.order_id) else {
                    return;
                };
                summary.status = e.to;
                summary.updated_at = e.occurred_at;
                match e.report {
                    Some(StageReport::Roasting(r)) => {
                        summary.roasting_yield = r.yield_percent();
                        summary.grain_quality = Some(r.final_quality);
                        if summary.coffee_grade == CoffeeGrade::Cps {
                            summary.hulling_reduction = r.hulling_reduction(summary.quantity);
                        }
                    }
                    Some(StageReport::Production(p)) => {
                        summary.final_weight = Some(p.final_weight);
                        summary.units_produced = Some(p.units_produced);
                    }
                    None => {}
                }
                self.store.upsert(tenant_id, e.order_id, summary);
            }
        }
    }

    /// Drop the affected companies' rows and replay `envelopes` in stream order.
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
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use uuid::Uuid;

    use maquila_auth::PrincipalId;
    use maquila_core::AggregateId;
    use maquila_orders::{
        OrderAdvanced, OrderDetails, OrderRegistered, RoastLevel, RoastingEquipment,
        RoastingReport,
    };

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    type Projection = OrdersProjection<Arc<InMemoryTenantStore<MaquilaOrderId, OrderSummary>>>;

    fn projection() -> Projection {
        OrdersProjection::new(Arc::new(InMemoryTenantStore::new()))
    }

    fn envelope(tenant_id: TenantId, order_id: MaquilaOrderId, seq: u64, ev: &OrderEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(ev).unwrap(),
        )
    }

    fn registered(tenant_id: TenantId, order_id: MaquilaOrderId, committed: NaiveDate) -> OrderEvent {
        OrderEvent::OrderRegistered(OrderRegistered {
            tenant_id,
            order_id,
            registered_by: PrincipalId::new(),
            details: OrderDetails {
                client_id: ClientId::new(AggregateId::new()),
                order_number: OrderNumber::new(format!("MAQ-1-20260101-{}", order_id)),
                quantity: Kilograms::from_whole(100),
                coffee_grade: CoffeeGrade::Cps,
                unit_price: 9_000,
                packaging_type: "bulk sack".to_string(),
                delivery_method: DeliveryMethod::Pickup,
                delivery_address: None,
                committed_date: committed,
                notes: String::new(),
            },
            occurred_at: Utc::now(),
        })
    }

    fn advanced(tenant_id: TenantId, order_id: MaquilaOrderId, from: OrderStatus) -> OrderEvent {
        let rule = next_rule(from).unwrap();
        OrderEvent::OrderAdvanced(OrderAdvanced {
            tenant_id,
            order_id,
            from,
            to: rule.to,
            stage: rule.stage,
            performed_by: PrincipalId::new(),
            report: None,
            occurred_at: Utc::now(),
        })
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn work_queue_follows_next_stage_owner() {
        let p = projection();
        let t = TenantId::new();
        let (a, b) = (
            MaquilaOrderId::new(AggregateId::new()),
            MaquilaOrderId::new(AggregateId::new()),
        );

        p.apply_envelope(&envelope(t, a, 1, &registered(t, a, today()))).unwrap();
        p.apply_envelope(&envelope(t, b, 1, &registered(t, b, today()))).unwrap();
        p.apply_envelope(&envelope(t, b, 2, &advanced(t, b, OrderStatus::Registered)))
            .unwrap();

        // b is InRoasting, still owned by the roasting stage
        assert_eq!(p.work_queue(t, Role::Roasting).len(), 2);
        assert!(p.work_queue(t, Role::Production).is_empty());
        assert!(p.work_queue(t, Role::CompanyAdmin).is_empty());
        assert_eq!(p.by_status(t, OrderStatus::InRoasting)[0].order_id, b);
    }

    #[test]
    fn duplicate_delivery_is_ignored() {
        let p = projection();
        let t = TenantId::new();
        let id = MaquilaOrderId::new(AggregateId::new());
        let reg = envelope(t, id, 1, &registered(t, id, today()));
        let adv = envelope(t, id, 2, &advanced(t, id, OrderStatus::Registered));

        p.apply_envelope(&reg).unwrap();
        p.apply_envelope(&adv).unwrap();
        p.apply_envelope(&reg).unwrap();

        assert_eq!(p.get(t, &id).unwrap().status, OrderStatus::InRoasting);
    }

    #[test]
    fn tenant_mismatch_between_envelope_and_payload_is_rejected() {
        let p = projection();
        let t = TenantId::new();
        let id = MaquilaOrderId::new(AggregateId::new());
        let env = envelope(TenantId::new(), id, 1, &registered(t, id, today()));

        assert!(matches!(
            p.apply_envelope(&env),
            Err(ProjectionError::TenantIsolation(_))
        ));
    }

    #[test]
    fn overdue_excludes_delivered_orders() {
        let p = projection();
        let t = TenantId::new();
        let late = MaquilaOrderId::new(AggregateId::new());
        let on_time = MaquilaOrderId::new(AggregateId::new());

        p.apply_envelope(&envelope(t, late, 1, &registered(t, late, today() - Duration::days(2))))
            .unwrap();
        p.apply_envelope(&envelope(t, on_time, 1, &registered(t, on_time, today() + Duration::days(2))))
            .unwrap();

        let overdue = p.overdue(t, today());
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].order_id, late);
    }

    #[test]
    fn rebuild_replays_out_of_order_input() {
        let p = projection();
        let t = TenantId::new();
        let id = MaquilaOrderId::new(AggregateId::new());

        let envs = vec![
            envelope(t, id, 2, &advanced(t, id, OrderStatus::Registered)),
            envelope(t, id, 1, &registered(t, id, today())),
        ];
        p.rebuild_from_scratch(envs).unwrap();

        assert_eq!(p.get(t, &id).unwrap().status, OrderStatus::InRoasting);
        assert!(p.list(TenantId::new()).is_empty());
    }

    #[test]
    fn out_of_order_delivery_waits_for_the_gap() {
        let p = projection();
        let t = TenantId::new();
        let id = MaquilaOrderId::new(AggregateId::new());
        let reg = envelope(t, id, 1, &registered(t, id, today()));
        let roasting = envelope(t, id, 2, &advanced(t, id, OrderStatus::Registered));
        let roasted = envelope(t, id, 3, &advanced(t, id, OrderStatus::InRoasting));
        let producing = envelope(t, id, 4, &advanced(t, id, OrderStatus::RoastingComplete));

        p.apply_envelope(&reg).unwrap();
        p.apply_envelope(&roasted).unwrap();
        assert_eq!(p.get(t, &id).unwrap().status, OrderStatus::Registered);

        p.apply_envelope(&roasting).unwrap();
        assert_eq!(p.get(t, &id).unwrap().status, OrderStatus::RoastingComplete);

        p.apply_envelope(&producing).unwrap();
        assert_eq!(p.get(t, &id).unwrap().status, OrderStatus::InProduction);
    }

    #[test]
    fn advance_delivered_before_registration_is_not_lost() {
        let p = projection();
        let t = TenantId::new();
        let id = MaquilaOrderId::new(AggregateId::new());

        p.apply_envelope(&envelope(t, id, 2, &advanced(t, id, OrderStatus::Registered)))
            .unwrap();
        assert!(p.get(t, &id).is_none());

        p.apply_envelope(&envelope(t, id, 1, &registered(t, id, today())))
            .unwrap();
        assert_eq!(p.get(t, &id).unwrap().status, OrderStatus::InRoasting);
        assert_eq!(p.work_queue(t, Role::Roasting).len(), 1);
    }

    #[test]
    fn roasting_report_fills_yield_and_hulling_columns() {
        let p = projection();
        let t = TenantId::new();
        let id = MaquilaOrderId::new(AggregateId::new());
        let OrderEvent::OrderAdvanced(mut done) = advanced(t, id, OrderStatus::InRoasting) else {
            unreachable!()
        };
        done.report = Some(StageReport::Roasting(RoastingReport {
            equipment: RoastingEquipment::Artisanal50Kg,
            roast_level: RoastLevel::Light,
            received: Kilograms::from_whole(100),
            processed: Kilograms::from_whole(80),
            hulled: Some(Kilograms::from_whole(82)),
            final_quality: GrainQuality::Regular,
            notes: String::new(),
        }));

        p.apply_envelope(&envelope(t, id, 1, &registered(t, id, today()))).unwrap();
        p.apply_envelope(&envelope(t, id, 2, &advanced(t, id, OrderStatus::Registered)))
            .unwrap();
        p.apply_envelope(&envelope(t, id, 3, &OrderEvent::OrderAdvanced(done))).unwrap();

        let summary = p.get(t, &id).unwrap();
        assert_eq!(summary.status, OrderStatus::RoastingComplete);
        assert_eq!(summary.roasting_yield, Some(Percentage::from_basis_points(8_000)));
        assert_eq!(summary.grain_quality, Some(GrainQuality::Regular));
        assert_eq!(summary.hulling_reduction, Some(Percentage::from_basis_points(1_800)));
        assert_eq!(summary.units_produced, None);
    }
}
