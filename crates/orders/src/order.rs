use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use maquila_auth::{PrincipalId, Role};
use maquila_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, ValueObject};
use maquila_events::Event;

use crate::process::{Percentage, ProductionReport, RoastingReport, StageReport};
use crate::stage::{Stage, TransitionRule, rule_for};
use crate::OrderStatus;

/// Maquila order identifier (tenant-scoped via `tenant_id` in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaquilaOrderId(pub AggregateId);

impl MaquilaOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MaquilaOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Reference to the coffee producer who owns the beans.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

/// Weight in hundredths of a kilogram.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kilograms(u64);

impl ValueObject for Kilograms {}

impl Kilograms {
    pub fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    pub fn from_whole(kg: u64) -> Self {
        Self(kg.saturating_mul(100))
    }

    pub fn hundredths(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for Kilograms {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02} kg", self.0 / 100, self.0 % 100)
    }
}

/// Human-facing order number: `{prefix}-{NIT}-{YYYYMMDD}-{NNN}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl ValueObject for OrderNumber {}

impl OrderNumber {
    pub fn compose(prefix: &str, nit: &str, date: NaiveDate, sequence: u32) -> Self {
        Self(format!(
            "{prefix}-{nit}-{}-{sequence:03}",
            date.format("%Y%m%d")
        ))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presentation of the received coffee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoffeeGrade {
    /// Dry parchment coffee, still to be hulled.
    Cps,
    Excelso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Pickup,
    HomeDelivery,
    Shipping,
}

impl DeliveryMethod {
    pub fn requires_address(self) -> bool {
        !matches!(self, DeliveryMethod::Pickup)
    }
}

/// Intake data captured when an order is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub client_id: ClientId,
    pub order_number: OrderNumber,
    pub quantity: Kilograms,
    pub coffee_grade: CoffeeGrade,
    /// Price per kilogram in smallest currency unit.
    pub unit_price: u64,
    pub packaging_type: String,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: Option<String>,
    pub committed_date: NaiveDate,
    pub notes: String,
}

/// When an order entered a status, who moved it there, and the process
/// data recorded with that move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub by: PrincipalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<StageReport>,
}

/// Aggregate root: MaquilaOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaquilaOrder {
    id: MaquilaOrderId,
    tenant_id: Option<TenantId>,
    status: OrderStatus,
    details: Option<OrderDetails>,
    history: Vec<StageRecord>,
    version: u64,
    created: bool,
}

impl MaquilaOrder {
    /// Create an empty, not-yet-registered instance for rehydration.
    pub fn empty(id: MaquilaOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            status: OrderStatus::Registered,
            details: None,
            history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MaquilaOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn details(&self) -> Option<&OrderDetails> {
        self.details.as_ref()
    }

    /// One record per status entered, oldest first.
    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    pub fn entered_at(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.record(status).map(|r| r.at)
    }

    pub fn performed_by(&self, status: OrderStatus) -> Option<PrincipalId> {
        self.record(status).map(|r| r.by)
    }

    /// Days left until the committed date (negative once it has passed).
    pub fn days_to_delivery(&self, today: NaiveDate) -> Option<i64> {
        self.details
            .as_ref()
            .map(|d| (d.committed_date - today).num_days())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.days_to_delivery(today).is_some_and(|days| days < 0)
    }

    pub fn roasting_report(&self) -> Option<&RoastingReport> {
        self.history.iter().find_map(|r| match &r.report {
            Some(StageReport::Roasting(report)) => Some(report),
            _ => None,
        })
    }

    pub fn production_report(&self) -> Option<&ProductionReport> {
        self.history.iter().find_map(|r| match &r.report {
            Some(StageReport::Production(report)) => Some(report),
            _ => None,
        })
    }

    /// Weight lost hulling a CPS order into excelso, relative to the
    /// registered quantity.
    pub fn hulling_reduction(&self) -> Option<Percentage> {
        let details = self.details.as_ref()?;
        if details.coffee_grade != CoffeeGrade::Cps {
            return None;
        }
        self.roasting_report()?.hulling_reduction(details.quantity)
    }

    fn record(&self, status: OrderStatus) -> Option<&StageRecord> {
        self.history.iter().find(|r| r.status == status)
    }
}

impl AggregateRoot for MaquilaOrder {
    type Id = MaquilaOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOrder {
    pub tenant_id: TenantId,
    pub order_id: MaquilaOrderId,
    pub registered_by: PrincipalId,
    /// Role the actor holds in `tenant_id`, resolved by the caller.
    pub actor_role: Role,
    pub details: OrderDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOrder {
    pub tenant_id: TenantId,
    pub order_id: MaquilaOrderId,
    pub performed_by: PrincipalId,
    pub actor_role: Role,
    pub target: OrderStatus,
    /// Only accepted when completing roasting or production.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<StageReport>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    RegisterOrder(RegisterOrder),
    AdvanceOrder(AdvanceOrder),
}

/// Event: OrderRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRegistered {
    pub tenant_id: TenantId,
    pub order_id: MaquilaOrderId,
    pub registered_by: PrincipalId,
    pub details: OrderDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderAdvanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAdvanced {
    pub tenant_id: TenantId,
    pub order_id: MaquilaOrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub stage: Stage,
    pub performed_by: PrincipalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<StageReport>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderRegistered(OrderRegistered),
    OrderAdvanced(OrderAdvanced),
}

impl OrderEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            OrderEvent::OrderRegistered(e) => e.tenant_id,
            OrderEvent::OrderAdvanced(e) => e.tenant_id,
        }
    }

    pub fn order_id(&self) -> MaquilaOrderId {
        match self {
            OrderEvent::OrderRegistered(e) => e.order_id,
            OrderEvent::OrderAdvanced(e) => e.order_id,
        }
    }

    /// Status the order is in after this event.
    pub fn resulting_status(&self) -> OrderStatus {
        match self {
            OrderEvent::OrderRegistered(_) => OrderStatus::Registered,
            OrderEvent::OrderAdvanced(e) => e.to,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderRegistered(_) => "maquila.order.registered",
            OrderEvent::OrderAdvanced(e) => match e.to {
                OrderStatus::Registered => "maquila.order.registered",
                OrderStatus::InRoasting => "maquila.order.roasting_started",
                OrderStatus::RoastingComplete => "maquila.order.roasting_completed",
                OrderStatus::InProduction => "maquila.order.production_started",
                OrderStatus::ReadyToInvoice => "maquila.order.production_completed",
                OrderStatus::Invoiced => "maquila.order.invoiced",
                OrderStatus::Delivered => "maquila.order.delivered",
            },
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderRegistered(e) => e.occurred_at,
            OrderEvent::OrderAdvanced(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MaquilaOrder {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderRegistered(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.status = OrderStatus::Registered;
                self.details = Some(e.details.clone());
                self.history.clear();
                self.history.push(StageRecord {
                    status: OrderStatus::Registered,
                    at: e.occurred_at,
                    by: e.registered_by,
                    report: None,
                });
                self.created = true;
            }
            OrderEvent::OrderAdvanced(e) => {
                self.status = e.to;
                self.history.push(StageRecord {
                    status: e.to,
                    at: e.occurred_at,
                    by: e.performed_by,
                    report: e.report.clone(),
                });
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::RegisterOrder(cmd) => self.handle_register(cmd),
            OrderCommand::AdvanceOrder(cmd) => self.handle_advance(cmd),
        }
    }
}

impl MaquilaOrder {
    /// Orders of another company are indistinguishable from missing ones.
    fn ensure_visible(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created || self.tenant_id != Some(tenant_id) {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: MaquilaOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        self.ensure_order_id(cmd.order_id)?;

        let required = Stage::Registration.required_role();
        if cmd.actor_role != required {
            return Err(DomainError::unauthorized(format!(
                "registering orders requires role '{required}', actor has '{}'",
                cmd.actor_role
            )));
        }

        validate_details(&cmd.details, cmd.occurred_at.date_naive())?;

        Ok(vec![OrderEvent::OrderRegistered(OrderRegistered {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            registered_by: cmd.registered_by,
            details: normalized(&cmd.details),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance(&self, cmd: &AdvanceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_visible(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        // Target check comes first: a wrong target fails the same way for every role.
        let rule = rule_for(self.status, cmd.target).ok_or_else(|| {
            let expected = self
                .status
                .successor()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none (terminal)".to_string());
            DomainError::invalid_transition(format!(
                "cannot move from '{}' to '{}' (next legal status: {expected})",
                self.status, cmd.target
            ))
        })?;

        let required = rule.required_role();
        if cmd.actor_role != required {
            return Err(DomainError::unauthorized(format!(
                "'{}' -> '{}' requires role '{required}', actor has '{}'",
                rule.from, rule.to, cmd.actor_role
            )));
        }

        if let Some(report) = &cmd.report {
            self.validate_report(rule, report)?;
        }

        Ok(vec![OrderEvent::OrderAdvanced(OrderAdvanced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            from: rule.from,
            to: rule.to,
            stage: rule.stage,
            performed_by: cmd.performed_by,
            report: cmd.report.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn validate_report(&self, rule: &TransitionRule, report: &StageReport) -> Result<(), DomainError> {
        match (report, rule.to) {
            (StageReport::Roasting(r), OrderStatus::RoastingComplete) => {
                r.validate()?;
                let Some(hulled) = r.hulled else {
                    return Ok(());
                };
                let Some(details) = self.details.as_ref() else {
                    return Err(DomainError::not_found());
                };
                if details.coffee_grade != CoffeeGrade::Cps {
                    return Err(DomainError::validation(
                        "hulled weight only applies to CPS orders",
                    ));
                }
                if hulled > details.quantity {
                    return Err(DomainError::validation(format!(
                        "hulled weight {hulled} exceeds order quantity {}",
                        details.quantity
                    )));
                }
                Ok(())
            }
            (StageReport::Production(p), OrderStatus::ReadyToInvoice) => p.validate(),
            _ => Err(DomainError::validation(format!(
                "no process report is recorded on '{}' -> '{}'",
                rule.from, rule.to
            ))),
        }
    }
}


fn validate_details(details: &OrderDetails, today: NaiveDate) -> Result<(), DomainError> {
    if details.quantity.is_zero() {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if details.unit_price == 0 {
        return Err(DomainError::validation("unit_price must be positive"));
    }
    if details.packaging_type.trim().is_empty() {
        return Err(DomainError::validation("packaging_type is required"));
    }
    if details.order_number.as_str().trim().is_empty() {
        return Err(DomainError::validation("order_number is required"));
    }
    let has_address = details
        .delivery_address
        .as_deref()
        .is_some_and(|a| !a.trim().is_empty());
    if details.delivery_method.requires_address() && !has_address {
        return Err(DomainError::validation(
            "delivery_address is required for home delivery and shipping",
        ));
    }
    if details.committed_date < today {
        return Err(DomainError::validation(
            "committed_date cannot be in the past",
        ));
    }
    Ok(())
}

fn normalized(details: &OrderDetails) -> OrderDetails {
    let mut d = details.clone();
    d.packaging_type = d.packaging_type.trim().to_string();
    d.delivery_address = d
        .delivery_address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{GrainQuality, ProductionType, RoastLevel, RoastingEquipment};
    use chrono::Duration;
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_order_id() -> MaquilaOrderId {
        MaquilaOrderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_details() -> OrderDetails {
        OrderDetails {
            client_id: ClientId::new(AggregateId::new()),
            order_number: OrderNumber::new("MAQ-900123456-20260101-001"),
            quantity: Kilograms::from_whole(250),
            coffee_grade: CoffeeGrade::Excelso,
            unit_price: 1_200_000,
            packaging_type: " 500g valve bag ".to_string(),
            delivery_method: DeliveryMethod::Pickup,
            delivery_address: None,
            committed_date: test_time().date_naive() + Duration::days(10),
            notes: String::new(),
        }
    }

    fn register_cmd(tenant_id: TenantId, order_id: MaquilaOrderId) -> OrderCommand {
        OrderCommand::RegisterOrder(RegisterOrder {
            tenant_id,
            order_id,
            registered_by: PrincipalId::new(),
            actor_role: Role::Registration,
            details: test_details(),
            occurred_at: test_time(),
        })
    }

    fn advance_cmd(
        tenant_id: TenantId,
        order_id: MaquilaOrderId,
        role: Role,
        target: OrderStatus,
    ) -> OrderCommand {
        OrderCommand::AdvanceOrder(AdvanceOrder {
            tenant_id,
            order_id,
            performed_by: PrincipalId::new(),
            actor_role: role,
            target,
            report: None,
            occurred_at: test_time(),
        })
    }

    fn registered_order(tenant_id: TenantId, order_id: MaquilaOrderId) -> MaquilaOrder {
        let mut order = MaquilaOrder::empty(order_id);
        let events = order.handle(&register_cmd(tenant_id, order_id)).unwrap();
        order.apply(&events[0]);
        order
    }

    /// Advance one legal step using the role that owns it.
    fn step(order: &mut MaquilaOrder, tenant_id: TenantId) {
        let rule = crate::next_rule(order.status()).expect("not terminal");
        let events = order
            .handle(&advance_cmd(
                tenant_id,
                order.id_typed(),
                rule.required_role(),
                rule.to,
            ))
            .unwrap();
        order.apply(&events[0]);
    }

    #[test]
    fn register_emits_order_registered_in_registered_status() {
        let tenant_id = test_tenant_id();
        let order_id = test_order_id();
        let order = registered_order(tenant_id, order_id);

        assert_eq!(order.status(), OrderStatus::Registered);
        assert_eq!(order.tenant_id(), Some(tenant_id));
        assert_eq!(order.version(), 1);
        assert!(order.entered_at(OrderStatus::Registered).is_some());
        assert_eq!(order.details().unwrap().packaging_type, "500g valve bag");
    }

    #[test]
    fn only_registration_role_can_register() {
        let tenant_id = test_tenant_id();
        let order_id = test_order_id();
        let cmd = OrderCommand::RegisterOrder(RegisterOrder {
            tenant_id,
            order_id,
            registered_by: PrincipalId::new(),
            actor_role: Role::Roasting,
            details: test_details(),
            occurred_at: test_time(),
        });

        let err = MaquilaOrder::empty(order_id).handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn registration_validates_intake_data() {
        let order_id = test_order_id();
        let cases: Vec<(fn(&mut OrderDetails), &str)> = vec![
            (|d: &mut OrderDetails| d.quantity = Kilograms::from_hundredths(0), "quantity"),
            (|d: &mut OrderDetails| d.unit_price = 0, "unit_price"),
            (|d: &mut OrderDetails| d.packaging_type = "  ".to_string(), "packaging_type"),
            (|d: &mut OrderDetails| d.delivery_method = DeliveryMethod::Shipping, "delivery_address"),
            (
                |d: &mut OrderDetails| d.committed_date = Utc::now().date_naive() - Duration::days(1),
                "committed_date",
            ),
        ];

        for (mutate, field) in cases {
            let mut details = test_details();
            mutate(&mut details);
            let cmd = OrderCommand::RegisterOrder(RegisterOrder {
                tenant_id: test_tenant_id(),
                order_id,
                registered_by: PrincipalId::new(),
                actor_role: Role::Registration,
                details,
                occurred_at: test_time(),
            });
            match MaquilaOrder::empty(order_id).handle(&cmd) {
                Err(DomainError::Validation(msg)) => assert!(msg.contains(field), "{msg}"),
                other => panic!("expected validation error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn registering_twice_conflicts() {
        let tenant_id = test_tenant_id();
        let order_id = test_order_id();
        let order = registered_order(tenant_id, order_id);

        let err = order.handle(&register_cmd(tenant_id, order_id)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn full_lifecycle_reaches_delivered() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());

        while !order.status().is_terminal() {
            step(&mut order, tenant_id);
        }

        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.history().len(), OrderStatus::SEQUENCE.len());
        assert_eq!(order.version(), 7);
    }

    #[test]
    fn advancing_past_delivered_is_invalid() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());
        while !order.status().is_terminal() {
            step(&mut order, tenant_id);
        }

        for role in Role::ALL {
            for target in OrderStatus::SEQUENCE {
                let err = order
                    .handle(&advance_cmd(tenant_id, order.id_typed(), role, target))
                    .unwrap_err();
                assert!(matches!(err, DomainError::InvalidTransition(_)));
            }
        }
    }

    #[test]
    fn skipping_a_status_is_invalid_even_for_registration_role() {
        let tenant_id = test_tenant_id();
        let order = registered_order(tenant_id, test_order_id());

        let err = order
            .handle(&advance_cmd(
                tenant_id,
                order.id_typed(),
                Role::Registration,
                OrderStatus::RoastingComplete,
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn roasting_role_cannot_invoice() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());
        while order.status() != OrderStatus::ReadyToInvoice {
            step(&mut order, tenant_id);
        }

        let err = order
            .handle(&advance_cmd(
                tenant_id,
                order.id_typed(),
                Role::Roasting,
                OrderStatus::Invoiced,
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn order_of_other_tenant_is_not_found() {
        let order = registered_order(test_tenant_id(), test_order_id());

        let err = order
            .handle(&advance_cmd(
                test_tenant_id(),
                order.id_typed(),
                Role::Roasting,
                OrderStatus::InRoasting,
            ))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn unregistered_order_is_not_found() {
        let order_id = test_order_id();
        let err = MaquilaOrder::empty(order_id)
            .handle(&advance_cmd(
                test_tenant_id(),
                order_id,
                Role::Roasting,
                OrderStatus::InRoasting,
            ))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn advance_records_actor_and_timestamp() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());
        let roaster = PrincipalId::new();
        let at = test_time();

        let events = order
            .handle(&OrderCommand::AdvanceOrder(AdvanceOrder {
                tenant_id,
                order_id: order.id_typed(),
                performed_by: roaster,
                actor_role: Role::Roasting,
                target: OrderStatus::InRoasting,
                report: None,
                occurred_at: at,
            }))
            .unwrap();
        assert_eq!(events[0].event_type(), "maquila.order.roasting_started");
        order.apply(&events[0]);

        assert_eq!(order.performed_by(OrderStatus::InRoasting), Some(roaster));
        assert_eq!(order.entered_at(OrderStatus::InRoasting), Some(at));
        assert_eq!(order.entered_at(OrderStatus::RoastingComplete), None);
    }

    fn advance_to(order: &mut MaquilaOrder, tenant_id: TenantId, status: OrderStatus) {
        while order.status() != status {
            step(order, tenant_id);
        }
    }

    fn report_cmd(
        tenant_id: TenantId,
        order_id: MaquilaOrderId,
        role: Role,
        target: OrderStatus,
        report: StageReport,
    ) -> OrderCommand {
        OrderCommand::AdvanceOrder(AdvanceOrder {
            tenant_id,
            order_id,
            performed_by: PrincipalId::new(),
            actor_role: role,
            target,
            report: Some(report),
            occurred_at: test_time(),
        })
    }

    fn roasting_report(hulled: Option<Kilograms>) -> RoastingReport {
        RoastingReport {
            equipment: RoastingEquipment::Industrial500Kg,
            roast_level: RoastLevel::Dark,
            received: Kilograms::from_whole(250),
            processed: Kilograms::from_whole(210),
            hulled,
            final_quality: GrainQuality::Excellent,
            notes: "two batches".to_string(),
        }
    }

    fn cps_order(tenant_id: TenantId) -> MaquilaOrder {
        let order_id = test_order_id();
        let mut details = test_details();
        details.coffee_grade = CoffeeGrade::Cps;
        let mut order = MaquilaOrder::empty(order_id);
        let events = order
            .handle(&OrderCommand::RegisterOrder(RegisterOrder {
                tenant_id,
                order_id,
                registered_by: PrincipalId::new(),
                actor_role: Role::Registration,
                details,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        order
    }

    #[test]
    fn roasting_report_is_recorded_with_completion() {
        let tenant_id = test_tenant_id();
        let mut order = cps_order(tenant_id);
        advance_to(&mut order, tenant_id, OrderStatus::InRoasting);

        let report = roasting_report(Some(Kilograms::from_whole(200)));
        let events = order
            .handle(&report_cmd(
                tenant_id,
                order.id_typed(),
                Role::Roasting,
                OrderStatus::RoastingComplete,
                StageReport::Roasting(report.clone()),
            ))
            .unwrap();
        order.apply(&events[0]);

        assert_eq!(order.status(), OrderStatus::RoastingComplete);
        assert_eq!(order.roasting_report(), Some(&report));
        assert_eq!(order.roasting_report().unwrap().yield_percent().unwrap().to_string(), "84.00%");
        // 250 kg of parchment down to 200 kg excelso
        assert_eq!(order.hulling_reduction(), Some(Percentage::from_basis_points(2_000)));
        assert!(order.history().last().unwrap().report.is_some());
    }

    #[test]
    fn hulled_weight_is_rejected_for_excelso_orders() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());
        advance_to(&mut order, tenant_id, OrderStatus::InRoasting);

        let err = order
            .handle(&report_cmd(
                tenant_id,
                order.id_typed(),
                Role::Roasting,
                OrderStatus::RoastingComplete,
                StageReport::Roasting(roasting_report(Some(Kilograms::from_whole(200)))),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("CPS")));
        assert_eq!(order.hulling_reduction(), None);
    }

    #[test]
    fn hulled_weight_cannot_exceed_quantity() {
        let tenant_id = test_tenant_id();
        let mut order = cps_order(tenant_id);
        advance_to(&mut order, tenant_id, OrderStatus::InRoasting);

        let err = order
            .handle(&report_cmd(
                tenant_id,
                order.id_typed(),
                Role::Roasting,
                OrderStatus::RoastingComplete,
                StageReport::Roasting(roasting_report(Some(Kilograms::from_whole(251)))),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn report_must_match_the_completed_stage() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());

        // Starting roasting carries no report.
        let err = order
            .handle(&report_cmd(
                tenant_id,
                order.id_typed(),
                Role::Roasting,
                OrderStatus::InRoasting,
                StageReport::Roasting(roasting_report(None)),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        advance_to(&mut order, tenant_id, OrderStatus::InProduction);
        let err = order
            .handle(&report_cmd(
                tenant_id,
                order.id_typed(),
                Role::Production,
                OrderStatus::ReadyToInvoice,
                StageReport::Roasting(roasting_report(None)),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn production_report_is_recorded_with_completion() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());
        advance_to(&mut order, tenant_id, OrderStatus::InProduction);

        let report = ProductionReport {
            process_type: ProductionType::Packaging,
            grind: None,
            packaging_details: "500g valve bags".to_string(),
            weight_check: true,
            packaging_check: true,
            labeling_check: true,
            final_weight: Kilograms::from_whole(205),
            units_produced: 410,
            notes: String::new(),
        };
        let events = order
            .handle(&report_cmd(
                tenant_id,
                order.id_typed(),
                Role::Production,
                OrderStatus::ReadyToInvoice,
                StageReport::Production(report.clone()),
            ))
            .unwrap();
        order.apply(&events[0]);

        assert_eq!(order.production_report(), Some(&report));
        assert!(order.production_report().unwrap().is_quality_complete());
        assert_eq!(order.roasting_report(), None);
    }

    #[test]
    fn report_is_checked_after_authorization() {
        let tenant_id = test_tenant_id();
        let mut order = registered_order(tenant_id, test_order_id());
        advance_to(&mut order, tenant_id, OrderStatus::InRoasting);

        let mut bad = roasting_report(None);
        bad.processed = Kilograms::from_whole(999);
        let err = order
            .handle(&report_cmd(
                tenant_id,
                order.id_typed(),
                Role::Invoicing,
                OrderStatus::RoastingComplete,
                StageReport::Roasting(bad),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let tenant_id = test_tenant_id();
        let order = registered_order(tenant_id, test_order_id());
        let before = order.clone();

        let _ = order.handle(&advance_cmd(
            tenant_id,
            order.id_typed(),
            Role::Roasting,
            OrderStatus::InRoasting,
        ));

        assert_eq!(order, before);
    }

    #[test]
    fn overdue_is_relative_to_committed_date() {
        let tenant_id = test_tenant_id();
        let order = registered_order(tenant_id, test_order_id());
        let committed = order.details().unwrap().committed_date;

        assert_eq!(order.days_to_delivery(committed - Duration::days(3)), Some(3));
        assert!(!order.is_overdue(committed));
        assert!(order.is_overdue(committed + Duration::days(1)));
    }

    #[test]
    fn order_number_and_weight_format() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(
            OrderNumber::compose("MAQ", "900123456", date, 7).as_str(),
            "MAQ-900123456-20260309-007"
        );
        assert_eq!(Kilograms::from_hundredths(12_550).to_string(), "125.50 kg");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after N legal advances the order is in the Nth status.
        #[test]
        fn n_legal_advances_reach_nth_status(n in 0usize..=6) {
            let tenant_id = test_tenant_id();
            let mut order = registered_order(tenant_id, test_order_id());
            for _ in 0..n {
                step(&mut order, tenant_id);
            }
            prop_assert_eq!(order.status(), OrderStatus::SEQUENCE[n]);
        }

        /// Property: any non-successor target is an invalid transition, whatever the role.
        #[test]
        fn non_successor_targets_are_invalid(
            n in 0usize..=6,
            target_idx in 0usize..7,
            role_idx in 0usize..7,
        ) {
            let tenant_id = test_tenant_id();
            let mut order = registered_order(tenant_id, test_order_id());
            for _ in 0..n {
                step(&mut order, tenant_id);
            }
            let target = OrderStatus::SEQUENCE[target_idx];
            prop_assume!(order.status().successor() != Some(target));

            let result = order.handle(&advance_cmd(
                tenant_id,
                order.id_typed(),
                Role::ALL[role_idx],
                target,
            ));
            prop_assert!(matches!(result, Err(DomainError::InvalidTransition(_))));
        }

        /// Property: the correct target with a role that does not own the stage is unauthorized.
        #[test]
        fn wrong_role_with_correct_target_is_unauthorized(
            n in 0usize..6,
            role_idx in 0usize..7,
        ) {
            let tenant_id = test_tenant_id();
            let mut order = registered_order(tenant_id, test_order_id());
            for _ in 0..n {
                step(&mut order, tenant_id);
            }
            let rule = crate::next_rule(order.status()).unwrap();
            let role = Role::ALL[role_idx];
            prop_assume!(role != rule.required_role());

            let result = order.handle(&advance_cmd(tenant_id, order.id_typed(), role, rule.to));
            prop_assert!(matches!(result, Err(DomainError::Unauthorized(_))));
        }
    }
}
