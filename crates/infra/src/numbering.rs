//! Order number allocation: `{prefix}-{NIT}-{YYYYMMDD}-{NNN}`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use thiserror::Error;

use maquila_core::TenantId;
use maquila_orders::OrderNumber;

#[derive(Debug, Error)]
pub enum NumberingError {
    #[error("order number allocator unavailable")]
    Poisoned,
}

/// Per-company, per-day counters starting at 001.
///
/// A number handed out for a registration that is later rejected is not
/// reused.
#[derive(Debug)]
pub struct OrderNumberAllocator {
    prefix: String,
    counters: Mutex<HashMap<(TenantId, NaiveDate), u32>>,
}

impl OrderNumberAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next(
        &self,
        tenant_id: TenantId,
        nit: &str,
        date: NaiveDate,
    ) -> Result<OrderNumber, NumberingError> {
        let mut counters = self.counters.lock().map_err(|_| NumberingError::Poisoned)?;
        let counter = counters.entry((tenant_id, date)).or_insert(0);
        *counter += 1;
        Ok(OrderNumber::compose(&self.prefix, nit, date, *counter))
    }
}
