use maquila_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to exactly one company partition.
///
/// Workers pinned to a tenant use this to drop messages from other tenants.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        EventEnvelope::tenant_id(self)
    }
}
