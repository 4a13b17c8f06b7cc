use duka_core::{TenantId, UserId};
use duka_infra::ledger::Caller;

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    user_id: Option<UserId>,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, user_id: Option<UserId>) -> Self {
        Self { tenant_id, user_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The user recorded on stock movements, when the caller named one.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn caller(&self) -> Caller {
        Caller {
            tenant_id: self.tenant_id,
            user_id: self.user_id,
        }
    }
}
