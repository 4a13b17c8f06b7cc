//! Tenant-unique business keys (product codes, LPO numbers, invoice numbers).
//!
//! Each key owns a stream whose id is derived from the tenant, the scope and
//! the normalized key. Claiming the key is an event on that stream, so it is
//! locked and version-checked like any aggregate and commits atomically with
//! the document that takes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use duka_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use duka_events::Event;

pub const AGGREGATE_TYPE: &str = "ledger.key_reservation";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    ProductCode,
    LpoNumber,
    InvoiceNumber,
    /// One invoice per sale; the key is the sale id.
    InvoicedSale,
}

impl KeyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyScope::ProductCode => "product_code",
            KeyScope::LpoNumber => "lpo_number",
            KeyScope::InvoiceNumber => "invoice_number",
            KeyScope::InvoicedSale => "invoiced_sale",
        }
    }

    /// Request field reported when the key is taken.
    pub fn field(self) -> &'static str {
        match self {
            KeyScope::ProductCode => "code",
            KeyScope::LpoNumber => "lpo_number",
            KeyScope::InvoiceNumber => "invoice_number",
            KeyScope::InvoicedSale => "sale",
        }
    }
}

/// Keys compare case-insensitively and ignore surrounding whitespace.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

/// Aggregate root: KeyReservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReservation {
    id: AggregateId,
    owner: Option<AggregateId>,
    version: u64,
}

impl KeyReservation {
    pub fn stream_id(tenant_id: TenantId, scope: KeyScope, key: &str) -> AggregateId {
        AggregateId::named(tenant_id, &format!("{}:{}", scope.as_str(), normalize_key(key)))
    }

    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            owner: None,
            version: 0,
        }
    }

    pub fn owner(&self) -> Option<AggregateId> {
        self.owner
    }
}

impl AggregateRoot for KeyReservation {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReserveKey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveKey {
    pub tenant_id: TenantId,
    pub scope: KeyScope,
    pub key: String,
    pub owner: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyReservationEvent {
    KeyReserved {
        tenant_id: TenantId,
        scope: KeyScope,
        key: String,
        owner: AggregateId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for KeyReservationEvent {
    fn event_type(&self) -> &'static str {
        "ledger.key_reservation.reserved"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            KeyReservationEvent::KeyReserved { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for KeyReservation {
    type Command = ReserveKey;
    type Event = KeyReservationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            KeyReservationEvent::KeyReserved { owner, .. } => self.owner = Some(*owner),
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.id != Self::stream_id(cmd.tenant_id, cmd.scope, &cmd.key) {
            return Err(DomainError::invariant("key reservation stream mismatch"));
        }
        let key = normalize_key(&cmd.key);
        if key.is_empty() {
            return Err(DomainError::validation(cmd.scope.field(), "cannot be empty"));
        }
        match self.owner {
            Some(owner) if owner == cmd.owner => Ok(vec![]),
            Some(_) => Err(DomainError::conflict(format!(
                "{} '{}' is already in use",
                cmd.scope.as_str(),
                cmd.key.trim()
            ))),
            None => Ok(vec![KeyReservationEvent::KeyReserved {
                tenant_id: cmd.tenant_id,
                scope: cmd.scope,
                key,
                owner: cmd.owner,
                occurred_at: cmd.occurred_at,
            }]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_events::execute;

    fn reserve(tenant_id: TenantId, key: &str, owner: AggregateId) -> ReserveKey {
        ReserveKey {
            tenant_id,
            scope: KeyScope::ProductCode,
            key: key.to_string(),
            owner,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn second_owner_is_rejected() {
        let tenant_id = TenantId::new();
        let mut r = KeyReservation::empty(KeyReservation::stream_id(tenant_id, KeyScope::ProductCode, "cem-50"));
        let first = AggregateId::new();
        execute(&mut r, &reserve(tenant_id, "cem-50", first)).unwrap();

        assert!(r.handle(&reserve(tenant_id, "CEM-50 ", first)).unwrap().is_empty());
        let err = r.handle(&reserve(tenant_id, "CEM-50", AggregateId::new())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn stream_id_ignores_case_and_scope_separates() {
        let tenant_id = TenantId::new();
        assert_eq!(
            KeyReservation::stream_id(tenant_id, KeyScope::LpoNumber, " lpo-1 "),
            KeyReservation::stream_id(tenant_id, KeyScope::LpoNumber, "LPO-1"),
        );
        assert_ne!(
            KeyReservation::stream_id(tenant_id, KeyScope::LpoNumber, "X1"),
            KeyReservation::stream_id(tenant_id, KeyScope::InvoiceNumber, "X1"),
        );
        assert_ne!(
            KeyReservation::stream_id(tenant_id, KeyScope::LpoNumber, "X1"),
            KeyReservation::stream_id(TenantId::new(), KeyScope::LpoNumber, "X1"),
        );
    }
}
