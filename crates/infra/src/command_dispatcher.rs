//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (projections)
//! ```
//!
//! A command that touches several aggregates goes through a
//! [`UnitOfWork`](crate::unit_of_work::UnitOfWork) instead: steps 1-3 repeat
//! per aggregate, and steps 4-5 happen once for all of them.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use duka_core::{Aggregate, AggregateId, DomainError, TenantId};
use duka_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::locks::LockError;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// A request field failed validation.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// A stock decrement would exceed stock on hand.
    #[error("insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: i64,
        available: i64,
    },

    /// Domain invariant failure (deterministic).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Stale version, duplicate key, or lock wait timeout. Safe to retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Tenant isolation violation (cross-tenant or cross-aggregate stream mixing).
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Conflict(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation { field, message } => DispatchError::Validation { field, message },
            DomainError::InsufficientStock {
                product,
                requested,
                available,
            } => DispatchError::InsufficientStock {
                product,
                requested,
                available,
            },
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation {
                field: "id".to_string(),
                message: msg,
            },
            DomainError::NotFound(what) => DispatchError::NotFound(what),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
        }
    }
}

impl From<LockError> for DispatchError {
    fn from(value: LockError) -> Self {
        match value {
            LockError::Timeout { .. } => DispatchError::Conflict(value.to_string()),
            LockError::Poisoned => DispatchError::Store(EventStoreError::Backend(value.to_string())),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// - Events are persisted before publication; a failed append publishes nothing.
/// - Tenant isolation and optimistic concurrency are enforced on every stream.
/// - Publication failures after a successful append are logged, not returned;
///   projections skip duplicates and catch up on rebuild.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Start a multi-aggregate unit of work for `tenant_id`.
    pub fn begin(&self, tenant_id: TenantId) -> UnitOfWork<'_, S, B> {
        UnitOfWork::new(&self.store, &self.bus, tenant_id)
    }

    /// Rehydrate one aggregate without writing anything.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command against a single aggregate: load, decide, append,
    /// publish. Returns the aggregate with the new events applied.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<(A, Vec<StoredEvent>), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Id: Copy + Into<AggregateId>,
        A::Event: duka_events::Event + Serialize + DeserializeOwned,
    {
        let mut uow = self.begin(tenant_id);
        let mut aggregate = uow.load(aggregate_id, make_aggregate)?;
        uow.execute(&mut aggregate, aggregate_type, command)?;
        let committed = uow.commit()?;
        Ok((aggregate, committed))
    }
}

pub(crate) fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce tenant isolation even if a buggy backend returns cross-tenant data,
    // and require a gap-free stream starting at 1.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

pub(crate) fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use duka_events::InMemoryEventBus;
    use duka_parties::{Party, PartyCommand, PartyEvent, PartyId, PartyKind, RegisterParty};

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn register(tenant_id: TenantId, party_id: PartyId) -> PartyCommand {
        PartyCommand::RegisterParty(RegisterParty {
            tenant_id,
            party_id,
            kind: PartyKind::Supplier,
            name: "Mombasa Hardware".to_string(),
            phone: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_then_publishes() {
        let bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let dispatcher: Dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), bus);
        let tenant_id = TenantId::new();
        let party_id = PartyId::generate();

        let (party, committed) = dispatcher
            .dispatch(
                tenant_id,
                party_id.aggregate_id(),
                "parties.party",
                &register(tenant_id, party_id),
                |id| Party::empty(PartyId::new(id)),
            )
            .unwrap();

        assert!(party.exists());
        assert_eq!(committed.len(), 1);
        let env = sub.try_recv().unwrap();
        assert_eq!(env.event_type(), "parties.party.registered");
        assert_eq!(env.sequence_number(), 1);

        let payload: PartyEvent = serde_json::from_value(env.into_payload()).unwrap();
        assert!(matches!(payload, PartyEvent::PartyRegistered(_)));
    }

    #[test]
    fn domain_rejection_writes_nothing() {
        let dispatcher: Dispatcher =
            CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()));
        let tenant_id = TenantId::new();
        let party_id = PartyId::generate();
        let make = |id| Party::empty(PartyId::new(id));

        dispatcher
            .dispatch(tenant_id, party_id.aggregate_id(), "parties.party", &register(tenant_id, party_id), make)
            .unwrap();
        let err = dispatcher
            .dispatch(tenant_id, party_id.aggregate_id(), "parties.party", &register(tenant_id, party_id), make)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Conflict(_)));
        assert_eq!(
            dispatcher.store().load_stream(tenant_id, party_id.aggregate_id()).unwrap().len(),
            1
        );
    }

    #[test]
    fn domain_errors_keep_their_shape() {
        let err: DispatchError = DomainError::insufficient_stock("CEM-50", 8, 3).into();
        assert!(matches!(
            err,
            DispatchError::InsufficientStock { ref product, requested: 8, available: 3 } if product == "CEM-50"
        ));

        let err: DispatchError = DomainError::validation("quantity", "must be greater than 0").into();
        assert_eq!(err.to_string(), "quantity: must be greater than 0");
    }
}
