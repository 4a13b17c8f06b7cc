//! Multi-aggregate unit of work.
//!
//! Aggregates are loaded and commands decided one at a time, but nothing is
//! written until [`UnitOfWork::commit`], which appends every touched stream in
//! one atomic batch. Dropping the unit without committing discards all of it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use duka_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use duka_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{DispatchError, apply_history, validate_loaded_stream};
use crate::event_store::{EventStore, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug)]
struct StagedStream {
    aggregate_id: AggregateId,
    expected_version: u64,
    events: Vec<UncommittedEvent>,
}

#[derive(Debug)]
pub struct UnitOfWork<'a, S, B> {
    store: &'a S,
    bus: &'a B,
    tenant_id: TenantId,
    staged: Vec<StagedStream>,
}

impl<'a, S, B> UnitOfWork<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(store: &'a S, bus: &'a B, tenant_id: TenantId) -> Self {
        Self {
            store,
            bus,
            tenant_id,
            staged: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Number of events waiting for [`commit`](Self::commit).
    pub fn staged_events(&self) -> usize {
        self.staged.iter().map(|s| s.events.len()).sum()
    }

    /// Rehydrate an aggregate from its committed stream.
    ///
    /// Load each aggregate once per unit and keep using that instance: a second
    /// load would not see the events already staged for it.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        if self.staged.iter().any(|s| s.aggregate_id == aggregate_id) {
            return Err(DispatchError::InvariantViolation(format!(
                "aggregate {aggregate_id} reloaded after staging events"
            )));
        }

        let history = self.store.load_stream(self.tenant_id, aggregate_id)?;
        validate_loaded_stream(self.tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Decide `command` on `aggregate`, apply the resulting events to it and
    /// stage them. Returns the decided events.
    pub fn execute<A>(
        &mut self,
        aggregate: &mut A,
        aggregate_type: &str,
        command: &A::Command,
    ) -> Result<Vec<A::Event>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Id: Copy + Into<AggregateId>,
        A::Event: duka_events::Event + Serialize,
    {
        let aggregate_id: AggregateId = (*aggregate.id()).into();
        let version_before = aggregate.version();

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(decided);
        }

        let mut uncommitted = Vec::with_capacity(decided.len());
        for ev in &decided {
            uncommitted.push(UncommittedEvent::from_typed(
                self.tenant_id,
                aggregate_id,
                aggregate_type,
                Uuid::now_v7(),
                ev,
            )?);
            aggregate.apply(ev);
        }

        match self.staged.iter_mut().find(|s| s.aggregate_id == aggregate_id) {
            Some(stream) => stream.events.extend(uncommitted),
            None => self.staged.push(StagedStream {
                aggregate_id,
                expected_version: version_before,
                events: uncommitted,
            }),
        }

        Ok(decided)
    }

    /// Append every staged stream atomically, then publish the committed events.
    ///
    /// Once the append succeeds the operation has happened: a publish failure
    /// is logged and the committed events are still returned. Read models that
    /// missed an event catch up on their next rebuild from the store.
    pub fn commit(self) -> Result<Vec<StoredEvent>, DispatchError> {
        if self.staged.is_empty() {
            return Ok(vec![]);
        }

        let batches = self
            .staged
            .into_iter()
            .map(|s| StreamAppend::new(s.events, ExpectedVersion::Exact(s.expected_version)))
            .collect();
        let committed = self.store.append_batch(batches)?;

        for stored in &committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    aggregate_id = %stored.aggregate_id,
                    sequence_number = stored.sequence_number,
                    error = ?e,
                    "event committed but not published"
                );
            }
        }

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use std::sync::mpsc;

    use chrono::Utc;
    use duka_events::{InMemoryEventBus, Subscription};
    use duka_parties::{DeactivateParty, Party, PartyCommand, PartyId, PartyKind, RegisterParty};

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;

    fn dispatcher() -> CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>> {
        CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()))
    }

    fn register(tenant_id: TenantId, party_id: PartyId) -> PartyCommand {
        PartyCommand::RegisterParty(RegisterParty {
            tenant_id,
            party_id,
            kind: PartyKind::Customer,
            name: "Kilimani Builders".to_string(),
            phone: Some("+254700000001".to_string()),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn nothing_is_written_before_commit() {
        let dispatcher = dispatcher();
        let tenant_id = TenantId::new();
        let a = PartyId::generate();
        let b = PartyId::generate();

        {
            let mut uow = dispatcher.begin(tenant_id);
            let mut pa = uow.load(a.aggregate_id(), |id| Party::empty(PartyId::new(id))).unwrap();
            uow.execute(&mut pa, "parties.party", &register(tenant_id, a)).unwrap();
            let mut pb = uow.load(b.aggregate_id(), |id| Party::empty(PartyId::new(id))).unwrap();
            uow.execute(&mut pb, "parties.party", &register(tenant_id, b)).unwrap();
            assert_eq!(uow.staged_events(), 2);
            // dropped without commit
        }

        assert!(dispatcher.store().load_stream(tenant_id, a.aggregate_id()).unwrap().is_empty());
        assert!(dispatcher.store().load_stream(tenant_id, b.aggregate_id()).unwrap().is_empty());
    }

    #[test]
    fn commit_writes_all_streams_and_repeated_commands_share_one() {
        let dispatcher = dispatcher();
        let tenant_id = TenantId::new();
        let a = PartyId::generate();
        let b = PartyId::generate();

        let mut uow = dispatcher.begin(tenant_id);
        let mut pa = uow.load(a.aggregate_id(), |id| Party::empty(PartyId::new(id))).unwrap();
        uow.execute(&mut pa, "parties.party", &register(tenant_id, a)).unwrap();
        uow.execute(
            &mut pa,
            "parties.party",
            &PartyCommand::DeactivateParty(DeactivateParty {
                tenant_id,
                party_id: a,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let mut pb = uow.load(b.aggregate_id(), |id| Party::empty(PartyId::new(id))).unwrap();
        uow.execute(&mut pb, "parties.party", &register(tenant_id, b)).unwrap();

        let committed = uow.commit().unwrap();
        assert_eq!(committed.len(), 3);
        assert_eq!(dispatcher.store().load_stream(tenant_id, a.aggregate_id()).unwrap().len(), 2);

        let reloaded = dispatcher
            .load(tenant_id, a.aggregate_id(), |id| Party::empty(PartyId::new(id)))
            .unwrap();
        assert!(!reloaded.is_active());
    }

    #[test]
    fn stale_stream_aborts_the_unit() {
        let dispatcher = dispatcher();
        let tenant_id = TenantId::new();
        let a = PartyId::generate();
        let b = PartyId::generate();

        let mut uow = dispatcher.begin(tenant_id);
        let mut pa = uow.load(a.aggregate_id(), |id| Party::empty(PartyId::new(id))).unwrap();
        uow.execute(&mut pa, "parties.party", &register(tenant_id, a)).unwrap();
        let mut pb = uow.load(b.aggregate_id(), |id| Party::empty(PartyId::new(id))).unwrap();
        uow.execute(&mut pb, "parties.party", &register(tenant_id, b)).unwrap();

        // A concurrent writer gets to `b` first.
        dispatcher
            .dispatch(tenant_id, b.aggregate_id(), "parties.party", &register(tenant_id, b), |id| {
                Party::empty(PartyId::new(id))
            })
            .unwrap();

        let err = uow.commit().unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
        assert!(dispatcher.store().load_stream(tenant_id, a.aggregate_id()).unwrap().is_empty());
    }

    /// A bus whose transport is gone.
    struct ClosedBus;

    impl EventBus<EventEnvelope<JsonValue>> for ClosedBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err("transport closed")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            Subscription::new(mpsc::channel().1)
        }
    }

    #[test]
    fn committed_events_survive_a_failed_publish() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), ClosedBus);
        let tenant_id = TenantId::new();
        let a = PartyId::generate();

        let mut uow = dispatcher.begin(tenant_id);
        let mut pa = uow.load(a.aggregate_id(), |id| Party::empty(PartyId::new(id))).unwrap();
        uow.execute(&mut pa, "parties.party", &register(tenant_id, a)).unwrap();

        let committed = uow.commit().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(dispatcher.store().load_stream(tenant_id, a.aggregate_id()).unwrap().len(), 1);

        // Retrying the same registration is now a domain error, not a second write.
        let retry = dispatcher.dispatch(tenant_id, a.aggregate_id(), "parties.party", &register(tenant_id, a), |id| {
            Party::empty(PartyId::new(id))
        });
        assert!(retry.is_err());
        assert_eq!(dispatcher.store().load_stream(tenant_id, a.aggregate_id()).unwrap().len(), 1);
    }
}
