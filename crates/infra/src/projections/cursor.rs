//! Per-stream cursors shared by the ledger projections.
//!
//! A cursor remembers the last sequence number applied for each
//! `(tenant, aggregate)` stream, which makes redelivered envelopes no-ops and
//! turns a skipped envelope into an error instead of a silently wrong view.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use duka_core::{AggregateId, TenantId};
use duka_events::EventEnvelope;

use super::ProjectionError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    last: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` for `envelope` if it is the next one on its stream, then
    /// advance the cursor. Duplicates and replays return `Ok` untouched.
    ///
    /// The cursor table stays locked while `apply` runs, so envelopes of one
    /// projection are applied one at a time.
    pub fn apply_next(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        apply: impl FnOnce() -> Result<(), ProjectionError>,
    ) -> Result<(), ProjectionError> {
        let mut cursors = self.last.write().map_err(|_| ProjectionError::Poisoned)?;
        let key = CursorKey {
            tenant_id: envelope.tenant_id(),
            aggregate_id: envelope.aggregate_id(),
        };
        let last = cursors.get(&key).copied().unwrap_or(0);
        let seq = envelope.sequence_number();

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        apply()?;
        cursors.insert(key, seq);
        Ok(())
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.last.write() {
            cursors.clear();
        }
    }
}

/// Deterministic replay order: tenant, aggregate, sequence.
pub fn replay_order(envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>) -> Vec<EventEnvelope<JsonValue>> {
    let mut envs: Vec<_> = envelopes.into_iter().collect();
    envs.sort_by_key(|e| (e.tenant_id(), e.aggregate_id(), e.sequence_number()));
    envs
}

/// Every tenant that appears in `envelopes`, once.
pub fn tenants_of(envelopes: &[EventEnvelope<JsonValue>]) -> Vec<TenantId> {
    let mut tenants: Vec<_> = envelopes.iter().map(|e| e.tenant_id()).collect();
    tenants.sort();
    tenants.dedup();
    tenants
}
