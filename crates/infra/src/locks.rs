//! Per-aggregate write locks.
//!
//! Every ledger operation takes the locks of all aggregates it reads for a
//! decision or writes to, holds them across decide-and-append, and releases
//! them when the guard drops. A set is acquired all at once or not at all, so
//! two operations over overlapping sets can never deadlock. Waiting is bounded;
//! a caller that cannot get its set in time gets a conflict and may retry.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use duka_core::{AggregateId, TenantId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {waited_ms}ms waiting for {keys} aggregate lock(s)")]
    Timeout { keys: usize, waited_ms: u128 },

    #[error("lock table poisoned")]
    Poisoned,
}

/// Lock table shared by every writer of one store.
#[derive(Debug)]
pub struct AggregateLocks {
    held: Mutex<HashSet<LockKey>>,
    released: Condvar,
    timeout: Duration,
}

impl AggregateLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire every aggregate in `ids` for `tenant_id`. Duplicates are fine.
    pub fn acquire(
        &self,
        tenant_id: TenantId,
        ids: impl IntoIterator<Item = AggregateId>,
    ) -> Result<LockGuard<'_>, LockError> {
        let mut keys: Vec<LockKey> = ids
            .into_iter()
            .map(|aggregate_id| LockKey {
                tenant_id,
                aggregate_id,
            })
            .collect();
        keys.sort();
        keys.dedup();

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;

        while keys.iter().any(|k| held.contains(k)) {
            let now = Instant::now();
            if now >= deadline {
                debug!(keys = keys.len(), "aggregate lock wait timed out");
                return Err(LockError::Timeout {
                    keys: keys.len(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| LockError::Poisoned)?;
            held = guard;
        }

        held.extend(keys.iter().copied());
        Ok(LockGuard { locks: self, keys })
    }
}

/// Releases its keys on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    locks: &'a AggregateLocks,
    keys: Vec<LockKey>,
}

impl LockGuard<'_> {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // Recover the set even if another holder panicked; the keys must go.
        let mut held = match self.locks.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
