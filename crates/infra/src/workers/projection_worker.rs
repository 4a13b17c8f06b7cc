use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use duka_core::TenantId;
use duka_events::{EventBus, Subscription, TenantScoped};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic projection worker loop.
///
/// - Subscribes to an event bus at spawn time; nothing published before
///   that is seen
/// - Applies an idempotent handler for each message
/// - Supports graceful shutdown
/// - Optional tenant filtering
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that processes events from the bus subscription.
    ///
    /// - `tenant_id`: when provided, messages for other tenants are ignored
    /// - `handler`: must be idempotent (at-least-once delivery safe)
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        debug!(worker = name, "projection worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Some(t) = tenant_id {
                    if msg.tenant_id() != t {
                        continue;
                    }
                }

                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "projection worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "projection worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use chrono::Utc;
    use serde_json::Value as JsonValue;

    use duka_core::{Money, TenantId};
    use duka_events::{EventEnvelope, InMemoryEventBus};

    use crate::config::LedgerConfig;
    use crate::event_store::InMemoryEventStore;
    use crate::ledger::{Caller, LedgerService, NewProduct};
    use crate::projections::LedgerProjections;

    fn eventually(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn worker_feeds_projections_until_shutdown() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let views = Arc::new(LedgerProjections::in_memory());
        let worker = {
            let views = views.clone();
            ProjectionWorker::spawn("ledger-projections", &*bus, None, move |env: EventEnvelope<JsonValue>| {
                views.apply_envelope(&env)
            })
            .unwrap()
        };

        let ledger = LedgerService::new(InMemoryEventStore::new(), bus.clone(), &LedgerConfig::default());
        let caller = Caller::new(TenantId::new());
        let product_id = ledger
            .register_product(
                &caller,
                NewProduct {
                    code: "CEM-50".to_string(),
                    name: format!("Cement {}", Utc::now().date_naive()),
                    unit_price: Money::from_major(750),
                    minimum_stock: 0,
                    initial_stock: 4,
                },
            )
            .unwrap()
            .product
            .id_typed();

        assert!(eventually(|| {
            views
                .stock
                .get(caller.tenant_id, &product_id)
                .is_some_and(|v| v.current_stock == 4)
        }));
        worker.shutdown();
    }

    #[test]
    fn tenant_filter_skips_other_tenants() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let watched = TenantId::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let worker = {
            let seen = seen.clone();
            ProjectionWorker::spawn("filtered", &*bus, Some(watched), move |env: EventEnvelope<JsonValue>| {
                seen.lock().map(|mut s| s.push(env.tenant_id())).map_err(|e| e.to_string())
            })
            .unwrap()
        };

        let ledger = LedgerService::new(InMemoryEventStore::new(), bus.clone(), &LedgerConfig::default());
        for tenant_id in [TenantId::new(), watched] {
            ledger
                .register_product(
                    &Caller::new(tenant_id),
                    NewProduct {
                        code: "P".to_string(),
                        name: "P".to_string(),
                        unit_price: Money::ZERO,
                        minimum_stock: 0,
                        initial_stock: 0,
                    },
                )
                .unwrap();
        }

        assert!(eventually(|| seen.lock().map(|s| s.len() >= 2).unwrap_or(false)));
        worker.shutdown();
        assert!(seen.lock().unwrap().iter().all(|t| *t == watched));
    }
}
