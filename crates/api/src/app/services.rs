//! Infrastructure wiring: event store, bus, ledger service, read models and
//! the worker that keeps them current.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use duka_events::{EventEnvelope, InMemoryEventBus};
use duka_infra::command_dispatcher::DispatchError;
use duka_infra::event_store::{EventStore, EventStoreError, InMemoryEventStore};
use duka_infra::projections::{LedgerProjections, ProjectionError};
use duka_infra::workers::{ProjectionWorker, WorkerHandle};
use duka_infra::{LedgerConfig, LedgerService, StoreBackend};

use crate::app::errors::ApiError;

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Ledger = LedgerService<Arc<dyn EventStore>, Bus>;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    #[error("read model rebuild failed: {0}")]
    Rebuild(#[from] ProjectionError),

    #[error("{0}")]
    Unsupported(&'static str),

    #[error("DATABASE_URL must be set for the postgres store")]
    MissingDatabaseUrl,

    #[error("failed to start projection worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("start-up task failed: {0}")]
    Join(String),
}

/// Shared state behind every handler.
pub struct AppServices {
    pub ledger: Arc<Ledger>,
    pub views: Arc<LedgerProjections>,
    _worker: WorkerHandle,
}

pub async fn build_services(config: &LedgerConfig) -> Result<AppServices, ServicesError> {
    let store = open_store(config).await?;
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let ledger = Arc::new(LedgerService::new(store, bus.clone(), config));
    let views = Arc::new(LedgerProjections::in_memory());

    // Catch the read models up with what is already stored, then follow the
    // bus. Nothing is written before the server starts accepting requests.
    {
        let ledger = ledger.clone();
        let views = views.clone();
        tokio::task::spawn_blocking(move || views.rebuild_from_store(ledger.dispatcher().store()))
            .await
            .map_err(|e| ServicesError::Join(e.to_string()))??;
    }

    let worker = {
        let views = views.clone();
        ProjectionWorker::spawn("ledger-projections", &*bus, None, move |env: EventEnvelope<JsonValue>| {
            views.apply_envelope(&env)
        })?
    };

    tracing::info!(store = ?config.store, vat_bps = config.vat_rate.basis_points(), "ledger services ready");
    Ok(AppServices {
        ledger,
        views,
        _worker: worker,
    })
}

async fn open_store(config: &LedgerConfig) -> Result<Arc<dyn EventStore>, ServicesError> {
    match config.store {
        StoreBackend::Memory => Ok(Arc::new(InMemoryEventStore::new())),
        StoreBackend::Postgres => open_postgres(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &LedgerConfig) -> Result<Arc<dyn EventStore>, ServicesError> {
    let url = config.database_url.as_deref().ok_or(ServicesError::MissingDatabaseUrl)?;
    let store = duka_infra::event_store::PostgresEventStore::connect(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &LedgerConfig) -> Result<Arc<dyn EventStore>, ServicesError> {
    Err(ServicesError::Unsupported(
        "DUKA_STORE=postgres requires building with the `postgres` feature",
    ))
}

impl AppServices {
    /// Run a ledger operation on the blocking pool. Ledger calls take locks
    /// and may block on the store, so they never run on an async worker.
    pub async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Ledger) -> Result<T, DispatchError> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = self.ledger.clone();
        let outcome = tokio::task::spawn_blocking(move || op(&ledger))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(outcome?)
    }
}
