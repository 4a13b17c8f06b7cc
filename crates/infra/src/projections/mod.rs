//! Ledger read models (projections).
//!
//! Projections consume published envelopes and build query-optimized views.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event store
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: safe for at-least-once delivery

pub mod cursor;
pub mod invoices;
pub mod lpos;
pub mod movements;
pub mod sales;
pub mod stock;

pub use invoices::{InvoiceView, InvoicesProjection};
pub use lpos::{LpoView, LposProjection};
pub use movements::{MovementLedgerProjection, MovementLedgerView};
pub use sales::{SaleView, SalesProjection};
pub use stock::{ProductStockView, StockProjection};

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use duka_core::{AggregateId, TenantId};
use duka_events::EventEnvelope;
use duka_inventory::ProductId;
use duka_invoicing::InvoiceId;
use duka_purchasing::LpoId;
use duka_sales::SaleId;

use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::InMemoryTenantStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event refers to unknown record: {0}")]
    MissingRecord(String),

    #[error("movement replay for product {product_id} gives {replayed}, ledger recorded {recorded}")]
    ReplayMismatch {
        product_id: ProductId,
        replayed: i64,
        recorded: i64,
    },

    #[error("projection state poisoned")]
    Poisoned,

    #[error("event store: {0}")]
    Store(String),
}

impl From<EventStoreError> for ProjectionError {
    fn from(value: EventStoreError) -> Self {
        ProjectionError::Store(value.to_string())
    }
}

pub(crate) fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize(e.to_string()))
}

/// The payload must name the same tenant and aggregate as its envelope.
pub(crate) fn ensure_same_stream(
    envelope: &EventEnvelope<JsonValue>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(), ProjectionError> {
    if tenant_id != envelope.tenant_id() {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    if aggregate_id != envelope.aggregate_id() {
        return Err(ProjectionError::TenantIsolation(
            "event aggregate id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}

/// Every ledger read model, kept in memory.
#[derive(Debug)]
pub struct LedgerProjections {
    pub stock: StockProjection<InMemoryTenantStore<ProductId, ProductStockView>>,
    pub movements: MovementLedgerProjection<InMemoryTenantStore<ProductId, MovementLedgerView>>,
    pub sales: SalesProjection<InMemoryTenantStore<SaleId, SaleView>>,
    pub lpos: LposProjection<InMemoryTenantStore<LpoId, LpoView>>,
    pub invoices: InvoicesProjection<InMemoryTenantStore<InvoiceId, InvoiceView>>,
}

impl Default for LedgerProjections {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LedgerProjections {
    pub fn in_memory() -> Self {
        Self {
            stock: StockProjection::new(InMemoryTenantStore::new()),
            movements: MovementLedgerProjection::new(InMemoryTenantStore::new()),
            sales: SalesProjection::new(InMemoryTenantStore::new()),
            lpos: LposProjection::new(InMemoryTenantStore::new()),
            invoices: InvoicesProjection::new(InMemoryTenantStore::new()),
        }
    }

    /// Offer `envelope` to every projection. Each one that fails does not
    /// stop the others; the first failure is returned.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let results = [
            self.stock.apply_envelope(envelope),
            self.movements.apply_envelope(envelope),
            self.sales.apply_envelope(envelope),
            self.lpos.apply_envelope(envelope),
            self.invoices.apply_envelope(envelope),
        ];
        results.into_iter().collect()
    }

    /// Throw every view away and replay the whole store.
    pub fn rebuild_from_store(&self, store: &impl EventStore) -> Result<(), ProjectionError> {
        let envelopes: Vec<_> = store.load_all()?.iter().map(|e| e.to_envelope()).collect();
        self.stock.rebuild_from_scratch(envelopes.clone())?;
        self.movements.rebuild_from_scratch(envelopes.clone())?;
        self.sales.rebuild_from_scratch(envelopes.clone())?;
        self.lpos.rebuild_from_scratch(envelopes.clone())?;
        self.invoices.rebuild_from_scratch(envelopes)?;
        Ok(())
    }
}
