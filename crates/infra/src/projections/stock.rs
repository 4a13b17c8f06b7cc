use serde_json::Value as JsonValue;

use duka_core::{Money, TenantId};
use duka_events::EventEnvelope;
use duka_inventory::{ProductEvent, ProductId};

use super::cursor::{StreamCursors, replay_order, tenants_of};
use super::{ProjectionError, decode, ensure_same_stream};
use crate::ledger::PRODUCT_AGGREGATE;
use crate::read_model::{Page, PageRequest, TenantStore};

/// Queryable stock read model: one row per product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductStockView {
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub unit_price: Money,
    pub current_stock: i64,
    pub minimum_stock: i64,
    pub active: bool,
}

impl ProductStockView {
    pub fn is_low_stock(&self) -> bool {
        self.current_stock < self.minimum_stock
    }
}

/// Product stock projection.
///
/// Stock is taken from each movement's `stock_after`, so the view always shows
/// what the ledger committed, never a locally re-derived figure.
#[derive(Debug)]
pub struct StockProjection<S>
where
    S: TenantStore<ProductId, ProductStockView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> StockProjection<S>
where
    S: TenantStore<ProductId, ProductStockView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductStockView> {
        self.store.get(tenant_id, product_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ProductStockView> {
        self.store.list(tenant_id)
    }

    pub fn page(&self, tenant_id: TenantId, request: PageRequest) -> Page<ProductStockView> {
        self.store.page(tenant_id, request)
    }

    /// Products whose stock has fallen below their minimum.
    pub fn low_stock(&self, tenant_id: TenantId) -> Vec<ProductStockView> {
        self.list(tenant_id).into_iter().filter(ProductStockView::is_low_stock).collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PRODUCT_AGGREGATE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let tenant_id = envelope.tenant_id();
            let event: ProductEvent = decode(envelope)?;

            match event {
                ProductEvent::ProductRegistered(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.product_id.aggregate_id())?;
                    self.store.upsert(
                        tenant_id,
                        e.product_id,
                        ProductStockView {
                            product_id: e.product_id,
                            code: e.code,
                            name: e.name,
                            unit_price: e.unit_price,
                            current_stock: 0,
                            minimum_stock: e.minimum_stock,
                            active: true,
                        },
                    );
                }
                ProductEvent::StockMovementRecorded(e) => {
                    let product_id = e.movement.product_id;
                    ensure_same_stream(envelope, e.tenant_id, product_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, product_id)?;
                    view.current_stock = e.stock_after;
                    self.store.upsert(tenant_id, product_id, view);
                }
                ProductEvent::ProductUpdated(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.product_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, e.product_id)?;
                    view.name = e.name;
                    view.unit_price = e.unit_price;
                    view.minimum_stock = e.minimum_stock;
                    self.store.upsert(tenant_id, e.product_id, view);
                }
                ProductEvent::ProductDeactivated(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.product_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, e.product_id)?;
                    view.active = false;
                    self.store.upsert(tenant_id, e.product_id, view);
                }
                ProductEvent::ProductReactivated(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.product_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, e.product_id)?;
                    view.active = true;
                    self.store.upsert(tenant_id, e.product_id, view);
                }
            }
            Ok(())
        })
    }

    fn existing(&self, tenant_id: TenantId, product_id: ProductId) -> Result<ProductStockView, ProjectionError> {
        self.store
            .get(tenant_id, &product_id)
            .ok_or_else(|| ProjectionError::MissingRecord(format!("product {product_id}")))
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        let envs = replay_order(envelopes);
        for t in tenants_of(&envs) {
            self.store.clear_tenant(t);
        }
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
