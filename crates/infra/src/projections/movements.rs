use serde_json::Value as JsonValue;

use duka_core::TenantId;
use duka_events::EventEnvelope;
use duka_inventory::{ProductEvent, ProductId, StockMovement};

use super::cursor::{StreamCursors, replay_order, tenants_of};
use super::{ProjectionError, decode, ensure_same_stream};
use crate::ledger::PRODUCT_AGGREGATE;
use crate::read_model::TenantStore;

/// Running replay of a product's movements. The history itself stays in the
/// event store; the view holds only the fold and the latest movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementLedgerView {
    pub product_id: ProductId,
    pub movement_count: u64,
    pub last_movement: Option<StockMovement>,
    pub replayed_stock: i64,
}

/// Per-product movement ledger.
///
/// Every appended movement is folded into `replayed_stock` and compared with
/// the `stock_after` the aggregate committed. A difference means the ledger
/// and its cached stock have diverged and is reported, not absorbed.
#[derive(Debug)]
pub struct MovementLedgerProjection<S>
where
    S: TenantStore<ProductId, MovementLedgerView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> MovementLedgerProjection<S>
where
    S: TenantStore<ProductId, MovementLedgerView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<MovementLedgerView> {
        self.store.get(tenant_id, product_id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PRODUCT_AGGREGATE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let ProductEvent::StockMovementRecorded(e) = decode::<ProductEvent>(envelope)? else {
                return Ok(());
            };
            let tenant_id = envelope.tenant_id();
            let product_id = e.movement.product_id;
            ensure_same_stream(envelope, e.tenant_id, product_id.aggregate_id())?;

            let mut view = self.store.get(tenant_id, &product_id).unwrap_or(MovementLedgerView {
                product_id,
                movement_count: 0,
                last_movement: None,
                replayed_stock: 0,
            });
            let replayed = view.replayed_stock + e.movement.signed_delta();
            if replayed != e.stock_after {
                return Err(ProjectionError::ReplayMismatch {
                    product_id,
                    replayed,
                    recorded: e.stock_after,
                });
            }

            view.movement_count += 1;
            view.last_movement = Some(e.movement);
            view.replayed_stock = replayed;
            self.store.upsert(tenant_id, product_id, view);
            Ok(())
        })
    }

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
