use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use duka_core::TenantId;
use duka_events::EventEnvelope;
use duka_inventory::ProductId;
use duka_parties::PartyId;
use duka_purchasing::{LpoEvent, LpoId, LpoStatus};

use super::cursor::{StreamCursors, replay_order, tenants_of};
use super::{ProjectionError, decode, ensure_same_stream};
use crate::ledger::LPO_AGGREGATE;
use crate::read_model::{Page, PageRequest, TenantStore};

/// Queryable LPO read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpoView {
    pub lpo_id: LpoId,
    pub lpo_number: String,
    pub supplier_id: PartyId,
    pub product_id: ProductId,
    pub ordered_quantity: i64,
    pub delivered_quantity: i64,
    pub status: LpoStatus,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
}

impl LpoView {
    pub fn pending_quantity(&self) -> i64 {
        self.ordered_quantity - self.delivered_quantity
    }
}

#[derive(Debug)]
pub struct LposProjection<S>
where
    S: TenantStore<LpoId, LpoView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> LposProjection<S>
where
    S: TenantStore<LpoId, LpoView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, lpo_id: &LpoId) -> Option<LpoView> {
        self.store.get(tenant_id, lpo_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<LpoView> {
        self.store.list(tenant_id)
    }

    pub fn page(&self, tenant_id: TenantId, request: PageRequest) -> Page<LpoView> {
        self.store.page(tenant_id, request)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != LPO_AGGREGATE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let tenant_id = envelope.tenant_id();
            match decode::<LpoEvent>(envelope)? {
                LpoEvent::LpoIssued(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.lpo_id.aggregate_id())?;
                    self.store.upsert(
                        tenant_id,
                        e.lpo_id,
                        LpoView {
                            lpo_id: e.lpo_id,
                            lpo_number: e.lpo_number,
                            supplier_id: e.supplier_id,
                            product_id: e.product_id,
                            ordered_quantity: e.ordered_quantity,
                            delivered_quantity: 0,
                            status: LpoStatus::Pending,
                            order_date: e.order_date,
                            expected_delivery: e.expected_delivery,
                        },
                    );
                }
                LpoEvent::DeliveryRecorded(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.lpo_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, e.lpo_id)?;
                    view.delivered_quantity = e.total_delivered;
                    view.status = e.status;
                    self.store.upsert(tenant_id, e.lpo_id, view);
                }
                LpoEvent::LpoCancelled(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.lpo_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, e.lpo_id)?;
                    view.status = LpoStatus::Cancelled;
                    self.store.upsert(tenant_id, e.lpo_id, view);
                }
            }
            Ok(())
        })
    }

    fn existing(&self, tenant_id: TenantId, lpo_id: LpoId) -> Result<LpoView, ProjectionError> {
        self.store
            .get(tenant_id, &lpo_id)
            .ok_or_else(|| ProjectionError::MissingRecord(format!("lpo {lpo_id}")))
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
