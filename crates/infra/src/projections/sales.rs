use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use duka_core::{Money, TenantId, Totals};
use duka_events::EventEnvelope;
use duka_parties::PartyId;
use duka_payments::{BalanceStatus, PaymentLedger};
use duka_sales::{ModeOfPayment, SaleEvent, SaleId, SaleLineItem};

use super::cursor::{StreamCursors, replay_order, tenants_of};
use super::{ProjectionError, decode, ensure_same_stream};
use crate::ledger::SALE_AGGREGATE;
use crate::read_model::{Page, PageRequest, TenantStore};

/// Queryable sale read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleView {
    pub sale_id: SaleId,
    pub sale_number: String,
    pub customer_id: PartyId,
    pub lpo_quotation_number: Option<String>,
    pub delivery_number: Option<String>,
    pub mode_of_payment: ModeOfPayment,
    pub totals: Totals,
    pub lines: Vec<SaleLineItem>,
    pub payments: PaymentLedger,
    pub created_at: DateTime<Utc>,
}

impl SaleView {
    pub fn amount_paid(&self) -> Money {
        self.payments.paid()
    }

    pub fn outstanding_balance(&self) -> Money {
        self.payments.remaining()
    }

    pub fn payment_status(&self) -> BalanceStatus {
        self.payments.status()
    }
}

#[derive(Debug)]
pub struct SalesProjection<S>
where
    S: TenantStore<SaleId, SaleView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> SalesProjection<S>
where
    S: TenantStore<SaleId, SaleView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, sale_id: &SaleId) -> Option<SaleView> {
        self.store.get(tenant_id, sale_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<SaleView> {
        self.store.list(tenant_id)
    }

    pub fn page(&self, tenant_id: TenantId, request: PageRequest) -> Page<SaleView> {
        self.store.page(tenant_id, request)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != SALE_AGGREGATE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let tenant_id = envelope.tenant_id();
            match decode::<SaleEvent>(envelope)? {
                SaleEvent::SaleRecorded(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.sale_id.aggregate_id())?;
                    let mut payments = PaymentLedger::new(e.totals.total_amount);
                    if let Some(opening) = e.opening_payment {
                        payments.record(opening);
                    }
                    self.store.upsert(
                        tenant_id,
                        e.sale_id,
                        SaleView {
                            sale_id: e.sale_id,
                            sale_number: e.sale_number,
                            customer_id: e.customer_id,
                            lpo_quotation_number: e.lpo_quotation_number,
                            delivery_number: e.delivery_number,
                            mode_of_payment: e.mode_of_payment,
                            totals: e.totals,
                            lines: e.lines,
                            payments,
                            created_at: e.occurred_at,
                        },
                    );
                }
                SaleEvent::LineSupplyUpdated(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.sale_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, e.sale_id)?;
                    let line = view
                        .lines
                        .iter_mut()
                        .find(|l| l.line_no == e.line_no)
                        .ok_or_else(|| ProjectionError::MissingRecord(format!("sale {} line {}", e.sale_id, e.line_no)))?;
                    line.quantity_supplied = e.quantity_supplied;
                    line.supply_status = e.supply_status;
                    self.store.upsert(tenant_id, e.sale_id, view);
                }
                SaleEvent::SalePaymentRecorded(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.sale_id.aggregate_id())?;
                    let mut view = self.existing(tenant_id, e.sale_id)?;
                    view.payments.record(e.payment);
                    self.store.upsert(tenant_id, e.sale_id, view);
                }
            }
            Ok(())
        })
    }

    fn existing(&self, tenant_id: TenantId, sale_id: SaleId) -> Result<SaleView, ProjectionError> {
        self.store
            .get(tenant_id, &sale_id)
            .ok_or_else(|| ProjectionError::MissingRecord(format!("sale {sale_id}")))
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
