use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use duka_core::{AggregateId, Money, TenantId};
use duka_events::EventEnvelope;
use duka_invoicing::{InvoiceEvent, InvoiceId};
use duka_parties::PartyId;
use duka_payments::{BalanceStatus, PaymentLedger};

use super::cursor::{StreamCursors, replay_order, tenants_of};
use super::{ProjectionError, decode, ensure_same_stream};
use crate::ledger::INVOICE_AGGREGATE;
use crate::read_model::{Page, PageRequest, TenantStore};

/// Queryable invoice read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceView {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: PartyId,
    pub sale_id: Option<AggregateId>,
    pub payments: PaymentLedger,
    pub issued_at: DateTime<Utc>,
}

impl InvoiceView {
    pub fn total_amount(&self) -> Money {
        self.payments.total()
    }

    pub fn paid_amount(&self) -> Money {
        self.payments.paid()
    }

    pub fn remaining_balance(&self) -> Money {
        self.payments.remaining()
    }

    pub fn status(&self) -> BalanceStatus {
        self.payments.status()
    }
}

#[derive(Debug)]
pub struct InvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> InvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: &InvoiceId) -> Option<InvoiceView> {
        self.store.get(tenant_id, invoice_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceView> {
        self.store.list(tenant_id)
    }

    pub fn page(&self, tenant_id: TenantId, request: PageRequest) -> Page<InvoiceView> {
        self.store.page(tenant_id, request)
    }

    /// Invoices that still have a balance to collect.
    pub fn open(&self, tenant_id: TenantId) -> Vec<InvoiceView> {
        self.list(tenant_id)
            .into_iter()
            .filter(|i| i.status() != BalanceStatus::Paid)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != INVOICE_AGGREGATE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let tenant_id = envelope.tenant_id();
            match decode::<InvoiceEvent>(envelope)? {
                InvoiceEvent::InvoiceIssued(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.invoice_id.aggregate_id())?;
                    self.store.upsert(
                        tenant_id,
                        e.invoice_id,
                        InvoiceView {
                            invoice_id: e.invoice_id,
                            invoice_number: e.invoice_number,
                            customer_id: e.customer_id,
                            sale_id: e.sale_id,
                            payments: PaymentLedger::new(e.total_amount),
                            issued_at: e.occurred_at,
                        },
                    );
                }
                InvoiceEvent::InvoicePaymentRecorded(e) => {
                    ensure_same_stream(envelope, e.tenant_id, e.invoice_id.aggregate_id())?;
                    let mut view = self
                        .store
                        .get(tenant_id, &e.invoice_id)
                        .ok_or_else(|| ProjectionError::MissingRecord(format!("invoice {}", e.invoice_id)))?;
                    view.payments.record(e.payment);
                    self.store.upsert(tenant_id, e.invoice_id, view);
                }
            }
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
