use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duka_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use duka_events::Event;
use duka_parties::PartyId;
use duka_payments::{BalanceStatus, Payment, PaymentLedger, PaymentMethod};

duka_core::aggregate_id!(
    /// Invoice identifier.
    InvoiceId
);

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    invoice_number: String,
    customer_id: Option<PartyId>,
    sale_id: Option<AggregateId>,
    payments: PaymentLedger,
    issued_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            invoice_number: String::new(),
            customer_id: None,
            sale_id: None,
            payments: PaymentLedger::default(),
            issued_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn sale_id(&self) -> Option<AggregateId> {
        self.sale_id
    }

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

    pub fn payments(&self) -> &[Payment] {
        self.payments.payments()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: PartyId,
    /// Sale this invoice bills, when it was raised from one.
    pub sale_id: Option<AggregateId>,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInvoicePayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoicePayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment_id: Uuid,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    RecordInvoicePayment(RecordInvoicePayment),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: PartyId,
    pub sale_id: Option<AggregateId>,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicePaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaymentRecorded {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    InvoicePaymentRecorded(InvoicePaymentRecorded),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::InvoicePaymentRecorded(_) => "invoicing.invoice.payment_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::InvoicePaymentRecorded(e) => e.payment.recorded_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.invoice_number = e.invoice_number.clone();
                self.customer_id = Some(e.customer_id);
                self.sale_id = e.sale_id;
                self.payments = PaymentLedger::new(e.total_amount);
                self.issued_at = Some(e.occurred_at);
                self.created = true;
            }
            InvoiceEvent::InvoicePaymentRecorded(e) => {
                self.payments.record(e.payment.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RecordInvoicePayment(cmd) => self.handle_payment(cmd),
        }
    }
}

impl Invoice {
    fn ensure_invoice_id(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("invoice {invoice_id}")));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        self.ensure_invoice_id(invoice_id)
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        self.ensure_invoice_id(cmd.invoice_id)?;
        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice_number", "cannot be empty"));
        }
        if !cmd.total_amount.is_positive() {
            return Err(DomainError::validation("total_amount", "must be greater than 0"));
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.trim().to_string(),
            customer_id: cmd.customer_id,
            sale_id: cmd.sale_id,
            total_amount: cmd.total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordInvoicePayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        self.payments.check(cmd.amount)?;

        Ok(vec![InvoiceEvent::InvoicePaymentRecorded(InvoicePaymentRecorded {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment: Payment {
                payment_id: cmd.payment_id,
                amount: cmd.amount,
                method: cmd.method,
                reference_number: cmd.reference_number.clone(),
                recorded_at: cmd.occurred_at,
            },
        })])
    }
}
