//! Invoicing domain module: customer invoices settled through the payment ledger.

pub mod invoice;

pub use invoice::{
    Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceIssued, InvoicePaymentRecorded,
    IssueInvoice, RecordInvoicePayment,
};
