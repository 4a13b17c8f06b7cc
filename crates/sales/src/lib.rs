//! Sales domain module (event-sourced).
//!
//! - [`fulfillment`]: per-line supply state machine.
//! - [`sale`]: the sale aggregate (totals, VAT, payments, line supply).
//! - [`numbering`]: collision-free `SALE-{year}-{sequence}` numbers.

pub mod fulfillment;
pub mod numbering;
pub mod sale;

pub use fulfillment::{SupplyChange, SupplyStatus};
pub use numbering::{AllocateSaleNumber, SaleNumberAllocated, SaleNumberEvent, SaleNumberSequence};
pub use sale::{
    ModeOfPayment, RecordSale, RecordSalePayment, Sale, SaleCommand, SaleEvent, SaleId,
    SaleLineInput, SaleLineItem, SalePaymentRecorded, SaleRecorded, UpdateLineSupply,
    LineSupplyUpdated,
};
