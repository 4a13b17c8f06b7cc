//! Payment ledger shared by sales and invoices.
//!
//! A document's paid amount is never stored on its own: it is the sum of the
//! payments recorded against it, and the remaining balance and status derive
//! from that sum.

pub mod ledger;
pub mod method;

pub use ledger::{BalanceStatus, Payment, PaymentLedger};
pub use method::PaymentMethod;
