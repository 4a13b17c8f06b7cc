use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duka_core::{DomainError, Money};

use crate::method::PaymentMethod;

/// One payment recorded against a sale or invoice. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Settlement state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceStatus {
    Outstanding,
    Partial,
    Paid,
}

/// Running payment ledger of one document.
///
/// `paid()` always equals the sum of `payments()`; nothing else mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaymentLedger {
    total: Money,
    paid: Money,
    payments: Vec<Payment>,
}

impl PaymentLedger {
    pub fn new(total: Money) -> Self {
        Self {
            total,
            paid: Money::ZERO,
            payments: Vec::new(),
        }
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn paid(&self) -> Money {
        self.paid
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// `max(0, total − paid)`.
    pub fn remaining(&self) -> Money {
        self.total.saturating_balance(self.paid)
    }

    pub fn status(&self) -> BalanceStatus {
        if self.remaining().is_zero() {
            BalanceStatus::Paid
        } else if self.paid.is_zero() {
            BalanceStatus::Outstanding
        } else {
            BalanceStatus::Partial
        }
    }

    /// Validate a new payment against the balance at the time of recording.
    pub fn check(&self, amount: Money) -> Result<(), DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::validation("amount", "must be greater than 0"));
        }
        let remaining = self.remaining();
        if amount > remaining {
            return Err(DomainError::validation(
                "amount",
                format!("{amount} exceeds remaining balance of {remaining}"),
            ));
        }
        Ok(())
    }

    /// Append an already validated (or opening) payment.
    pub fn record(&mut self, payment: Payment) {
        self.paid = Money::from_cents(self.paid.cents().saturating_add(payment.amount.cents()));
        self.payments.push(payment);
    }
}
