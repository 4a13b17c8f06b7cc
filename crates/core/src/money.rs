//! Fixed-precision money and VAT arithmetic.
//!
//! Amounts are held as integer cents. Decimal input is rounded to two places
//! exactly once, when it enters the system (see [`Money::from_f64`]); from then
//! on all arithmetic and comparisons are exact.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Upper bound accepted from decimal input (one trillion in major units).
const MAX_MAJOR_UNITS: f64 = 1_000_000_000_000.0;

/// A monetary amount with two decimal places.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole major units (e.g. `Money::from_major(100)` is `100.00`).
    pub const fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    /// Round a decimal amount half-up to two places.
    ///
    /// A small epsilon is added before rounding so that values such as `1.005`,
    /// which are stored as `1.00499999...` in binary, round up as written.
    pub fn from_f64(amount: f64) -> DomainResult<Self> {
        if !amount.is_finite() {
            return Err(DomainError::validation("amount", "must be a finite number"));
        }
        if amount.abs() > MAX_MAJOR_UNITS {
            return Err(DomainError::validation("amount", "is out of range"));
        }
        let cents = ((amount + f64::EPSILON) * 100.0 + 0.5).floor();
        Ok(Self(cents as i64))
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// `self × quantity`, e.g. a line subtotal.
    pub fn checked_mul(self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }

    /// `max(0, self − other)`.
    pub fn saturating_balance(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn try_sum<I>(amounts: I) -> DomainResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().try_fold(Money::ZERO, |acc, m| {
            acc.checked_add(m)
                .ok_or_else(|| DomainError::validation("amount", "total overflows"))
        })
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Money::from_f64(raw).map_err(serde::de::Error::custom)
    }
}

/// A tax rate in basis points (`1600` = 16%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VatRate(u32);

impl ValueObject for VatRate {}

impl VatRate {
    /// Standard VAT rate: 16%.
    pub const STANDARD: VatRate = VatRate(1600);

    pub fn from_basis_points(bps: u32) -> DomainResult<Self> {
        if bps > 10_000 {
            return Err(DomainError::validation("vat_rate", "cannot exceed 100%"));
        }
        Ok(Self(bps))
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// `round2(subtotal × rate)`, half-up.
    pub fn vat_on(self, subtotal: Money) -> Money {
        let scaled = i128::from(subtotal.cents()) * i128::from(self.0) + 5_000;
        Money(scaled.div_euclid(10_000) as i64)
    }
}

impl Default for VatRate {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Subtotal, VAT and grand total of a document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub vat_amount: Money,
    pub total_amount: Money,
}

impl Totals {
    pub fn compute(subtotal: Money, rate: VatRate) -> DomainResult<Self> {
        let vat_amount = rate.vat_on(subtotal);
        let total_amount = subtotal
            .checked_add(vat_amount)
            .ok_or_else(|| DomainError::validation("total_amount", "total overflows"))?;
        Ok(Self {
            subtotal,
            vat_amount,
            total_amount,
        })
    }
}
