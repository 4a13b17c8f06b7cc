//! Wire types for the ledger HTTP API.
//!
//! Amounts travel as decimal numbers and are held as [`Money`]; enum-like
//! fields (`status`, `reason`, ...) stay as the display strings the server
//! sends.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duka_core::Money;

// -------------------------
// Responses
// -------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Party {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub phone: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub unit_price: Money,
    pub current_stock: i64,
    pub minimum_stock: i64,
    pub is_active: bool,
    pub low_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Movement {
    pub id: Uuid,
    pub product: Uuid,
    pub movement_type: String,
    pub reason: String,
    pub quantity: i64,
    pub supplier: Option<Uuid>,
    pub sale: Option<Uuid>,
    pub lpo: Option<Uuid>,
    pub notes: Option<String>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A product after a stock command, with the movement it produced.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockOutcome {
    pub product: Product,
    pub movement: Option<Movement>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Money,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaleLine {
    pub line_no: u32,
    pub product: Uuid,
    pub quantity_ordered: i64,
    pub quantity_supplied: i64,
    pub unit_price: Money,
    pub line_subtotal: Money,
    pub supply_status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub sale_number: String,
    pub customer: Option<Uuid>,
    pub lpo_quotation_number: Option<String>,
    pub delivery_number: Option<String>,
    pub mode_of_payment: String,
    pub line_items: Vec<SaleLine>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    pub subtotal: Money,
    pub vat_amount: Money,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub outstanding_balance: Money,
    pub payment_status: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Lpo {
    pub id: Uuid,
    pub lpo_number: String,
    pub supplier: Option<Uuid>,
    pub product: Option<Uuid>,
    pub ordered_quantity: i64,
    pub delivered_quantity: i64,
    pub pending_quantity: i64,
    pub status: String,
    pub order_date: Option<NaiveDate>,
    pub expected_delivery: Option<NaiveDate>,
    /// Present on delivery responses.
    #[serde(default)]
    pub movement: Option<Movement>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer: Option<Uuid>,
    pub sale: Option<Uuid>,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub remaining_balance: Money,
    pub status: String,
    #[serde(default)]
    pub payments: Vec<Payment>,
    pub issued_at: Option<DateTime<Utc>>,
}

// -------------------------
// Requests
// -------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NewParty {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub unit_price: Money,
    pub minimum_stock: i64,
    pub initial_stock: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PricingChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_stock: Option<i64>,
}

/// Body of `adjust_stock`: a supplier restock, or a count to an absolute total.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StockAdjustment {
    In {
        quantity: i64,
        supplier: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    Adjustment {
        quantity: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMovement {
    /// `IN` or `OUT`.
    pub direction: String,
    /// `DAMAGE`, `TRANSFER`, `RETURN`, ...
    pub reason: String,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSaleLine {
    pub product: Uuid,
    pub quantity_ordered: i64,
    pub quantity_supplied: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supply_status: Option<String>,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSale {
    pub customer: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lpo_quotation_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_number: Option<String>,
    pub mode_of_payment: String,
    pub amount_paid: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    pub line_items: Vec<NewSaleLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
    pub amount: Money,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewLpo {
    pub lpo_number: String,
    pub supplier: Uuid,
    pub product: Uuid,
    pub ordered_quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_delivery: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub customer: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Money>,
}
