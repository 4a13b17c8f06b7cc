//! Inputs and outputs of [`LedgerService`](super::LedgerService) operations.
//!
//! Requests carry only what the caller chooses; ids, timestamps, movement ids
//! and the recording user are filled in by the service.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use duka_core::{Money, TenantId, UserId};
use duka_inventory::{MovementDirection, MovementReason, Product, ProductId, StockMovement};
use duka_parties::{PartyId, PartyKind};
use duka_payments::PaymentMethod;
use duka_purchasing::Lpo;
use duka_sales::{ModeOfPayment, SaleId, SaleLineInput};

/// Who is asking: the tenant every stream is scoped to and, optionally, the
/// user recorded on stock movements.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Caller {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
}

impl Caller {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParty {
    pub kind: PartyKind,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub unit_price: Money,
    #[serde(default)]
    pub minimum_stock: i64,
    #[serde(default)]
    pub initial_stock: i64,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub unit_price: Option<Money>,
    pub minimum_stock: Option<i64>,
}

/// The two ways the stock screen changes a product's stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockAdjustment {
    /// Goods received from a supplier.
    In {
        quantity: i64,
        supplier_id: PartyId,
        notes: Option<String>,
    },
    /// Set stock to an absolute count; stored as the difference.
    Adjustment {
        new_quantity: i64,
        notes: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub direction: MovementDirection,
    pub reason: MovementReason,
    pub quantity: i64,
    pub supplier_id: Option<PartyId>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub customer_id: PartyId,
    pub lpo_quotation_number: Option<String>,
    pub delivery_number: Option<String>,
    pub mode_of_payment: ModeOfPayment,
    pub amount_paid: Money,
    pub reference_number: Option<String>,
    pub lines: Vec<SaleLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLpo {
    pub lpo_number: String,
    pub supplier_id: PartyId,
    pub product_id: ProductId,
    pub ordered_quantity: i64,
    /// Defaults to today (UTC).
    pub order_date: Option<NaiveDate>,
    pub expected_delivery: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub customer_id: PartyId,
    pub sale_id: Option<SaleId>,
    /// Required unless `sale_id` is given, in which case it defaults to the
    /// sale's total.
    pub total_amount: Option<Money>,
}

/// A product after a stock operation, with the movement it recorded.
/// `movement` is `None` when the operation was a no-op.
#[derive(Debug, Clone)]
pub struct StockOutcome {
    pub product: Product,
    pub movement: Option<StockMovement>,
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub lpo: Lpo,
    pub movement: StockMovement,
}
