use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use duka_core::{DomainError, Money, Totals};
use duka_infra::ledger::{
    NewInvoice, NewLpo, NewMovement, NewParty, NewPayment, NewProduct, NewSale, ProductChanges, StockAdjustment,
};
use duka_infra::projections::{InvoiceView, LpoView, ProductStockView, SaleView};
use duka_infra::read_model::{Page, PageRequest};
use duka_inventory::{MovementDirection, MovementReason, Product, ProductId, StockMovement};
use duka_invoicing::Invoice;
use duka_parties::{Party, PartyId, PartyKind};
use duka_payments::{BalanceStatus, Payment, PaymentLedger, PaymentMethod};
use duka_purchasing::Lpo;
use duka_sales::{ModeOfPayment, Sale, SaleId, SaleLineInput, SaleLineItem, SupplyStatus};

use crate::app::errors::ApiError;

/// Parse a path id, reporting failures against `field`.
pub fn parse_id<T: FromStr>(raw: &str, field: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| DomainError::validation(field, format!("'{raw}' is not a valid id")).into())
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterPartyRequest {
    pub name: String,
    pub phone: Option<String>,
}

impl RegisterPartyRequest {
    pub fn into_party(self, kind: PartyKind) -> NewParty {
        NewParty {
            kind,
            name: self.name,
            phone: self.phone,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub code: String,
    pub name: String,
    pub unit_price: Money,
    #[serde(default)]
    pub minimum_stock: i64,
    #[serde(default)]
    pub initial_stock: i64,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(body: CreateProductRequest) -> Self {
        NewProduct {
            code: body.code,
            name: body.name,
            unit_price: body.unit_price,
            minimum_stock: body.minimum_stock,
            initial_stock: body.initial_stock,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub name: Option<String>,
    pub unit_price: Option<Money>,
    pub minimum_stock: Option<i64>,
}

impl From<UpdatePricingRequest> for ProductChanges {
    fn from(body: UpdatePricingRequest) -> Self {
        ProductChanges {
            name: body.name,
            unit_price: body.unit_price,
            minimum_stock: body.minimum_stock,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub enum AdjustmentType {
    In,
    Adjustment,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    pub quantity: i64,
    pub supplier: Option<PartyId>,
    pub notes: Option<String>,
}

impl TryFrom<AdjustStockRequest> for StockAdjustment {
    type Error = ApiError;

    fn try_from(body: AdjustStockRequest) -> Result<Self, Self::Error> {
        Ok(match body.kind {
            AdjustmentType::In => StockAdjustment::In {
                quantity: body.quantity,
                supplier_id: body
                    .supplier
                    .ok_or_else(|| DomainError::validation("supplier", "required when type is In"))?,
                notes: body.notes,
            },
            AdjustmentType::Adjustment => StockAdjustment::Adjustment {
                new_quantity: body.quantity,
                notes: body.notes,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub direction: MovementDirection,
    pub reason: MovementReason,
    pub quantity: i64,
    pub supplier: Option<PartyId>,
    pub notes: Option<String>,
}

impl From<RecordMovementRequest> for NewMovement {
    fn from(body: RecordMovementRequest) -> Self {
        NewMovement {
            direction: body.direction,
            reason: body.reason,
            quantity: body.quantity,
            supplier_id: body.supplier,
            notes: body.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SaleLineRequest {
    pub product: ProductId,
    pub quantity_ordered: i64,
    #[serde(default)]
    pub quantity_supplied: i64,
    pub supply_status: Option<String>,
    pub unit_price: Money,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub customer: PartyId,
    pub lpo_quotation_number: Option<String>,
    pub delivery_number: Option<String>,
    pub mode_of_payment: String,
    #[serde(default)]
    pub amount_paid: Money,
    pub reference_number: Option<String>,
    pub line_items: Vec<SaleLineRequest>,
}

impl TryFrom<CreateSaleRequest> for NewSale {
    type Error = ApiError;

    fn try_from(body: CreateSaleRequest) -> Result<Self, Self::Error> {
        let lines = body
            .line_items
            .into_iter()
            .enumerate()
            .map(|(idx, line)| {
                let supply_status = line
                    .supply_status
                    .as_deref()
                    .map(SupplyStatus::from_str)
                    .transpose()
                    .map_err(|e| match e {
                        DomainError::Validation { message, .. } => {
                            DomainError::validation(format!("line_items[{idx}].supply_status"), message)
                        }
                        other => other,
                    })?;
                Ok(SaleLineInput {
                    product_id: line.product,
                    quantity_ordered: line.quantity_ordered,
                    quantity_supplied: line.quantity_supplied,
                    unit_price: line.unit_price,
                    supply_status,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(NewSale {
            customer_id: body.customer,
            lpo_quotation_number: body.lpo_quotation_number,
            delivery_number: body.delivery_number,
            mode_of_payment: body.mode_of_payment.parse::<ModeOfPayment>()?,
            amount_paid: body.amount_paid,
            reference_number: body.reference_number,
            lines,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LineSupplyRequest {
    pub quantity_supplied: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Money,
    pub payment_method: String,
    pub reference_number: Option<String>,
}

impl TryFrom<RecordPaymentRequest> for NewPayment {
    type Error = ApiError;

    fn try_from(body: RecordPaymentRequest) -> Result<Self, Self::Error> {
        Ok(NewPayment {
            amount: body.amount,
            method: body.payment_method.parse::<PaymentMethod>()?,
            reference_number: body.reference_number,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLpoRequest {
    pub lpo_number: String,
    pub supplier: PartyId,
    pub product: ProductId,
    pub ordered_quantity: i64,
    pub order_date: Option<NaiveDate>,
    pub expected_delivery: Option<NaiveDate>,
}

impl From<CreateLpoRequest> for NewLpo {
    fn from(body: CreateLpoRequest) -> Self {
        NewLpo {
            lpo_number: body.lpo_number,
            supplier_id: body.supplier,
            product_id: body.product,
            ordered_quantity: body.ordered_quantity,
            order_date: body.order_date,
            expected_delivery: body.expected_delivery,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeliveryRequest {
    pub delivered_quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelLpoRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub invoice_number: String,
    pub customer: PartyId,
    pub sale: Option<SaleId>,
    pub total_amount: Option<Money>,
}

impl From<CreateInvoiceRequest> for NewInvoice {
    fn from(body: CreateInvoiceRequest) -> Self {
        NewInvoice {
            invoice_number: body.invoice_number,
            customer_id: body.customer,
            sale_id: body.sale,
            total_amount: body.total_amount,
        }
    }
}

// -------------------------
// Listing
// -------------------------

/// `?limit=&offset=`. Without `limit` the whole list is returned as a bare
/// array; with it, one page wrapped as `{results, next}`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl ListQuery {
    pub fn page_request(&self) -> Option<PageRequest> {
        self.limit.map(|limit| PageRequest {
            offset: self.offset,
            limit: limit.max(1),
        })
    }
}

pub fn list_to_json<V>(items: Vec<V>, to_json: impl Fn(V) -> JsonValue) -> JsonValue {
    JsonValue::Array(items.into_iter().map(to_json).collect())
}

/// `next` is a path relative to the server root, or `null` on the last page.
pub fn page_to_json<V>(path: &str, request: PageRequest, page: Page<V>, to_json: impl Fn(V) -> JsonValue) -> JsonValue {
    let next = page
        .next_offset
        .map(|offset| format!("{path}?limit={}&offset={offset}", request.limit));
    json!({
        "results": list_to_json(page.items, to_json),
        "next": next,
    })
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn party_to_json(party: Party) -> JsonValue {
    json!({
        "id": party.id_typed().to_string(),
        "kind": party.kind(),
        "name": party.name(),
        "phone": party.phone(),
        "is_active": party.is_active(),
    })
}

pub fn product_to_json(product: Product) -> JsonValue {
    json!({
        "id": product.id_typed().to_string(),
        "code": product.code(),
        "name": product.name(),
        "unit_price": product.unit_price(),
        "current_stock": product.current_stock(),
        "minimum_stock": product.minimum_stock(),
        "is_active": product.is_active(),
        "low_stock": product.is_low_stock(),
    })
}

pub fn stock_view_to_json(view: ProductStockView) -> JsonValue {
    json!({
        "id": view.product_id.to_string(),
        "code": view.code,
        "name": view.name,
        "unit_price": view.unit_price,
        "current_stock": view.current_stock,
        "minimum_stock": view.minimum_stock,
        "is_active": view.active,
        "low_stock": view.is_low_stock(),
    })
}

pub fn movement_to_json(movement: StockMovement) -> JsonValue {
    json!({
        "id": movement.movement_id.to_string(),
        "product": movement.product_id.to_string(),
        "movement_type": movement.direction,
        "reason": movement.reason,
        "quantity": movement.quantity,
        "supplier": movement.supplier_id.map(|id| id.to_string()),
        "sale": movement.sale_id.map(|id| id.to_string()),
        "lpo": movement.lpo_id.map(|id| id.to_string()),
        "notes": movement.notes,
        "recorded_by": movement.recorded_by.map(|id| id.to_string()),
        "created_at": movement.created_at,
    })
}

fn line_to_json(line: &SaleLineItem) -> JsonValue {
    json!({
        "line_no": line.line_no,
        "product": line.product_id.to_string(),
        "quantity_ordered": line.quantity_ordered,
        "quantity_supplied": line.quantity_supplied,
        "unit_price": line.unit_price,
        "line_subtotal": line.line_subtotal(),
        "supply_status": line.supply_status,
    })
}

fn payment_to_json(payment: &Payment) -> JsonValue {
    json!({
        "id": payment.payment_id.to_string(),
        "amount": payment.amount,
        "payment_method": payment.method,
        "reference_number": payment.reference_number,
        "recorded_at": payment.recorded_at,
    })
}

/// Money and settlement fields shared by sales and invoices.
fn balance_json(totals: Totals, paid: Money, outstanding: Money, status: BalanceStatus) -> JsonValue {
    json!({
        "subtotal": totals.subtotal,
        "vat_amount": totals.vat_amount,
        "total_amount": totals.total_amount,
        "amount_paid": paid,
        "outstanding_balance": outstanding,
        "payment_status": status,
    })
}

fn merge(mut base: JsonValue, extra: JsonValue) -> JsonValue {
    if let (Some(base), JsonValue::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

pub fn sale_to_json(sale: Sale) -> JsonValue {
    let base = json!({
        "id": sale.id_typed().to_string(),
        "sale_number": sale.sale_number(),
        "customer": sale.customer_id().map(|id| id.to_string()),
        "lpo_quotation_number": sale.lpo_quotation_number(),
        "delivery_number": sale.delivery_number(),
        "mode_of_payment": sale.mode_of_payment(),
        "line_items": sale.lines().iter().map(line_to_json).collect::<Vec<_>>(),
        "payments": sale.payments().iter().map(payment_to_json).collect::<Vec<_>>(),
        "created_at": sale.created_at(),
    });
    merge(
        base,
        balance_json(sale.totals(), sale.amount_paid(), sale.outstanding_balance(), sale.payment_status()),
    )
}

pub fn sale_view_to_json(view: SaleView) -> JsonValue {
    let base = json!({
        "id": view.sale_id.to_string(),
        "sale_number": view.sale_number,
        "customer": view.customer_id.to_string(),
        "lpo_quotation_number": view.lpo_quotation_number,
        "delivery_number": view.delivery_number,
        "mode_of_payment": view.mode_of_payment,
        "line_items": view.lines.iter().map(line_to_json).collect::<Vec<_>>(),
        "payments": view.payments.payments().iter().map(payment_to_json).collect::<Vec<_>>(),
        "created_at": view.created_at,
    });
    merge(
        base,
        balance_json(view.totals, view.amount_paid(), view.outstanding_balance(), view.payment_status()),
    )
}

fn lpo_json(
    id: String,
    lpo_number: &str,
    supplier: Option<String>,
    product: Option<String>,
    (ordered, delivered): (i64, i64),
    status: impl serde::Serialize,
    (order_date, expected_delivery): (Option<NaiveDate>, Option<NaiveDate>),
) -> JsonValue {
    json!({
        "id": id,
        "lpo_number": lpo_number,
        "supplier": supplier,
        "product": product,
        "ordered_quantity": ordered,
        "delivered_quantity": delivered,
        "pending_quantity": ordered - delivered,
        "status": status,
        "order_date": order_date,
        "expected_delivery": expected_delivery,
    })
}

pub fn lpo_to_json(lpo: Lpo) -> JsonValue {
    lpo_json(
        lpo.id_typed().to_string(),
        lpo.lpo_number(),
        lpo.supplier_id().map(|id| id.to_string()),
        lpo.product_id().map(|id| id.to_string()),
        (lpo.ordered_quantity(), lpo.delivered_quantity()),
        lpo.status(),
        (lpo.order_date(), lpo.expected_delivery()),
    )
}

pub fn lpo_view_to_json(view: LpoView) -> JsonValue {
    lpo_json(
        view.lpo_id.to_string(),
        &view.lpo_number,
        Some(view.supplier_id.to_string()),
        Some(view.product_id.to_string()),
        (view.ordered_quantity, view.delivered_quantity),
        view.status,
        (Some(view.order_date), view.expected_delivery),
    )
}

fn invoice_json(
    id: String,
    invoice_number: &str,
    customer: Option<String>,
    sale: Option<String>,
    payments: &[Payment],
    (total, paid, remaining, status): (Money, Money, Money, BalanceStatus),
    issued_at: Option<DateTime<Utc>>,
) -> JsonValue {
    json!({
        "id": id,
        "invoice_number": invoice_number,
        "customer": customer,
        "sale": sale,
        "total_amount": total,
        "paid_amount": paid,
        "remaining_balance": remaining,
        "status": status,
        "payments": payments.iter().map(payment_to_json).collect::<Vec<_>>(),
        "issued_at": issued_at,
    })
}

fn ledger_figures(ledger: &PaymentLedger) -> (Money, Money, Money, BalanceStatus) {
    (ledger.total(), ledger.paid(), ledger.remaining(), ledger.status())
}

pub fn invoice_to_json(invoice: Invoice) -> JsonValue {
    invoice_json(
        invoice.id_typed().to_string(),
        invoice.invoice_number(),
        invoice.customer_id().map(|id| id.to_string()),
        invoice.sale_id().map(|id| id.to_string()),
        invoice.payments(),
        (
            invoice.total_amount(),
            invoice.paid_amount(),
            invoice.remaining_balance(),
            invoice.status(),
        ),
        invoice.issued_at(),
    )
}

pub fn invoice_view_to_json(view: InvoiceView) -> JsonValue {
    invoice_json(
        view.invoice_id.to_string(),
        &view.invoice_number,
        Some(view.customer_id.to_string()),
        view.sale_id.map(|id| id.to_string()),
        view.payments.payments(),
        ledger_figures(&view.payments),
        Some(view.issued_at),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_in_requires_a_supplier() {
        let body: AdjustStockRequest = serde_json::from_value(json!({"type": "In", "quantity": 4})).unwrap();
        let err = StockAdjustment::try_from(body).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Dispatch(duka_infra::DispatchError::Validation { ref field, .. }) if field == "supplier"
        ));
    }

    #[test]
    fn adjustment_carries_the_absolute_quantity() {
        let body: AdjustStockRequest =
            serde_json::from_value(json!({"type": "Adjustment", "quantity": 50, "notes": "count"})).unwrap();
        assert_eq!(
            StockAdjustment::try_from(body).unwrap(),
            StockAdjustment::Adjustment {
                new_quantity: 50,
                notes: Some("count".to_string())
            }
        );
    }

    #[test]
    fn sale_request_accepts_display_names() {
        let product = ProductId::generate();
        let body: CreateSaleRequest = serde_json::from_value(json!({
            "customer": PartyId::generate(),
            "mode_of_payment": "Not Paid",
            "line_items": [{
                "product": product,
                "quantity_ordered": 10,
                "quantity_supplied": 4,
                "supply_status": "Partially Supplied",
                "unit_price": 100.0
            }]
        }))
        .unwrap();
        let sale = NewSale::try_from(body).unwrap();
        assert_eq!(sale.mode_of_payment, ModeOfPayment::NotPaid);
        assert_eq!(sale.amount_paid, Money::ZERO);
        assert_eq!(sale.lines[0].supply_status, Some(SupplyStatus::PartiallySupplied));
        assert_eq!(sale.lines[0].unit_price, Money::from_major(100));
    }

    #[test]
    fn bad_supply_status_names_the_line() {
        let body: CreateSaleRequest = serde_json::from_value(json!({
            "customer": PartyId::generate(),
            "mode_of_payment": "Cash",
            "line_items": [
                {"product": ProductId::generate(), "quantity_ordered": 1, "unit_price": 5.0},
                {"product": ProductId::generate(), "quantity_ordered": 1, "unit_price": 5.0, "supply_status": "Lost"}
            ]
        }))
        .unwrap();
        let err = NewSale::try_from(body).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Dispatch(duka_infra::DispatchError::Validation { ref field, .. })
                if field == "line_items[1].supply_status"
        ));
    }

    #[test]
    fn pages_link_to_the_next_offset() {
        let request = PageRequest { offset: 0, limit: 2 };
        let page = Page {
            items: vec![1, 2],
            next_offset: Some(2),
        };
        let body = page_to_json("/sales", request, page, |n| json!(n));
        assert_eq!(body["results"], json!([1, 2]));
        assert_eq!(body["next"], json!("/sales?limit=2&offset=2"));

        let last = Page {
            items: vec![3],
            next_offset: None,
        };
        assert_eq!(page_to_json("/sales", request, last, |n| json!(n))["next"], JsonValue::Null);
    }

    #[test]
    fn no_limit_means_no_paging() {
        assert_eq!(ListQuery::default().page_request(), None);
        let q = ListQuery {
            limit: Some(0),
            offset: 4,
        };
        assert_eq!(q.page_request(), Some(PageRequest { offset: 4, limit: 1 }));
    }
}
