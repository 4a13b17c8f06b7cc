use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duka_core::{Aggregate, AggregateRoot, DomainError, Money, TenantId, Totals, VatRate};
use duka_events::Event;
use duka_inventory::ProductId;
use duka_parties::PartyId;
use duka_payments::{BalanceStatus, Payment, PaymentLedger, PaymentMethod};

use crate::fulfillment::{SupplyChange, SupplyStatus};

duka_core::aggregate_id!(
    /// Sale identifier (tenant-scoped via `tenant_id` fields in events/commands).
    SaleId
);

/// How the customer settles the sale at the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeOfPayment {
    Cash,
    Cheque,
    Mpesa,
    #[serde(rename = "Not Paid")]
    NotPaid,
}

impl ModeOfPayment {
    /// Method used for the opening payment, `None` for credit sales.
    pub fn payment_method(self) -> Option<PaymentMethod> {
        match self {
            ModeOfPayment::Cash => Some(PaymentMethod::Cash),
            ModeOfPayment::Cheque => Some(PaymentMethod::Cheque),
            ModeOfPayment::Mpesa => Some(PaymentMethod::Mpesa),
            ModeOfPayment::NotPaid => None,
        }
    }
}

impl FromStr for ModeOfPayment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "cash" => Ok(ModeOfPayment::Cash),
            "cheque" | "check" => Ok(ModeOfPayment::Cheque),
            "mpesa" => Ok(ModeOfPayment::Mpesa),
            "notpaid" => Ok(ModeOfPayment::NotPaid),
            _ => Err(DomainError::validation(
                "mode_of_payment",
                format!("unknown mode of payment '{s}'"),
            )),
        }
    }
}

/// A line as submitted with a new sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineInput {
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub quantity_supplied: i64,
    pub unit_price: Money,
    /// Optional; when present it must agree with the supplied quantity.
    pub supply_status: Option<SupplyStatus>,
}

/// A persisted sale line. `unit_price` is the price at the time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineItem {
    /// 1-based position within the sale.
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub quantity_supplied: i64,
    pub unit_price: Money,
    pub supply_status: SupplyStatus,
}

impl SaleLineItem {
    /// Billed on the ordered quantity, whatever has been supplied so far.
    pub fn line_subtotal(&self) -> Money {
        Money::from_cents(self.unit_price.cents().saturating_mul(self.quantity_ordered))
    }
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    tenant_id: Option<TenantId>,
    sale_number: String,
    customer_id: Option<PartyId>,
    lpo_quotation_number: Option<String>,
    delivery_number: Option<String>,
    lines: Vec<SaleLineItem>,
    totals: Totals,
    vat_rate: VatRate,
    mode_of_payment: ModeOfPayment,
    payments: PaymentLedger,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            tenant_id: None,
            sale_number: String::new(),
            customer_id: None,
            lpo_quotation_number: None,
            delivery_number: None,
            lines: Vec::new(),
            totals: Totals {
                subtotal: Money::ZERO,
                vat_amount: Money::ZERO,
                total_amount: Money::ZERO,
            },
            vat_rate: VatRate::STANDARD,
            mode_of_payment: ModeOfPayment::NotPaid,
            payments: PaymentLedger::default(),
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn sale_number(&self) -> &str {
        &self.sale_number
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn lpo_quotation_number(&self) -> Option<&str> {
        self.lpo_quotation_number.as_deref()
    }

    pub fn delivery_number(&self) -> Option<&str> {
        self.delivery_number.as_deref()
    }

    pub fn lines(&self) -> &[SaleLineItem] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&SaleLineItem> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn vat_rate(&self) -> VatRate {
        self.vat_rate
    }

    pub fn mode_of_payment(&self) -> ModeOfPayment {
        self.mode_of_payment
    }

    pub fn amount_paid(&self) -> Money {
        self.payments.paid()
    }

    /// `max(0, total_amount − amount_paid)`.
    pub fn outstanding_balance(&self) -> Money {
        self.payments.remaining()
    }

    pub fn payment_status(&self) -> BalanceStatus {
        self.payments.status()
    }

    pub fn payments(&self) -> &[Payment] {
        self.payments.payments()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub sale_number: String,
    pub customer_id: PartyId,
    pub lpo_quotation_number: Option<String>,
    pub delivery_number: Option<String>,
    pub mode_of_payment: ModeOfPayment,
    pub amount_paid: Money,
    pub reference_number: Option<String>,
    pub vat_rate: VatRate,
    pub lines: Vec<SaleLineInput>,
    /// Id given to the opening payment, if the sale is paid at the counter.
    pub payment_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLineSupply (set the supplied quantity of one line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineSupply {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line_no: u32,
    pub quantity_supplied: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSalePayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSalePayment {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub payment_id: Uuid,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    UpdateLineSupply(UpdateLineSupply),
    RecordSalePayment(RecordSalePayment),
}

/// Event: SaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub sale_number: String,
    pub customer_id: PartyId,
    pub lpo_quotation_number: Option<String>,
    pub delivery_number: Option<String>,
    pub lines: Vec<SaleLineItem>,
    pub totals: Totals,
    pub vat_rate: VatRate,
    pub mode_of_payment: ModeOfPayment,
    pub opening_payment: Option<Payment>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineSupplyUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSupplyUpdated {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub previous_supplied: i64,
    pub quantity_supplied: i64,
    pub supply_status: SupplyStatus,
    pub occurred_at: DateTime<Utc>,
}

impl LineSupplyUpdated {
    pub fn change(&self) -> SupplyChange {
        SupplyChange::between(self.previous_supplied, self.quantity_supplied)
    }
}

/// Event: SalePaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePaymentRecorded {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub payment: Payment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    LineSupplyUpdated(LineSupplyUpdated),
    SalePaymentRecorded(SalePaymentRecorded),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::LineSupplyUpdated(_) => "sales.sale.line_supply_updated",
            SaleEvent::SalePaymentRecorded(_) => "sales.sale.payment_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::LineSupplyUpdated(e) => e.occurred_at,
            SaleEvent::SalePaymentRecorded(e) => e.payment.recorded_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.tenant_id = Some(e.tenant_id);
                self.sale_number = e.sale_number.clone();
                self.customer_id = Some(e.customer_id);
                self.lpo_quotation_number = e.lpo_quotation_number.clone();
                self.delivery_number = e.delivery_number.clone();
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.vat_rate = e.vat_rate;
                self.mode_of_payment = e.mode_of_payment;
                self.payments = PaymentLedger::new(e.totals.total_amount);
                if let Some(payment) = &e.opening_payment {
                    self.payments.record(payment.clone());
                }
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            SaleEvent::LineSupplyUpdated(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.quantity_supplied = e.quantity_supplied;
                    line.supply_status = e.supply_status;
                }
            }
            SaleEvent::SalePaymentRecorded(e) => {
                self.payments.record(e.payment.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::UpdateLineSupply(cmd) => self.handle_update_supply(cmd),
            SaleCommand::RecordSalePayment(cmd) => self.handle_payment(cmd),
        }
    }
}

/// Prefix a line-level validation field with the line's position in the request.
fn at_line(idx: usize, err: DomainError) -> DomainError {
    match err {
        DomainError::Validation { field, message } => DomainError::Validation {
            field: format!("line_items[{idx}].{field}"),
            message,
        },
        other => other,
    }
}

impl Sale {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_sale_id(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, sale_id: SaleId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("sale {sale_id}")));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_sale_id(sale_id)
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }
        self.ensure_sale_id(cmd.sale_id)?;
        if cmd.sale_number.trim().is_empty() {
            return Err(DomainError::validation("sale_number", "cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("line_items", "a sale needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            if input.quantity_ordered < 1 {
                return Err(at_line(
                    idx,
                    DomainError::validation("quantity_ordered", "must be at least 1"),
                ));
            }
            if input.unit_price.is_negative() {
                return Err(at_line(
                    idx,
                    DomainError::validation("unit_price", "cannot be negative"),
                ));
            }
            let supply_status = SupplyStatus::reconcile(
                input.supply_status,
                input.quantity_ordered,
                input.quantity_supplied,
            )
            .map_err(|e| at_line(idx, e))?;

            let line_no = u32::try_from(idx + 1)
                .map_err(|_| DomainError::validation("line_items", "too many lines"))?;
            lines.push(SaleLineItem {
                line_no,
                product_id: input.product_id,
                quantity_ordered: input.quantity_ordered,
                quantity_supplied: input.quantity_supplied,
                unit_price: input.unit_price,
                supply_status,
            });
        }

        let line_totals = lines
            .iter()
            .enumerate()
            .map(|(idx, l)| {
                l.unit_price.checked_mul(l.quantity_ordered).ok_or_else(|| {
                    at_line(idx, DomainError::validation("unit_price", "line total overflows"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let subtotal = Money::try_sum(line_totals)?;
        let totals = Totals::compute(subtotal, cmd.vat_rate)?;

        let opening_payment = match cmd.mode_of_payment.payment_method() {
            // Credit sale: whatever was typed into amount_paid is ignored.
            None => None,
            Some(method) => {
                if !cmd.amount_paid.is_positive() {
                    return Err(DomainError::validation(
                        "amount_paid",
                        "must be greater than 0 unless the sale is Not Paid",
                    ));
                }
                Some(Payment {
                    payment_id: cmd.payment_id,
                    amount: cmd.amount_paid,
                    method,
                    reference_number: cmd.reference_number.clone(),
                    recorded_at: cmd.occurred_at,
                })
            }
        };

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            sale_number: cmd.sale_number.trim().to_string(),
            customer_id: cmd.customer_id,
            lpo_quotation_number: non_blank(&cmd.lpo_quotation_number),
            delivery_number: non_blank(&cmd.delivery_number),
            lines,
            totals,
            vat_rate: cmd.vat_rate,
            mode_of_payment: cmd.mode_of_payment,
            opening_payment,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_supply(&self, cmd: &UpdateLineSupply) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.sale_id)?;
        let line = self.line(cmd.line_no).ok_or_else(|| {
            DomainError::validation("line_no", format!("sale has no line {}", cmd.line_no))
        })?;

        let supply_status = SupplyStatus::derive(line.quantity_ordered, cmd.quantity_supplied)?;
        if cmd.quantity_supplied == line.quantity_supplied {
            return Ok(vec![]);
        }

        Ok(vec![SaleEvent::LineSupplyUpdated(LineSupplyUpdated {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            line_no: cmd.line_no,
            product_id: line.product_id,
            previous_supplied: line.quantity_supplied,
            quantity_supplied: cmd.quantity_supplied,
            supply_status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordSalePayment) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.sale_id)?;
        self.payments.check(cmd.amount)?;

        Ok(vec![SaleEvent::SalePaymentRecorded(SalePaymentRecorded {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
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

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_events::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(quantity_ordered: i64, quantity_supplied: i64, unit_price: Money) -> SaleLineInput {
        SaleLineInput {
            product_id: ProductId::generate(),
            quantity_ordered,
            quantity_supplied,
            unit_price,
            supply_status: None,
        }
    }

    fn record(
        lines: Vec<SaleLineInput>,
        mode_of_payment: ModeOfPayment,
        amount_paid: Money,
    ) -> (Sale, TenantId, SaleCommand) {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::generate();
        let cmd = SaleCommand::RecordSale(RecordSale {
            tenant_id,
            sale_id,
            sale_number: "SALE-2025-00001".to_string(),
            customer_id: PartyId::generate(),
            lpo_quotation_number: Some("LPO-77".to_string()),
            delivery_number: Some("  ".to_string()),
            mode_of_payment,
            amount_paid,
            reference_number: None,
            vat_rate: VatRate::STANDARD,
            lines,
            payment_id: Uuid::now_v7(),
            occurred_at: test_time(),
        });
        (Sale::empty(sale_id), tenant_id, cmd)
    }

    fn recorded(lines: Vec<SaleLineInput>, mode: ModeOfPayment, paid: Money) -> (Sale, TenantId) {
        let (mut sale, tenant_id, cmd) = record(lines, mode, paid);
        execute(&mut sale, &cmd).unwrap();
        (sale, tenant_id)
    }

    fn supply(sale: &Sale, tenant_id: TenantId, line_no: u32, quantity_supplied: i64) -> SaleCommand {
        SaleCommand::UpdateLineSupply(UpdateLineSupply {
            tenant_id,
            sale_id: sale.id_typed(),
            line_no,
            quantity_supplied,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn unpaid_sale_of_ten_at_one_hundred() {
        let (sale, _) = recorded(
            vec![line(10, 0, Money::from_major(100))],
            ModeOfPayment::NotPaid,
            Money::ZERO,
        );

        assert_eq!(sale.lines()[0].line_subtotal(), Money::from_major(1000));
        let totals = sale.totals();
        assert_eq!(totals.subtotal, Money::from_major(1000));
        assert_eq!(totals.vat_amount, Money::from_major(160));
        assert_eq!(totals.total_amount, Money::from_major(1160));
        assert_eq!(sale.amount_paid(), Money::ZERO);
        assert_eq!(sale.outstanding_balance(), Money::from_major(1160));
        assert_eq!(sale.payment_status(), BalanceStatus::Outstanding);
        assert_eq!(sale.lines()[0].supply_status, SupplyStatus::NotSupplied);
        assert_eq!(sale.delivery_number(), None);
        assert_eq!(sale.lpo_quotation_number(), Some("LPO-77"));
    }

    #[test]
    fn not_paid_forces_amount_paid_to_zero() {
        let (sale, _) = recorded(
            vec![line(1, 1, Money::from_major(50))],
            ModeOfPayment::NotPaid,
            Money::from_major(30),
        );
        assert_eq!(sale.amount_paid(), Money::ZERO);
        assert!(sale.payments().is_empty());
    }

    #[test]
    fn paid_mode_requires_positive_amount() {
        let (sale, _, cmd) = record(
            vec![line(1, 0, Money::from_major(50))],
            ModeOfPayment::Mpesa,
            Money::ZERO,
        );
        assert_eq!(sale.handle(&cmd).unwrap_err().field(), Some("amount_paid"));
    }

    #[test]
    fn partial_cash_payment_leaves_outstanding_balance() {
        let (sale, _) = recorded(
            vec![line(10, 10, Money::from_major(100))],
            ModeOfPayment::Cash,
            Money::from_major(500),
        );
        assert_eq!(sale.amount_paid(), Money::from_major(500));
        assert_eq!(sale.outstanding_balance(), Money::from_major(660));
        assert_eq!(sale.payment_status(), BalanceStatus::Partial);
        assert_eq!(sale.payments().len(), 1);
        assert_eq!(sale.payments()[0].method, PaymentMethod::Cash);
    }

    #[test]
    fn overpayment_at_the_counter_floors_balance_at_zero() {
        let (sale, _) = recorded(
            vec![line(1, 1, Money::from_major(100))],
            ModeOfPayment::Cash,
            Money::from_major(200),
        );
        assert_eq!(sale.outstanding_balance(), Money::ZERO);
        assert_eq!(sale.payment_status(), BalanceStatus::Paid);
    }

    #[test]
    fn empty_sale_is_rejected() {
        let (sale, _, cmd) = record(vec![], ModeOfPayment::NotPaid, Money::ZERO);
        assert_eq!(sale.handle(&cmd).unwrap_err().field(), Some("line_items"));
    }

    #[test]
    fn line_errors_name_the_offending_line() {
        let (sale, _, cmd) = record(
            vec![line(2, 0, Money::from_major(1)), line(0, 0, Money::from_major(1))],
            ModeOfPayment::NotPaid,
            Money::ZERO,
        );
        assert_eq!(
            sale.handle(&cmd).unwrap_err().field(),
            Some("line_items[1].quantity_ordered")
        );

        let (sale, _, cmd) = record(
            vec![line(2, 0, Money::from_cents(-1))],
            ModeOfPayment::NotPaid,
            Money::ZERO,
        );
        assert_eq!(sale.handle(&cmd).unwrap_err().field(), Some("line_items[0].unit_price"));

        let (sale, _, cmd) = record(
            vec![line(2, 3, Money::from_major(1))],
            ModeOfPayment::NotPaid,
            Money::ZERO,
        );
        assert_eq!(
            sale.handle(&cmd).unwrap_err().field(),
            Some("line_items[0].quantity_supplied")
        );
    }

    #[test]
    fn declared_status_must_match_supplied_quantity() {
        let mut input = line(5, 2, Money::from_major(10));
        input.supply_status = Some(SupplyStatus::Supplied);
        let (sale, _, cmd) = record(vec![input], ModeOfPayment::NotPaid, Money::ZERO);
        assert_eq!(
            sale.handle(&cmd).unwrap_err().field(),
            Some("line_items[0].supply_status")
        );
    }

    #[test]
    fn resupply_moves_line_through_states_and_reports_change() {
        let (mut sale, tenant_id) = recorded(
            vec![line(10, 4, Money::from_major(10))],
            ModeOfPayment::NotPaid,
            Money::ZERO,
        );
        assert_eq!(sale.lines()[0].supply_status, SupplyStatus::PartiallySupplied);

        let cmd = supply(&sale, tenant_id, 1, 10);
        let events = execute(&mut sale, &cmd).unwrap();
        match &events[0] {
            SaleEvent::LineSupplyUpdated(e) => assert_eq!(e.change(), SupplyChange::Consume(6)),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(sale.lines()[0].supply_status, SupplyStatus::Supplied);

        let cmd = supply(&sale, tenant_id, 1, 7);
        let events = execute(&mut sale, &cmd).unwrap();
        match &events[0] {
            SaleEvent::LineSupplyUpdated(e) => assert_eq!(e.change(), SupplyChange::Return(3)),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(sale.lines()[0].quantity_supplied, 7);

        // Same quantity again records nothing.
        assert!(sale.handle(&supply(&sale, tenant_id, 1, 7)).unwrap().is_empty());
    }

    #[test]
    fn supply_beyond_ordered_or_unknown_line_is_rejected() {
        let (sale, tenant_id) = recorded(
            vec![line(3, 0, Money::from_major(10))],
            ModeOfPayment::NotPaid,
            Money::ZERO,
        );
        assert_eq!(
            sale.handle(&supply(&sale, tenant_id, 1, 4)).unwrap_err().field(),
            Some("quantity_supplied")
        );
        assert_eq!(
            sale.handle(&supply(&sale, tenant_id, 2, 1)).unwrap_err().field(),
            Some("line_no")
        );
    }

    #[test]
    fn later_payment_cannot_exceed_outstanding_balance() {
        let (mut sale, tenant_id) = recorded(
            vec![line(5, 5, Money::from_major(100))],
            ModeOfPayment::NotPaid,
            Money::ZERO,
        );
        let pay = |amount: Money| {
            SaleCommand::RecordSalePayment(RecordSalePayment {
                tenant_id,
                sale_id: sale.id_typed(),
                payment_id: Uuid::now_v7(),
                amount,
                method: PaymentMethod::Mpesa,
                reference_number: Some("SGH7".to_string()),
                occurred_at: test_time(),
            })
        };
        let too_much = pay(Money::from_major(581));
        let exact = pay(Money::from_major(580));

        assert_eq!(sale.handle(&too_much).unwrap_err().field(), Some("amount"));
        execute(&mut sale, &exact).unwrap();
        assert_eq!(sale.payment_status(), BalanceStatus::Paid);
        assert_eq!(sale.outstanding_balance(), Money::ZERO);
    }

    #[test]
    fn commands_on_unknown_sale_are_not_found() {
        let sale = Sale::empty(SaleId::generate());
        let err = sale.handle(&supply(&sale, TenantId::new(), 1, 1)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn mode_of_payment_parses_display_forms() {
        assert_eq!("Not Paid".parse::<ModeOfPayment>().unwrap(), ModeOfPayment::NotPaid);
        assert_eq!("mpesa".parse::<ModeOfPayment>().unwrap(), ModeOfPayment::Mpesa);
        assert!("credit".parse::<ModeOfPayment>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            .. ProptestConfig::default()
        })]

        #[test]
        fn line_bound_holds_under_any_supply_sequence(
            ordered in 1i64..50,
            updates in prop::collection::vec(-3i64..60, 0..25),
        ) {
            let (mut sale, tenant_id) = recorded(
                vec![line(ordered, 0, Money::from_major(1))],
                ModeOfPayment::NotPaid,
                Money::ZERO,
            );
            for qty in updates {
                let cmd = supply(&sale, tenant_id, 1, qty);
                let _ = execute(&mut sale, &cmd);
                let l = &sale.lines()[0];
                prop_assert!(0 <= l.quantity_supplied && l.quantity_supplied <= l.quantity_ordered);
                prop_assert_eq!(
                    SupplyStatus::derive(l.quantity_ordered, l.quantity_supplied).unwrap(),
                    l.supply_status
                );
            }
        }

        #[test]
        fn totals_and_balance_identities(
            prices in prop::collection::vec((1i64..100, 0i64..100_000), 1..8),
            paid in 1i64..2_000_000,
        ) {
            let lines = prices
                .iter()
                .map(|(qty, cents)| line(*qty, 0, Money::from_cents(*cents)))
                .collect();
            let (sale, _) = recorded(lines, ModeOfPayment::Cash, Money::from_cents(paid));
            let t = sale.totals();

            let subtotal: i64 = prices.iter().map(|(q, c)| q * c).sum();
            prop_assert_eq!(t.subtotal.cents(), subtotal);
            prop_assert_eq!(t.vat_amount, VatRate::STANDARD.vat_on(t.subtotal));
            prop_assert_eq!(t.total_amount.cents(), t.subtotal.cents() + t.vat_amount.cents());
            prop_assert_eq!(
                sale.outstanding_balance().cents(),
                (t.total_amount.cents() - paid).max(0)
            );
        }
    }
}
