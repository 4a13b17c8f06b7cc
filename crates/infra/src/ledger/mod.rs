//! Ledger service: the write side of the inventory and fulfillment ledger.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! 1. Work out every aggregate the decision reads or writes
//! 2. Lock that set (all at once, bounded wait)
//! 3. Load, check references, decide (one unit of work)
//! 4. Commit all streams in one atomic append, publish
//! 5. Release the locks
//! ```
//!
//! Ids whose stream must be peeked to know the lock set (the product behind a
//! sale line or an LPO) are read before locking; those fields never change
//! after creation.

mod requests;

pub use requests::{
    Caller, DeliveryOutcome, NewInvoice, NewLpo, NewMovement, NewParty, NewPayment, NewProduct,
    NewSale, ProductChanges, StockAdjustment, StockOutcome,
};

use chrono::{Datelike, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};
use uuid::Uuid;

use duka_core::{Aggregate, AggregateId, DomainError, TenantId, VatRate};
use duka_events::{EventBus, EventEnvelope};
use duka_inventory::{
    AdjustStock, ConsumeForSale, DeactivateProduct, MovementDirection, MovementReason, Product,
    ProductCommand, ProductEvent, ProductId, ReactivateProduct, RecordMovement, RegisterProduct,
    Restock, StockMovement, UpdateProduct,
};
use duka_invoicing::{Invoice, InvoiceCommand, InvoiceId, IssueInvoice, RecordInvoicePayment};
use duka_parties::{DeactivateParty, Party, PartyCommand, PartyId, PartyKind, RegisterParty};
use duka_purchasing::{CancelLpo, IssueLpo, Lpo, LpoCommand, LpoEvent, LpoId, RecordDelivery};
use duka_sales::{
    AllocateSaleNumber, RecordSale, RecordSalePayment, Sale, SaleCommand, SaleEvent, SaleId,
    SaleNumberEvent, SaleNumberSequence, SupplyChange, UpdateLineSupply,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::LedgerConfig;
use crate::event_store::EventStore;
use crate::locks::AggregateLocks;
use crate::reservations::{self, KeyReservation, KeyScope, ReserveKey};

pub const PARTY_AGGREGATE: &str = "parties.party";
pub const PRODUCT_AGGREGATE: &str = "inventory.product";
pub const SALE_AGGREGATE: &str = "sales.sale";
pub const SALE_NUMBER_AGGREGATE: &str = "sales.sale_number";
pub const LPO_AGGREGATE: &str = "purchasing.lpo";
pub const INVOICE_AGGREGATE: &str = "invoicing.invoice";

fn party(id: AggregateId) -> Party {
    Party::empty(PartyId::new(id))
}

fn product(id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

fn sale(id: AggregateId) -> Sale {
    Sale::empty(SaleId::new(id))
}

fn lpo(id: AggregateId) -> Lpo {
    Lpo::empty(LpoId::new(id))
}

fn invoice(id: AggregateId) -> Invoice {
    Invoice::empty(InvoiceId::new(id))
}

fn recorded_movement(events: &[ProductEvent]) -> Option<StockMovement> {
    events.iter().find_map(|e| match e {
        ProductEvent::StockMovementRecorded(recorded) => Some(recorded.movement.clone()),
        _ => None,
    })
}

#[derive(Debug)]
pub struct LedgerService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    locks: AggregateLocks,
    vat_rate: VatRate,
}

impl<S, B> LedgerService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: &LedgerConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            locks: AggregateLocks::new(config.lock_timeout),
            vat_rate: config.vat_rate,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn vat_rate(&self) -> VatRate {
        self.vat_rate
    }

    pub(crate) fn locks(&self) -> &AggregateLocks {
        &self.locks
    }

    fn dispatch_one<A>(
        &self,
        caller: &Caller,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Id: Copy + Into<AggregateId>,
        A::Event: duka_events::Event + Serialize + DeserializeOwned,
    {
        let _guard = self.locks.acquire(caller.tenant_id, [aggregate_id])?;
        let (aggregate, _) = self.dispatcher.dispatch(
            caller.tenant_id,
            aggregate_id,
            aggregate_type,
            command,
            make_aggregate,
        )?;
        Ok(aggregate)
    }

    fn load_existing<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        what: &str,
        exists: impl FnOnce(&A) -> bool,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let aggregate = self.dispatcher.load(tenant_id, aggregate_id, make_aggregate)?;
        if !exists(&aggregate) {
            return Err(DispatchError::NotFound(format!("{what} {aggregate_id}")));
        }
        Ok(aggregate)
    }

    // ---- parties ----

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, kind = request.kind.as_str()), err)]
    pub fn register_party(&self, caller: &Caller, request: NewParty) -> Result<Party, DispatchError> {
        let party_id = PartyId::generate();
        let command = PartyCommand::RegisterParty(RegisterParty {
            tenant_id: caller.tenant_id,
            party_id,
            kind: request.kind,
            name: request.name,
            phone: request.phone,
            occurred_at: Utc::now(),
        });
        let registered = self.dispatch_one(caller, party_id.aggregate_id(), PARTY_AGGREGATE, &command, party)?;
        info!(party_id = %party_id, "party registered");
        Ok(registered)
    }

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, party_id = %party_id), err)]
    pub fn deactivate_party(&self, caller: &Caller, party_id: PartyId) -> Result<Party, DispatchError> {
        let command = PartyCommand::DeactivateParty(DeactivateParty {
            tenant_id: caller.tenant_id,
            party_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_one(caller, party_id.aggregate_id(), PARTY_AGGREGATE, &command, party)
    }

    pub fn party(&self, tenant_id: TenantId, party_id: PartyId) -> Result<Party, DispatchError> {
        self.load_existing(tenant_id, party_id.aggregate_id(), "party", Party::exists, party)
    }

    // ---- products and stock ----

    /// Register a product and claim its code. A positive `initial_stock` is
    /// recorded as the product's first movement.
    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, code = %request.code), err)]
    pub fn register_product(&self, caller: &Caller, request: NewProduct) -> Result<StockOutcome, DispatchError> {
        let tenant_id = caller.tenant_id;
        let product_id = ProductId::generate();
        let key_id = KeyReservation::stream_id(tenant_id, KeyScope::ProductCode, &request.code);
        let now = Utc::now();

        let _guard = self.locks.acquire(tenant_id, [product_id.aggregate_id(), key_id])?;
        let mut uow = self.dispatcher.begin(tenant_id);

        let mut key = uow.load(key_id, KeyReservation::empty)?;
        uow.execute(
            &mut key,
            reservations::AGGREGATE_TYPE,
            &ReserveKey {
                tenant_id,
                scope: KeyScope::ProductCode,
                key: request.code.clone(),
                owner: product_id.aggregate_id(),
                occurred_at: now,
            },
        )?;

        let mut registered = uow.load(product_id.aggregate_id(), product)?;
        let events = uow.execute(
            &mut registered,
            PRODUCT_AGGREGATE,
            &ProductCommand::RegisterProduct(RegisterProduct {
                tenant_id,
                product_id,
                code: request.code,
                name: request.name,
                unit_price: request.unit_price,
                minimum_stock: request.minimum_stock,
                initial_stock: request.initial_stock,
                movement_id: Uuid::now_v7(),
                recorded_by: caller.user_id,
                occurred_at: now,
            }),
        )?;
        uow.commit()?;

        info!(product_id = %product_id, stock = registered.current_stock(), "product registered");
        Ok(StockOutcome {
            movement: recorded_movement(&events),
            product: registered,
        })
    }

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, product_id = %product_id), err)]
    pub fn update_product(
        &self,
        caller: &Caller,
        product_id: ProductId,
        changes: ProductChanges,
    ) -> Result<Product, DispatchError> {
        let command = ProductCommand::UpdateProduct(UpdateProduct {
            tenant_id: caller.tenant_id,
            product_id,
            name: changes.name,
            unit_price: changes.unit_price,
            minimum_stock: changes.minimum_stock,
            occurred_at: Utc::now(),
        });
        self.dispatch_one(caller, product_id.aggregate_id(), PRODUCT_AGGREGATE, &command, product)
    }

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, product_id = %product_id), err)]
    pub fn deactivate_product(&self, caller: &Caller, product_id: ProductId) -> Result<Product, DispatchError> {
        let command = ProductCommand::DeactivateProduct(DeactivateProduct {
            tenant_id: caller.tenant_id,
            product_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_one(caller, product_id.aggregate_id(), PRODUCT_AGGREGATE, &command, product)
    }

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, product_id = %product_id), err)]
    pub fn reactivate_product(&self, caller: &Caller, product_id: ProductId) -> Result<Product, DispatchError> {
        let command = ProductCommand::ReactivateProduct(ReactivateProduct {
            tenant_id: caller.tenant_id,
            product_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_one(caller, product_id.aggregate_id(), PRODUCT_AGGREGATE, &command, product)
    }

    /// Receive stock (`In`, needs an active supplier) or set an absolute count
    /// (`Adjustment`, recorded as the difference; no movement when unchanged).
    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, product_id = %product_id), err)]
    pub fn adjust_stock(
        &self,
        caller: &Caller,
        product_id: ProductId,
        adjustment: StockAdjustment,
    ) -> Result<StockOutcome, DispatchError> {
        let tenant_id = caller.tenant_id;
        let now = Utc::now();

        let (supplier, command) = match adjustment {
            StockAdjustment::In {
                quantity,
                supplier_id,
                notes,
            } => (
                Some(supplier_id),
                ProductCommand::Restock(Restock {
                    tenant_id,
                    product_id,
                    movement_id: Uuid::now_v7(),
                    quantity,
                    supplier_id,
                    notes,
                    recorded_by: caller.user_id,
                    occurred_at: now,
                }),
            ),
            StockAdjustment::Adjustment { new_quantity, notes } => (
                None,
                ProductCommand::AdjustStock(AdjustStock {
                    tenant_id,
                    product_id,
                    movement_id: Uuid::now_v7(),
                    new_quantity,
                    notes,
                    recorded_by: caller.user_id,
                    occurred_at: now,
                }),
            ),
        };

        self.stock_change(caller, product_id, supplier, &command)
    }

    /// Record a movement with an explicit direction and reason (damage,
    /// transfer, return, ...).
    #[instrument(
        skip_all,
        fields(tenant_id = %caller.tenant_id, product_id = %product_id, reason = ?request.reason),
        err
    )]
    pub fn record_movement(
        &self,
        caller: &Caller,
        product_id: ProductId,
        request: NewMovement,
    ) -> Result<StockOutcome, DispatchError> {
        let command = ProductCommand::RecordMovement(RecordMovement {
            tenant_id: caller.tenant_id,
            product_id,
            movement_id: Uuid::now_v7(),
            direction: request.direction,
            reason: request.reason,
            quantity: request.quantity,
            supplier_id: request.supplier_id,
            sale_id: None,
            lpo_id: None,
            notes: request.notes,
            recorded_by: caller.user_id,
            occurred_at: Utc::now(),
        });
        self.stock_change(caller, product_id, request.supplier_id, &command)
    }

    fn stock_change(
        &self,
        caller: &Caller,
        product_id: ProductId,
        supplier: Option<PartyId>,
        command: &ProductCommand,
    ) -> Result<StockOutcome, DispatchError> {
        let tenant_id = caller.tenant_id;
        let lock_set = std::iter::once(product_id.aggregate_id()).chain(supplier.map(|s| s.aggregate_id()));
        let _guard = self.locks.acquire(tenant_id, lock_set)?;
        let mut uow = self.dispatcher.begin(tenant_id);

        if let Some(supplier_id) = supplier {
            uow.load(supplier_id.aggregate_id(), party)?
                .ensure_can_transact(PartyKind::Supplier, "supplier")?;
        }

        let mut target = uow.load(product_id.aggregate_id(), product)?;
        let events = uow.execute(&mut target, PRODUCT_AGGREGATE, command)?;
        uow.commit()?;

        let movement = recorded_movement(&events);
        if let Some(m) = &movement {
            info!(
                movement_id = %m.movement_id,
                reason = ?m.reason,
                quantity = m.quantity,
                stock = target.current_stock(),
                "stock movement recorded"
            );
        }
        Ok(StockOutcome {
            product: target,
            movement,
        })
    }

    pub fn product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Product, DispatchError> {
        self.load_existing(tenant_id, product_id.aggregate_id(), "product", Product::exists, product)
    }

    /// The product's movements in the order they were recorded.
    pub fn movements(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<StockMovement>, DispatchError> {
        let stream = self.dispatcher.store().load_stream(tenant_id, product_id.aggregate_id())?;
        if stream.is_empty() {
            return Err(DispatchError::NotFound(format!("product {product_id}")));
        }

        let mut movements = Vec::new();
        for stored in stream {
            let event: ProductEvent =
                serde_json::from_value(stored.payload).map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            if let ProductEvent::StockMovementRecorded(recorded) = event {
                movements.push(recorded.movement);
            }
        }
        Ok(movements)
    }

    // ---- sales ----

    /// Record a sale, number it and take the supplied quantities out of
    /// stock. Either all of it commits or none of it does.
    #[instrument(
        skip_all,
        fields(tenant_id = %caller.tenant_id, customer_id = %request.customer_id, lines = request.lines.len()),
        err
    )]
    pub fn create_sale(&self, caller: &Caller, request: NewSale) -> Result<Sale, DispatchError> {
        let tenant_id = caller.tenant_id;
        let now = Utc::now();
        let year = now.year();
        let sale_id = SaleId::generate();
        let sequence_id = SaleNumberSequence::stream_id(tenant_id, year);

        let lock_set = [sale_id.aggregate_id(), sequence_id, request.customer_id.aggregate_id()]
            .into_iter()
            .chain(request.lines.iter().map(|l| l.product_id.aggregate_id()))
            .collect::<Vec<_>>();
        let _guard = self.locks.acquire(tenant_id, lock_set)?;
        let mut uow = self.dispatcher.begin(tenant_id);

        uow.load(request.customer_id.aggregate_id(), party)?
            .ensure_can_transact(PartyKind::Customer, "customer")?;

        let mut products: Vec<Product> = Vec::new();
        for (idx, line) in request.lines.iter().enumerate() {
            if products.iter().any(|p| p.id_typed() == line.product_id) {
                continue;
            }
            let loaded = uow.load(line.product_id.aggregate_id(), product)?;
            loaded.ensure_sellable(&format!("line_items[{idx}].product_id"))?;
            products.push(loaded);
        }

        let mut sequence = uow.load(sequence_id, SaleNumberSequence::empty)?;
        let allocated = uow.execute(
            &mut sequence,
            SALE_NUMBER_AGGREGATE,
            &AllocateSaleNumber {
                tenant_id,
                year,
                sale_id,
                occurred_at: now,
            },
        )?;
        let sale_number = match allocated.into_iter().next() {
            Some(SaleNumberEvent::SaleNumberAllocated(e)) => e.sale_number,
            None => return Err(DispatchError::InvariantViolation("no sale number allocated".to_string())),
        };

        let mut recorded = uow.load(sale_id.aggregate_id(), sale)?;
        uow.execute(
            &mut recorded,
            SALE_AGGREGATE,
            &SaleCommand::RecordSale(RecordSale {
                tenant_id,
                sale_id,
                sale_number,
                customer_id: request.customer_id,
                lpo_quotation_number: request.lpo_quotation_number,
                delivery_number: request.delivery_number,
                mode_of_payment: request.mode_of_payment,
                amount_paid: request.amount_paid,
                reference_number: request.reference_number,
                vat_rate: self.vat_rate,
                lines: request.lines,
                payment_id: Uuid::now_v7(),
                occurred_at: now,
            }),
        )?;

        for line in recorded.lines().iter().filter(|l| l.quantity_supplied > 0) {
            let Some(target) = products.iter_mut().find(|p| p.id_typed() == line.product_id) else {
                return Err(DispatchError::InvariantViolation(format!(
                    "sale line {} references an unloaded product",
                    line.line_no
                )));
            };
            uow.execute(
                target,
                PRODUCT_AGGREGATE,
                &ProductCommand::ConsumeForSale(ConsumeForSale {
                    tenant_id,
                    product_id: line.product_id,
                    movement_id: Uuid::now_v7(),
                    quantity: line.quantity_supplied,
                    sale_id: sale_id.aggregate_id(),
                    recorded_by: caller.user_id,
                    occurred_at: now,
                }),
            )?;
        }

        let committed = uow.commit()?;
        info!(
            sale_id = %sale_id,
            sale_number = recorded.sale_number(),
            total = %recorded.totals().total_amount,
            events = committed.len(),
            "sale recorded"
        );
        Ok(recorded)
    }

    /// Change how much of a sale line has been handed over. An increase takes
    /// the difference out of stock; a decrease puts it back as a return.
    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, sale_id = %sale_id, line_no = line_no), err)]
    pub fn update_line_supply(
        &self,
        caller: &Caller,
        sale_id: SaleId,
        line_no: u32,
        quantity_supplied: i64,
    ) -> Result<Sale, DispatchError> {
        let tenant_id = caller.tenant_id;
        let peek = self.sale(tenant_id, sale_id)?;
        let line_product = peek.line(line_no).map(|l| l.product_id);

        let lock_set = std::iter::once(sale_id.aggregate_id()).chain(line_product.map(|p| p.aggregate_id()));
        let _guard = self.locks.acquire(tenant_id, lock_set)?;
        let mut uow = self.dispatcher.begin(tenant_id);
        let now = Utc::now();

        let mut updated = uow.load(sale_id.aggregate_id(), sale)?;
        let events = uow.execute(
            &mut updated,
            SALE_AGGREGATE,
            &SaleCommand::UpdateLineSupply(UpdateLineSupply {
                tenant_id,
                sale_id,
                line_no,
                quantity_supplied,
                occurred_at: now,
            }),
        )?;

        for event in &events {
            let SaleEvent::LineSupplyUpdated(change) = event else {
                continue;
            };
            let command = match change.change() {
                SupplyChange::Unchanged => continue,
                SupplyChange::Consume(quantity) => ProductCommand::ConsumeForSale(ConsumeForSale {
                    tenant_id,
                    product_id: change.product_id,
                    movement_id: Uuid::now_v7(),
                    quantity,
                    sale_id: sale_id.aggregate_id(),
                    recorded_by: caller.user_id,
                    occurred_at: now,
                }),
                SupplyChange::Return(quantity) => ProductCommand::RecordMovement(RecordMovement {
                    tenant_id,
                    product_id: change.product_id,
                    movement_id: Uuid::now_v7(),
                    direction: MovementDirection::In,
                    reason: MovementReason::Return,
                    quantity,
                    supplier_id: None,
                    sale_id: Some(sale_id.aggregate_id()),
                    lpo_id: None,
                    notes: Some(format!("{} line {line_no}", updated.sale_number())),
                    recorded_by: caller.user_id,
                    occurred_at: now,
                }),
            };
            let mut target = uow.load(change.product_id.aggregate_id(), product)?;
            uow.execute(&mut target, PRODUCT_AGGREGATE, &command)?;
        }

        uow.commit()?;
        Ok(updated)
    }

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, sale_id = %sale_id), err)]
    pub fn record_sale_payment(
        &self,
        caller: &Caller,
        sale_id: SaleId,
        payment: NewPayment,
    ) -> Result<Sale, DispatchError> {
        let command = SaleCommand::RecordSalePayment(RecordSalePayment {
            tenant_id: caller.tenant_id,
            sale_id,
            payment_id: Uuid::now_v7(),
            amount: payment.amount,
            method: payment.method,
            reference_number: payment.reference_number,
            occurred_at: Utc::now(),
        });
        let paid = self.dispatch_one(caller, sale_id.aggregate_id(), SALE_AGGREGATE, &command, sale)?;
        info!(balance = %paid.outstanding_balance(), "sale payment recorded");
        Ok(paid)
    }

    pub fn sale(&self, tenant_id: TenantId, sale_id: SaleId) -> Result<Sale, DispatchError> {
        self.load_existing(tenant_id, sale_id.aggregate_id(), "sale", Sale::exists, sale)
    }

    // ---- purchasing ----

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, lpo_number = %request.lpo_number), err)]
    pub fn issue_lpo(&self, caller: &Caller, request: NewLpo) -> Result<Lpo, DispatchError> {
        let tenant_id = caller.tenant_id;
        let lpo_id = LpoId::generate();
        let key_id = KeyReservation::stream_id(tenant_id, KeyScope::LpoNumber, &request.lpo_number);
        let now = Utc::now();

        let _guard = self.locks.acquire(
            tenant_id,
            [
                lpo_id.aggregate_id(),
                key_id,
                request.supplier_id.aggregate_id(),
                request.product_id.aggregate_id(),
            ],
        )?;
        let mut uow = self.dispatcher.begin(tenant_id);

        let mut key = uow.load(key_id, KeyReservation::empty)?;
        uow.execute(
            &mut key,
            reservations::AGGREGATE_TYPE,
            &ReserveKey {
                tenant_id,
                scope: KeyScope::LpoNumber,
                key: request.lpo_number.clone(),
                owner: lpo_id.aggregate_id(),
                occurred_at: now,
            },
        )?;

        uow.load(request.supplier_id.aggregate_id(), party)?
            .ensure_can_transact(PartyKind::Supplier, "supplier")?;
        if !uow.load(request.product_id.aggregate_id(), product)?.exists() {
            return Err(DispatchError::NotFound(format!("product {}", request.product_id)));
        }

        let mut issued = uow.load(lpo_id.aggregate_id(), lpo)?;
        uow.execute(
            &mut issued,
            LPO_AGGREGATE,
            &LpoCommand::IssueLpo(IssueLpo {
                tenant_id,
                lpo_id,
                lpo_number: request.lpo_number,
                supplier_id: request.supplier_id,
                product_id: request.product_id,
                ordered_quantity: request.ordered_quantity,
                order_date: request.order_date.unwrap_or_else(|| now.date_naive()),
                expected_delivery: request.expected_delivery,
                occurred_at: now,
            }),
        )?;
        uow.commit()?;

        info!(lpo_id = %lpo_id, "lpo issued");
        Ok(issued)
    }

    /// Record goods received against an LPO and put them into stock as a
    /// purchase delivery, in one commit.
    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, lpo_id = %lpo_id, delivered_quantity = delivered_quantity), err)]
    pub fn record_delivery(
        &self,
        caller: &Caller,
        lpo_id: LpoId,
        delivered_quantity: i64,
    ) -> Result<DeliveryOutcome, DispatchError> {
        let tenant_id = caller.tenant_id;
        let peek = self.lpo(tenant_id, lpo_id)?;
        let Some(product_id) = peek.product_id() else {
            return Err(DispatchError::InvariantViolation(format!("lpo {lpo_id} has no product")));
        };

        let _guard = self.locks.acquire(tenant_id, [lpo_id.aggregate_id(), product_id.aggregate_id()])?;
        let mut uow = self.dispatcher.begin(tenant_id);
        let now = Utc::now();

        let mut delivered = uow.load(lpo_id.aggregate_id(), lpo)?;
        let events = uow.execute(
            &mut delivered,
            LPO_AGGREGATE,
            &LpoCommand::RecordDelivery(RecordDelivery {
                tenant_id,
                lpo_id,
                delivered_quantity,
                occurred_at: now,
            }),
        )?;
        let Some(delivery) = events.iter().find_map(|e| match e {
            LpoEvent::DeliveryRecorded(d) => Some(d),
            _ => None,
        }) else {
            return Err(DispatchError::InvariantViolation("delivery produced no event".to_string()));
        };

        let mut target = uow.load(delivery.product_id.aggregate_id(), product)?;
        let product_events = uow.execute(
            &mut target,
            PRODUCT_AGGREGATE,
            &ProductCommand::RecordMovement(RecordMovement {
                tenant_id,
                product_id: delivery.product_id,
                movement_id: Uuid::now_v7(),
                direction: MovementDirection::In,
                reason: MovementReason::PurchaseDelivery,
                quantity: delivery.delivered_quantity,
                supplier_id: Some(delivery.supplier_id),
                sale_id: None,
                lpo_id: Some(lpo_id.aggregate_id()),
                notes: Some(format!("LPO {}", delivered.lpo_number())),
                recorded_by: caller.user_id,
                occurred_at: now,
            }),
        )?;
        let Some(movement) = recorded_movement(&product_events) else {
            return Err(DispatchError::InvariantViolation("delivery recorded no movement".to_string()));
        };

        uow.commit()?;
        info!(
            status = ?delivered.status(),
            pending = delivered.pending_quantity(),
            stock = target.current_stock(),
            "lpo delivery recorded"
        );
        Ok(DeliveryOutcome {
            lpo: delivered,
            movement,
        })
    }

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, lpo_id = %lpo_id), err)]
    pub fn cancel_lpo(&self, caller: &Caller, lpo_id: LpoId, reason: Option<String>) -> Result<Lpo, DispatchError> {
        let command = LpoCommand::CancelLpo(CancelLpo {
            tenant_id: caller.tenant_id,
            lpo_id,
            reason,
            occurred_at: Utc::now(),
        });
        self.dispatch_one(caller, lpo_id.aggregate_id(), LPO_AGGREGATE, &command, lpo)
    }

    pub fn lpo(&self, tenant_id: TenantId, lpo_id: LpoId) -> Result<Lpo, DispatchError> {
        self.load_existing(tenant_id, lpo_id.aggregate_id(), "lpo", Lpo::exists, lpo)
    }

    // ---- invoicing ----

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, invoice_number = %request.invoice_number), err)]
    pub fn issue_invoice(&self, caller: &Caller, request: NewInvoice) -> Result<Invoice, DispatchError> {
        let tenant_id = caller.tenant_id;
        let invoice_id = InvoiceId::generate();
        let key_id = KeyReservation::stream_id(tenant_id, KeyScope::InvoiceNumber, &request.invoice_number);
        let now = Utc::now();

        let sale_key_id = request
            .sale_id
            .map(|s| KeyReservation::stream_id(tenant_id, KeyScope::InvoicedSale, &s.to_string()));

        let lock_set = [invoice_id.aggregate_id(), key_id, request.customer_id.aggregate_id()]
            .into_iter()
            .chain(request.sale_id.map(|s| s.aggregate_id()))
            .chain(sale_key_id)
            .collect::<Vec<_>>();
        let _guard = self.locks.acquire(tenant_id, lock_set)?;
        let mut uow = self.dispatcher.begin(tenant_id);

        let mut key = uow.load(key_id, KeyReservation::empty)?;
        uow.execute(
            &mut key,
            reservations::AGGREGATE_TYPE,
            &ReserveKey {
                tenant_id,
                scope: KeyScope::InvoiceNumber,
                key: request.invoice_number.clone(),
                owner: invoice_id.aggregate_id(),
                occurred_at: now,
            },
        )?;

        uow.load(request.customer_id.aggregate_id(), party)?
            .ensure_can_transact(PartyKind::Customer, "customer")?;

        let billed_sale = match request.sale_id {
            Some(sale_id) => {
                let billed = uow.load(sale_id.aggregate_id(), sale)?;
                if !billed.exists() {
                    return Err(DispatchError::NotFound(format!("sale {sale_id}")));
                }
                if billed.customer_id() != Some(request.customer_id) {
                    return Err(DispatchError::Validation {
                        field: "sale".to_string(),
                        message: format!("sale {} belongs to another customer", billed.sale_number()),
                    });
                }
                let claim_id = KeyReservation::stream_id(tenant_id, KeyScope::InvoicedSale, &sale_id.to_string());
                let mut claim = uow.load(claim_id, KeyReservation::empty)?;
                if claim.owner().is_some_and(|owner| owner != invoice_id.aggregate_id()) {
                    return Err(DispatchError::Validation {
                        field: "sale".to_string(),
                        message: format!("sale {} is already invoiced", billed.sale_number()),
                    });
                }
                uow.execute(
                    &mut claim,
                    reservations::AGGREGATE_TYPE,
                    &ReserveKey {
                        tenant_id,
                        scope: KeyScope::InvoicedSale,
                        key: sale_id.to_string(),
                        owner: invoice_id.aggregate_id(),
                        occurred_at: now,
                    },
                )?;
                Some(billed)
            }
            None => None,
        };

        let total_amount = match (request.total_amount, &billed_sale) {
            (Some(total), _) => total,
            (None, Some(billed)) if billed.outstanding_balance().is_zero() => {
                return Err(DispatchError::Validation {
                    field: "sale".to_string(),
                    message: format!("sale {} is already paid in full", billed.sale_number()),
                });
            }
            (None, Some(billed)) => billed.outstanding_balance(),
            (None, None) => {
                return Err(DispatchError::Validation {
                    field: "total_amount".to_string(),
                    message: "is required when no sale is given".to_string(),
                });
            }
        };

        let mut issued = uow.load(invoice_id.aggregate_id(), invoice)?;
        uow.execute(
            &mut issued,
            INVOICE_AGGREGATE,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                invoice_number: request.invoice_number,
                customer_id: request.customer_id,
                sale_id: request.sale_id.map(|s| s.aggregate_id()),
                total_amount,
                occurred_at: now,
            }),
        )?;
        uow.commit()?;

        info!(invoice_id = %invoice_id, total = %total_amount, "invoice issued");
        Ok(issued)
    }

    #[instrument(skip_all, fields(tenant_id = %caller.tenant_id, invoice_id = %invoice_id), err)]
    pub fn record_invoice_payment(
        &self,
        caller: &Caller,
        invoice_id: InvoiceId,
        payment: NewPayment,
    ) -> Result<Invoice, DispatchError> {
        let command = InvoiceCommand::RecordInvoicePayment(RecordInvoicePayment {
            tenant_id: caller.tenant_id,
            invoice_id,
            payment_id: Uuid::now_v7(),
            amount: payment.amount,
            method: payment.method,
            reference_number: payment.reference_number,
            occurred_at: Utc::now(),
        });
        let paid = self.dispatch_one(caller, invoice_id.aggregate_id(), INVOICE_AGGREGATE, &command, invoice)?;
        info!(status = ?paid.status(), remaining = %paid.remaining_balance(), "invoice payment recorded");
        Ok(paid)
    }

    pub fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, DispatchError> {
        self.load_existing(tenant_id, invoice_id.aggregate_id(), "invoice", Invoice::exists, invoice)
    }
}
