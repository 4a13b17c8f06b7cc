use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duka_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId};
use duka_events::Event;
use duka_parties::PartyId;

use crate::movement::{MovementDirection, MovementReason, StockMovement};

duka_core::aggregate_id!(
    /// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
    ProductId
);

/// Aggregate root: Product.
///
/// `current_stock` is a cache over the product's movement events and is only
/// ever changed by applying a [`StockMovementRecorded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    unit_price: Money,
    minimum_stock: i64,
    current_stock: i64,
    active: bool,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            unit_price: Money::ZERO,
            minimum_stock: 0,
            current_stock: 0,
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn minimum_stock(&self) -> i64 {
        self.minimum_stock
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_stock < self.minimum_stock
    }

    /// Check that this product exists and can be put on a new sale.
    pub fn ensure_sellable(&self, field: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("product {}", self.id)));
        }
        if !self.active {
            return Err(DomainError::validation(
                field,
                format!("product {} is deactivated", self.code),
            ));
        }
        Ok(())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct.
///
/// A positive `initial_stock` is recorded as an `IN/INITIAL` movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub unit_price: Money,
    pub minimum_stock: i64,
    pub initial_stock: i64,
    pub movement_id: Uuid,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement (any reason, explicit direction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_id: Uuid,
    pub direction: MovementDirection,
    pub reason: MovementReason,
    pub quantity: i64,
    pub supplier_id: Option<PartyId>,
    pub sale_id: Option<AggregateId>,
    pub lpo_id: Option<AggregateId>,
    pub notes: Option<String>,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Restock (`IN/RESTOCK` from a supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_id: Uuid,
    pub quantity: i64,
    pub supplier_id: PartyId,
    pub notes: Option<String>,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock to an absolute count (recorded as a delta).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_id: Uuid,
    pub new_quantity: i64,
    pub notes: Option<String>,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeForSale (`OUT/SALE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeForSale {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_id: Uuid,
    pub quantity: i64,
    pub sale_id: AggregateId,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (fields left `None` are kept).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: Option<String>,
    pub unit_price: Option<Money>,
    pub minimum_stock: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateProduct (soft delete; history stays referenced).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    RegisterProduct(RegisterProduct),
    RecordMovement(RecordMovement),
    Restock(Restock),
    AdjustStock(AdjustStock),
    ConsumeForSale(ConsumeForSale),
    UpdateProduct(UpdateProduct),
    DeactivateProduct(DeactivateProduct),
    ReactivateProduct(ReactivateProduct),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub unit_price: Money,
    pub minimum_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMovementRecorded.
///
/// `stock_after` is the product's stock once this movement is applied; read
/// models use it to cross-check their own replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementRecorded {
    pub tenant_id: TenantId,
    pub movement: StockMovement,
    pub stock_after: i64,
}

/// Event: ProductUpdated (full new values).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub minimum_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReactivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    StockMovementRecorded(StockMovementRecorded),
    ProductUpdated(ProductUpdated),
    ProductDeactivated(ProductDeactivated),
    ProductReactivated(ProductReactivated),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "inventory.product.registered",
            ProductEvent::StockMovementRecorded(_) => "inventory.product.movement_recorded",
            ProductEvent::ProductUpdated(_) => "inventory.product.updated",
            ProductEvent::ProductDeactivated(_) => "inventory.product.deactivated",
            ProductEvent::ProductReactivated(_) => "inventory.product.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::StockMovementRecorded(e) => e.movement.created_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductDeactivated(e) => e.occurred_at,
            ProductEvent::ProductReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.unit_price = e.unit_price;
                self.minimum_stock = e.minimum_stock;
                self.current_stock = 0;
                self.active = true;
                self.created = true;
            }
            ProductEvent::StockMovementRecorded(e) => {
                self.current_stock += e.movement.signed_delta();
            }
            ProductEvent::ProductUpdated(e) => {
                self.name = e.name.clone();
                self.unit_price = e.unit_price;
                self.minimum_stock = e.minimum_stock;
            }
            ProductEvent::ProductDeactivated(_) => {
                self.active = false;
            }
            ProductEvent::ProductReactivated(_) => {
                self.active = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            ProductCommand::RecordMovement(cmd) => self.handle_record(cmd),
            ProductCommand::Restock(cmd) => self.handle_restock(cmd),
            ProductCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            ProductCommand::ConsumeForSale(cmd) => self.handle_consume(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::DeactivateProduct(cmd) => self.handle_deactivate(cmd),
            ProductCommand::ReactivateProduct(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("product {product_id}")));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_product_id(product_id)
    }

    /// Validate one movement against the current stock and build its event.
    ///
    /// Every stock-changing command funnels through here.
    fn movement_event(&self, tenant_id: TenantId, movement: StockMovement) -> Result<ProductEvent, DomainError> {
        if movement.quantity <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }
        if !movement.reason.allows(movement.direction) {
            return Err(DomainError::validation(
                "type",
                format!("{:?} cannot be recorded as {:?}", movement.reason, movement.direction),
            ));
        }
        match movement.reason {
            MovementReason::Restock if movement.supplier_id.is_none() => {
                return Err(DomainError::validation("supplier", "is required for a restock"));
            }
            MovementReason::Sale if movement.sale_id.is_none() => {
                return Err(DomainError::validation("sale", "is required for a sale movement"));
            }
            MovementReason::PurchaseDelivery if movement.lpo_id.is_none() => {
                return Err(DomainError::validation("lpo", "is required for a purchase delivery"));
            }
            _ => {}
        }

        let stock_after = self
            .current_stock
            .checked_add(movement.signed_delta())
            .ok_or_else(|| DomainError::validation("quantity", "is out of range"))?;
        if stock_after < 0 {
            return Err(DomainError::validation(
                "quantity",
                format!(
                    "removing {} would drive stock of {} below zero (on hand: {})",
                    movement.quantity, self.code, self.current_stock
                ),
            ));
        }

        Ok(ProductEvent::StockMovementRecorded(StockMovementRecorded {
            tenant_id,
            movement,
            stock_after,
        }))
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        self.ensure_product_id(cmd.product_id)?;
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("code", "cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name", "cannot be empty"));
        }
        if cmd.unit_price.is_negative() {
            return Err(DomainError::validation("unit_price", "cannot be negative"));
        }
        if cmd.minimum_stock < 0 {
            return Err(DomainError::validation("minimum_stock", "cannot be negative"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial_stock", "cannot be negative"));
        }

        let registered = ProductEvent::ProductRegistered(ProductRegistered {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            code: cmd.code.trim().to_string(),
            name: cmd.name.trim().to_string(),
            unit_price: cmd.unit_price,
            minimum_stock: cmd.minimum_stock,
            occurred_at: cmd.occurred_at,
        });
        if cmd.initial_stock == 0 {
            return Ok(vec![registered]);
        }

        let initial = ProductEvent::StockMovementRecorded(StockMovementRecorded {
            tenant_id: cmd.tenant_id,
            movement: StockMovement {
                movement_id: cmd.movement_id,
                product_id: cmd.product_id,
                direction: MovementDirection::In,
                reason: MovementReason::Initial,
                quantity: cmd.initial_stock,
                supplier_id: None,
                sale_id: None,
                lpo_id: None,
                notes: Some("opening stock".to_string()),
                recorded_by: cmd.recorded_by,
                created_at: cmd.occurred_at,
            },
            stock_after: cmd.initial_stock,
        });
        Ok(vec![registered, initial])
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        let movement = StockMovement {
            movement_id: cmd.movement_id,
            product_id: cmd.product_id,
            direction: cmd.direction,
            reason: cmd.reason,
            quantity: cmd.quantity,
            supplier_id: cmd.supplier_id,
            sale_id: cmd.sale_id,
            lpo_id: cmd.lpo_id,
            notes: cmd.notes.clone(),
            recorded_by: cmd.recorded_by,
            created_at: cmd.occurred_at,
        };
        Ok(vec![self.movement_event(cmd.tenant_id, movement)?])
    }

    fn handle_restock(&self, cmd: &Restock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        let movement = StockMovement {
            movement_id: cmd.movement_id,
            product_id: cmd.product_id,
            direction: MovementDirection::In,
            reason: MovementReason::Restock,
            quantity: cmd.quantity,
            supplier_id: Some(cmd.supplier_id),
            sale_id: None,
            lpo_id: None,
            notes: cmd.notes.clone(),
            recorded_by: cmd.recorded_by,
            created_at: cmd.occurred_at,
        };
        Ok(vec![self.movement_event(cmd.tenant_id, movement)?])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if cmd.new_quantity < 0 {
            return Err(DomainError::validation("quantity", "cannot be negative"));
        }

        let delta = cmd.new_quantity - self.current_stock;
        if delta == 0 {
            return Ok(vec![]);
        }

        let movement = StockMovement {
            movement_id: cmd.movement_id,
            product_id: cmd.product_id,
            direction: if delta > 0 {
                MovementDirection::In
            } else {
                MovementDirection::Out
            },
            reason: MovementReason::Adjustment,
            quantity: delta.abs(),
            supplier_id: None,
            sale_id: None,
            lpo_id: None,
            notes: cmd.notes.clone(),
            recorded_by: cmd.recorded_by,
            created_at: cmd.occurred_at,
        };
        Ok(vec![self.movement_event(cmd.tenant_id, movement)?])
    }

    fn handle_consume(&self, cmd: &ConsumeForSale) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if !self.active {
            return Err(DomainError::validation(
                "product",
                format!("product {} is deactivated", self.code),
            ));
        }
        if cmd.quantity > self.current_stock {
            return Err(DomainError::insufficient_stock(
                &self.code,
                cmd.quantity,
                self.current_stock,
            ));
        }

        let movement = StockMovement {
            movement_id: cmd.movement_id,
            product_id: cmd.product_id,
            direction: MovementDirection::Out,
            reason: MovementReason::Sale,
            quantity: cmd.quantity,
            supplier_id: None,
            sale_id: Some(cmd.sale_id),
            lpo_id: None,
            notes: None,
            recorded_by: cmd.recorded_by,
            created_at: cmd.occurred_at,
        };
        Ok(vec![self.movement_event(cmd.tenant_id, movement)?])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;

        let name = cmd.name.as_deref().map(str::trim).unwrap_or(self.name.as_str()).to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name", "cannot be empty"));
        }
        let unit_price = cmd.unit_price.unwrap_or(self.unit_price);
        if unit_price.is_negative() {
            return Err(DomainError::validation("unit_price", "cannot be negative"));
        }
        let minimum_stock = cmd.minimum_stock.unwrap_or(self.minimum_stock);
        if minimum_stock < 0 {
            return Err(DomainError::validation("minimum_stock", "cannot be negative"));
        }

        if name == self.name && unit_price == self.unit_price && minimum_stock == self.minimum_stock {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            name,
            unit_price,
            minimum_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if !self.active {
            return Ok(vec![]);
        }
        Ok(vec![ProductEvent::ProductDeactivated(ProductDeactivated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if self.active {
            return Ok(vec![]);
        }
        Ok(vec![ProductEvent::ProductReactivated(ProductReactivated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::replay;
    use duka_events::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    /// Registered product with `stock` units on hand; returns every event so far.
    fn product_with_stock(stock: i64) -> (Product, TenantId, Vec<ProductEvent>) {
        let tenant_id = TenantId::new();
        let product_id = ProductId::generate();
        let mut product = Product::empty(product_id);
        let events = execute(
            &mut product,
            &ProductCommand::RegisterProduct(RegisterProduct {
                tenant_id,
                product_id,
                code: "CEM-50".to_string(),
                name: "Cement 50kg".to_string(),
                unit_price: Money::from_major(750),
                minimum_stock: 10,
                initial_stock: stock,
                movement_id: Uuid::now_v7(),
                recorded_by: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (product, tenant_id, events)
    }

    fn movements(events: &[ProductEvent]) -> Vec<StockMovement> {
        events
            .iter()
            .filter_map(|e| match e {
                ProductEvent::StockMovementRecorded(m) => Some(m.movement.clone()),
                _ => None,
            })
            .collect()
    }

    fn restock(product: &Product, tenant_id: TenantId, quantity: i64) -> ProductCommand {
        ProductCommand::Restock(Restock {
            tenant_id,
            product_id: product.id_typed(),
            movement_id: Uuid::now_v7(),
            quantity,
            supplier_id: PartyId::generate(),
            notes: None,
            recorded_by: None,
            occurred_at: test_time(),
        })
    }

    fn adjust(product: &Product, tenant_id: TenantId, new_quantity: i64) -> ProductCommand {
        ProductCommand::AdjustStock(AdjustStock {
            tenant_id,
            product_id: product.id_typed(),
            movement_id: Uuid::now_v7(),
            new_quantity,
            notes: Some("stock take".to_string()),
            recorded_by: None,
            occurred_at: test_time(),
        })
    }

    fn consume(product: &Product, tenant_id: TenantId, quantity: i64) -> ProductCommand {
        ProductCommand::ConsumeForSale(ConsumeForSale {
            tenant_id,
            product_id: product.id_typed(),
            movement_id: Uuid::now_v7(),
            quantity,
            sale_id: AggregateId::new(),
            recorded_by: None,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn register_with_initial_stock_records_initial_movement() {
        let (product, _, events) = product_with_stock(12);
        assert_eq!(events.len(), 2);
        assert_eq!(product.current_stock(), 12);
        let ledger = movements(&events);
        assert_eq!(ledger[0].reason, MovementReason::Initial);
        assert_eq!(ledger[0].direction, MovementDirection::In);
    }

    #[test]
    fn register_without_stock_records_no_movement() {
        let (product, _, events) = product_with_stock(0);
        assert_eq!(events.len(), 1);
        assert_eq!(product.current_stock(), 0);
        assert!(product.is_low_stock());
    }

    #[test]
    fn restock_adds_one_in_restock_movement() {
        let (mut product, tenant_id, _) = product_with_stock(5);
        let cmd = restock(&product, tenant_id, 20);
        let events = execute(&mut product, &cmd).unwrap();

        assert_eq!(product.current_stock(), 25);
        let ledger = movements(&events);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].direction, MovementDirection::In);
        assert_eq!(ledger[0].reason, MovementReason::Restock);
        assert_eq!(ledger[0].quantity, 20);
        assert!(ledger[0].supplier_id.is_some());
    }

    #[test]
    fn adjust_records_delta_not_absolute_quantity() {
        let (mut product, tenant_id, _) = product_with_stock(47);
        let cmd = adjust(&product, tenant_id, 50);
        let events = execute(&mut product, &cmd).unwrap();

        assert_eq!(product.current_stock(), 50);
        let ledger = movements(&events);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].direction, MovementDirection::In);
        assert_eq!(ledger[0].reason, MovementReason::Adjustment);
        assert_eq!(ledger[0].quantity, 3);
    }

    #[test]
    fn adjust_down_records_out_movement() {
        let (mut product, tenant_id, _) = product_with_stock(47);
        let cmd = adjust(&product, tenant_id, 40);
        let events = execute(&mut product, &cmd).unwrap();

        let ledger = movements(&events);
        assert_eq!(ledger[0].direction, MovementDirection::Out);
        assert_eq!(ledger[0].quantity, 7);
        assert_eq!(product.current_stock(), 40);
    }

    #[test]
    fn adjust_to_current_stock_is_noop() {
        let (product, tenant_id, _) = product_with_stock(8);
        let events = product.handle(&adjust(&product, tenant_id, 8)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn adjust_to_negative_is_rejected() {
        let (product, tenant_id, _) = product_with_stock(8);
        let err = product.handle(&adjust(&product, tenant_id, -1)).unwrap_err();
        assert_eq!(err.field(), Some("quantity"));
    }

    #[test]
    fn consume_more_than_on_hand_is_insufficient_stock() {
        let (product, tenant_id, _) = product_with_stock(3);
        let err = product.handle(&consume(&product, tenant_id, 4)).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock("CEM-50", 4, 3));
    }

    #[test]
    fn consume_on_deactivated_product_is_rejected() {
        let (mut product, tenant_id, _) = product_with_stock(3);
        let deactivate = ProductCommand::DeactivateProduct(DeactivateProduct {
            tenant_id,
            product_id: product.id_typed(),
            occurred_at: test_time(),
        });
        execute(&mut product, &deactivate).unwrap();

        let err = product.handle(&consume(&product, tenant_id, 1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref message, .. } if message.contains("deactivated")));
        // Deactivating twice records nothing.
        assert!(product.handle(&deactivate).unwrap().is_empty());
    }

    #[test]
    fn out_movement_below_zero_is_a_validation_error() {
        let (product, tenant_id, _) = product_with_stock(2);
        let cmd = ProductCommand::RecordMovement(RecordMovement {
            tenant_id,
            product_id: product.id_typed(),
            movement_id: Uuid::now_v7(),
            direction: MovementDirection::Out,
            reason: MovementReason::Damage,
            quantity: 3,
            supplier_id: None,
            sale_id: None,
            lpo_id: None,
            notes: Some("water damage".to_string()),
            recorded_by: None,
            occurred_at: test_time(),
        });
        let err = product.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref message, .. } if message.contains("below zero")));
    }

    #[test]
    fn generic_restock_without_supplier_is_rejected() {
        let (product, tenant_id, _) = product_with_stock(2);
        let cmd = ProductCommand::RecordMovement(RecordMovement {
            tenant_id,
            product_id: product.id_typed(),
            movement_id: Uuid::now_v7(),
            direction: MovementDirection::In,
            reason: MovementReason::Restock,
            quantity: 3,
            supplier_id: None,
            sale_id: None,
            lpo_id: None,
            notes: None,
            recorded_by: None,
            occurred_at: test_time(),
        });
        assert_eq!(product.handle(&cmd).unwrap_err().field(), Some("supplier"));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let (product, tenant_id, _) = product_with_stock(2);
        let err = product.handle(&restock(&product, tenant_id, 0)).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("quantity", "must be greater than 0")
        );
    }

    #[test]
    fn movement_on_unknown_product_is_not_found() {
        let product = Product::empty(ProductId::generate());
        let err = product.handle(&restock(&product, TenantId::new(), 1)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let (mut product, tenant_id, _) = product_with_stock(2);
        let cmd = ProductCommand::UpdateProduct(UpdateProduct {
            tenant_id,
            product_id: product.id_typed(),
            name: None,
            unit_price: Some(Money::from_major(800)),
            minimum_stock: None,
            occurred_at: test_time(),
        });
        execute(&mut product, &cmd).unwrap();
        assert_eq!(product.unit_price(), Money::from_major(800));
        assert_eq!(product.name(), "Cement 50kg");
        assert_eq!(product.minimum_stock(), 10);
        // Same values again: nothing to record.
        assert!(product.handle(&cmd).unwrap().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Restock(i64),
        Adjust(i64),
        Consume(i64),
        Damage(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50).prop_map(Op::Restock),
            (0i64..80).prop_map(Op::Adjust),
            (1i64..40).prop_map(Op::Consume),
            (1i64..40).prop_map(Op::Damage),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            .. ProptestConfig::default()
        })]

        #[test]
        fn stock_always_equals_replay_and_never_goes_negative(
            initial in 0i64..30,
            ops in prop::collection::vec(op_strategy(), 0..40),
        ) {
            let (mut product, tenant_id, mut events) = product_with_stock(initial);

            for op in ops {
                let cmd = match op {
                    Op::Restock(q) => restock(&product, tenant_id, q),
                    Op::Adjust(q) => adjust(&product, tenant_id, q),
                    Op::Consume(q) => consume(&product, tenant_id, q),
                    Op::Damage(q) => ProductCommand::RecordMovement(RecordMovement {
                        tenant_id,
                        product_id: product.id_typed(),
                        movement_id: Uuid::now_v7(),
                        direction: MovementDirection::Out,
                        reason: MovementReason::Damage,
                        quantity: q,
                        supplier_id: None,
                        sale_id: None,
                        lpo_id: None,
                        notes: None,
                        recorded_by: None,
                        occurred_at: test_time(),
                    }),
                };
                // Rejected commands leave state untouched.
                let before = product.clone();
                match execute(&mut product, &cmd) {
                    Ok(new) => events.extend(new),
                    Err(_) => prop_assert_eq!(&product, &before),
                }

                prop_assert!(product.current_stock() >= 0);
                prop_assert_eq!(replay(&movements(&events)), product.current_stock());
            }

            // Rehydrating from the full stream yields the same aggregate.
            let mut rebuilt = Product::empty(product.id_typed());
            for e in &events {
                rebuilt.apply(e);
            }
            prop_assert_eq!(rebuilt, product);
        }
    }
}
