use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use duka_core::{Aggregate, AggregateRoot, DomainError, TenantId};
use duka_events::Event;
use duka_inventory::ProductId;
use duka_parties::PartyId;

duka_core::aggregate_id!(
    /// Local purchase order identifier.
    LpoId
);

/// LPO delivery lifecycle.
///
/// `Completed` holds exactly when nothing is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LpoStatus {
    Pending,
    Partial,
    Completed,
    Cancelled,
}

/// Aggregate root: Lpo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lpo {
    id: LpoId,
    tenant_id: Option<TenantId>,
    lpo_number: String,
    supplier_id: Option<PartyId>,
    product_id: Option<ProductId>,
    ordered_quantity: i64,
    delivered_quantity: i64,
    status: LpoStatus,
    order_date: Option<NaiveDate>,
    expected_delivery: Option<NaiveDate>,
    version: u64,
    created: bool,
}

impl Lpo {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LpoId) -> Self {
        Self {
            id,
            tenant_id: None,
            lpo_number: String::new(),
            supplier_id: None,
            product_id: None,
            ordered_quantity: 0,
            delivered_quantity: 0,
            status: LpoStatus::Pending,
            order_date: None,
            expected_delivery: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LpoId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn lpo_number(&self) -> &str {
        &self.lpo_number
    }

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn ordered_quantity(&self) -> i64 {
        self.ordered_quantity
    }

    pub fn delivered_quantity(&self) -> i64 {
        self.delivered_quantity
    }

    pub fn pending_quantity(&self) -> i64 {
        self.ordered_quantity - self.delivered_quantity
    }

    pub fn status(&self) -> LpoStatus {
        self.status
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn expected_delivery(&self) -> Option<NaiveDate> {
        self.expected_delivery
    }
}

impl AggregateRoot for Lpo {
    type Id = LpoId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueLpo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLpo {
    pub tenant_id: TenantId,
    pub lpo_id: LpoId,
    pub lpo_number: String,
    pub supplier_id: PartyId,
    pub product_id: ProductId,
    pub ordered_quantity: i64,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelivery {
    pub tenant_id: TenantId,
    pub lpo_id: LpoId,
    pub delivered_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelLpo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelLpo {
    pub tenant_id: TenantId,
    pub lpo_id: LpoId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LpoCommand {
    IssueLpo(IssueLpo),
    RecordDelivery(RecordDelivery),
    CancelLpo(CancelLpo),
}

/// Event: LpoIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpoIssued {
    pub tenant_id: TenantId,
    pub lpo_id: LpoId,
    pub lpo_number: String,
    pub supplier_id: PartyId,
    pub product_id: ProductId,
    pub ordered_quantity: i64,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveryRecorded.
///
/// Carries supplier and product so the matching stock movement can be built
/// from the event alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecorded {
    pub tenant_id: TenantId,
    pub lpo_id: LpoId,
    pub supplier_id: PartyId,
    pub product_id: ProductId,
    pub delivered_quantity: i64,
    pub total_delivered: i64,
    pub status: LpoStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LpoCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpoCancelled {
    pub tenant_id: TenantId,
    pub lpo_id: LpoId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LpoEvent {
    LpoIssued(LpoIssued),
    DeliveryRecorded(DeliveryRecorded),
    LpoCancelled(LpoCancelled),
}

impl Event for LpoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LpoEvent::LpoIssued(_) => "purchasing.lpo.issued",
            LpoEvent::DeliveryRecorded(_) => "purchasing.lpo.delivery_recorded",
            LpoEvent::LpoCancelled(_) => "purchasing.lpo.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LpoEvent::LpoIssued(e) => e.occurred_at,
            LpoEvent::DeliveryRecorded(e) => e.occurred_at,
            LpoEvent::LpoCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lpo {
    type Command = LpoCommand;
    type Event = LpoEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LpoEvent::LpoIssued(e) => {
                self.id = e.lpo_id;
                self.tenant_id = Some(e.tenant_id);
                self.lpo_number = e.lpo_number.clone();
                self.supplier_id = Some(e.supplier_id);
                self.product_id = Some(e.product_id);
                self.ordered_quantity = e.ordered_quantity;
                self.delivered_quantity = 0;
                self.status = LpoStatus::Pending;
                self.order_date = Some(e.order_date);
                self.expected_delivery = e.expected_delivery;
                self.created = true;
            }
            LpoEvent::DeliveryRecorded(e) => {
                self.delivered_quantity = e.total_delivered;
                self.status = e.status;
            }
            LpoEvent::LpoCancelled(_) => {
                self.status = LpoStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LpoCommand::IssueLpo(cmd) => self.handle_issue(cmd),
            LpoCommand::RecordDelivery(cmd) => self.handle_delivery(cmd),
            LpoCommand::CancelLpo(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Lpo {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_lpo_id(&self, lpo_id: LpoId) -> Result<(), DomainError> {
        if self.id != lpo_id {
            return Err(DomainError::invariant("lpo_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, lpo_id: LpoId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("lpo {lpo_id}")));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_lpo_id(lpo_id)
    }

    fn handle_issue(&self, cmd: &IssueLpo) -> Result<Vec<LpoEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("lpo already exists"));
        }
        self.ensure_lpo_id(cmd.lpo_id)?;
        if cmd.lpo_number.trim().is_empty() {
            return Err(DomainError::validation("lpo_number", "cannot be empty"));
        }
        if cmd.ordered_quantity < 1 {
            return Err(DomainError::validation("ordered_quantity", "must be at least 1"));
        }
        if let Some(expected) = cmd.expected_delivery {
            if expected < cmd.order_date {
                return Err(DomainError::validation(
                    "expected_delivery",
                    "cannot be before the order date",
                ));
            }
        }

        Ok(vec![LpoEvent::LpoIssued(LpoIssued {
            tenant_id: cmd.tenant_id,
            lpo_id: cmd.lpo_id,
            lpo_number: cmd.lpo_number.trim().to_string(),
            supplier_id: cmd.supplier_id,
            product_id: cmd.product_id,
            ordered_quantity: cmd.ordered_quantity,
            order_date: cmd.order_date,
            expected_delivery: cmd.expected_delivery,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delivery(&self, cmd: &RecordDelivery) -> Result<Vec<LpoEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lpo_id)?;
        if self.status == LpoStatus::Cancelled {
            return Err(DomainError::validation("lpo", "is cancelled"));
        }
        if cmd.delivered_quantity <= 0 {
            return Err(DomainError::validation(
                "delivered_quantity",
                "must be greater than 0",
            ));
        }
        let pending = self.pending_quantity();
        if cmd.delivered_quantity > pending {
            return Err(DomainError::validation(
                "delivered_quantity",
                format!("{} exceeds pending quantity ({pending})", cmd.delivered_quantity),
            ));
        }

        let (supplier_id, product_id) = match (self.supplier_id, self.product_id) {
            (Some(s), Some(p)) => (s, p),
            _ => return Err(DomainError::invariant("issued lpo without supplier or product")),
        };
        let total_delivered = self.delivered_quantity + cmd.delivered_quantity;
        let status = if total_delivered == self.ordered_quantity {
            LpoStatus::Completed
        } else {
            LpoStatus::Partial
        };

        Ok(vec![LpoEvent::DeliveryRecorded(DeliveryRecorded {
            tenant_id: cmd.tenant_id,
            lpo_id: cmd.lpo_id,
            supplier_id,
            product_id,
            delivered_quantity: cmd.delivered_quantity,
            total_delivered,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelLpo) -> Result<Vec<LpoEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lpo_id)?;
        match self.status {
            LpoStatus::Cancelled => Ok(vec![]),
            LpoStatus::Completed => Err(DomainError::validation(
                "status",
                "a completed LPO cannot be cancelled",
            )),
            LpoStatus::Pending | LpoStatus::Partial => Ok(vec![LpoEvent::LpoCancelled(LpoCancelled {
                tenant_id: cmd.tenant_id,
                lpo_id: cmd.lpo_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}
