use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duka_core::{AggregateId, UserId};
use duka_parties::PartyId;

use crate::product::ProductId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementDirection {
    In,
    Out,
}

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReason {
    Restock,
    Adjustment,
    Initial,
    Return,
    Sale,
    Damage,
    Transfer,
    PurchaseDelivery,
}

impl MovementReason {
    /// Whether a movement with this reason may go in `direction`.
    pub fn allows(self, direction: MovementDirection) -> bool {
        use MovementDirection::*;
        match self {
            MovementReason::Restock | MovementReason::Initial | MovementReason::PurchaseDelivery => {
                direction == In
            }
            MovementReason::Sale | MovementReason::Damage => direction == Out,
            MovementReason::Adjustment | MovementReason::Return | MovementReason::Transfer => true,
        }
    }
}

/// One immutable ledger entry.
///
/// `quantity` is always a positive magnitude; the sign comes from `direction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: Uuid,
    pub product_id: ProductId,
    pub direction: MovementDirection,
    pub reason: MovementReason,
    pub quantity: i64,
    /// Set for restocks and purchase deliveries.
    pub supplier_id: Option<PartyId>,
    /// Set for sale consumption and customer returns.
    pub sale_id: Option<AggregateId>,
    /// Set for purchase deliveries.
    pub lpo_id: Option<AggregateId>,
    pub notes: Option<String>,
    pub recorded_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn signed_delta(&self) -> i64 {
        match self.direction {
            MovementDirection::In => self.quantity,
            MovementDirection::Out => -self.quantity,
        }
    }
}

/// Fold movements (in creation order) into a stock level.
pub fn replay<'a, I>(movements: I) -> i64
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    movements.into_iter().map(StockMovement::signed_delta).sum()
}
