//! Sale number allocation.
//!
//! Each tenant has one sequence stream per calendar year, addressed by a
//! deterministic id. Allocation is an ordinary event on that stream, so it is
//! serialized by the same stream lock and version check as every other write,
//! and it commits (or rolls back) together with the sale it numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use duka_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use duka_events::Event;

use crate::sale::SaleId;

/// Aggregate root: SaleNumberSequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleNumberSequence {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    year: i32,
    last: u32,
    version: u64,
}

impl SaleNumberSequence {
    /// Stream id of `tenant_id`'s sequence for `year`.
    pub fn stream_id(tenant_id: TenantId, year: i32) -> AggregateId {
        AggregateId::named(tenant_id, &format!("sales.sale_number.{year}"))
    }

    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            year: 0,
            last: 0,
            version: 0,
        }
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    pub fn format(year: i32, sequence: u32) -> String {
        format!("SALE-{year}-{sequence:05}")
    }
}

impl AggregateRoot for SaleNumberSequence {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AllocateSaleNumber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateSaleNumber {
    pub tenant_id: TenantId,
    pub year: i32,
    pub sale_id: SaleId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleNumberAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleNumberAllocated {
    pub tenant_id: TenantId,
    pub year: i32,
    pub sequence: u32,
    pub sale_number: String,
    pub sale_id: SaleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleNumberEvent {
    SaleNumberAllocated(SaleNumberAllocated),
}

impl Event for SaleNumberEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleNumberEvent::SaleNumberAllocated(_) => "sales.sale_number.allocated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleNumberEvent::SaleNumberAllocated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SaleNumberSequence {
    type Command = AllocateSaleNumber;
    type Event = SaleNumberEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleNumberEvent::SaleNumberAllocated(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.year = e.year;
                self.last = e.sequence;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.id != Self::stream_id(cmd.tenant_id, cmd.year) {
            return Err(DomainError::invariant("sale number stream mismatch"));
        }
        let sequence = self
            .last
            .checked_add(1)
            .ok_or_else(|| DomainError::conflict("sale number sequence exhausted"))?;

        Ok(vec![SaleNumberEvent::SaleNumberAllocated(SaleNumberAllocated {
            tenant_id: cmd.tenant_id,
            year: cmd.year,
            sequence,
            sale_number: Self::format(cmd.year, sequence),
            sale_id: cmd.sale_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_events::execute;

    fn allocate(seq: &mut SaleNumberSequence, tenant_id: TenantId, year: i32) -> String {
        let events = execute(
            seq,
            &AllocateSaleNumber {
                tenant_id,
                year,
                sale_id: SaleId::generate(),
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        match &events[0] {
            SaleNumberEvent::SaleNumberAllocated(e) => e.sale_number.clone(),
        }
    }

    #[test]
    fn numbers_are_sequential_and_zero_padded() {
        let tenant_id = TenantId::new();
        let mut seq = SaleNumberSequence::empty(SaleNumberSequence::stream_id(tenant_id, 2025));

        assert_eq!(allocate(&mut seq, tenant_id, 2025), "SALE-2025-00001");
        assert_eq!(allocate(&mut seq, tenant_id, 2025), "SALE-2025-00002");
        assert_eq!(seq.last(), 2);
        assert_eq!(seq.version(), 2);
    }

    #[test]
    fn allocation_on_wrong_year_stream_is_rejected() {
        let tenant_id = TenantId::new();
        let seq = SaleNumberSequence::empty(SaleNumberSequence::stream_id(tenant_id, 2025));
        let err = seq
            .handle(&AllocateSaleNumber {
                tenant_id,
                year: 2026,
                sale_id: SaleId::generate(),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
