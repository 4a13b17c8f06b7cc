//! Customer and supplier registry.
//!
//! The ledger only needs to know that a counterparty exists, which side of
//! the trade it is on, and whether it may still transact.

pub mod party;

pub use party::{
    DeactivateParty, Party, PartyCommand, PartyDeactivated, PartyEvent, PartyId, PartyKind,
    PartyRegistered, RegisterParty,
};
