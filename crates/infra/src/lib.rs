//! Infrastructure layer: event stores, locking, command dispatch, the ledger
//! service, read models and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod ledger;
pub mod locks;
pub mod projections;
pub mod read_model;
pub mod reservations;
pub mod unit_of_work;
pub mod workers;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::{ConfigError, LedgerConfig, StoreBackend};
pub use ledger::LedgerService;

#[cfg(test)]
mod integration_tests;
