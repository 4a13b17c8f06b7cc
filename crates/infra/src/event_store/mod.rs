//! Append-only event store boundary.
//!
//! Tenant-scoped event streams with optimistic concurrency and an atomic
//! multi-stream append, without assumptions about the storage engine.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
