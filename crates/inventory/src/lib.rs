//! Inventory domain module (event-sourced stock ledger).
//!
//! A product's stock on hand is never written directly. Every change is an
//! immutable [`StockMovement`] appended to the product's stream, and the cached
//! `current_stock` is the fold of those movements' signed deltas.

pub mod movement;
pub mod product;

pub use movement::{MovementDirection, MovementReason, StockMovement, replay};
pub use product::{
    AdjustStock, ConsumeForSale, DeactivateProduct, Product, ProductCommand,
    ProductDeactivated, ProductEvent, ProductId, ProductReactivated, ProductRegistered,
    ProductUpdated, ReactivateProduct, RecordMovement, RegisterProduct, Restock,
    StockMovementRecorded, UpdateProduct,
};
