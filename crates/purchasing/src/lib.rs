//! Purchasing domain module: local purchase orders and their deliveries.

pub mod lpo;

pub use lpo::{
    CancelLpo, DeliveryRecorded, IssueLpo, Lpo, LpoCancelled, LpoCommand, LpoEvent, LpoId,
    LpoIssued, LpoStatus, RecordDelivery,
};
