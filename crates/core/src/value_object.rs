//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attributes; two amounts of
/// `Money::from_cents(100)` are the same value no matter where they came from.
/// To "change" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
