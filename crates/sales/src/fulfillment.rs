//! Per-line fulfillment: how much of the ordered quantity has gone out.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use duka_core::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupplyStatus {
    #[serde(rename = "Not Supplied")]
    NotSupplied,
    #[serde(rename = "Partially Supplied")]
    PartiallySupplied,
    Supplied,
}

impl SupplyStatus {
    /// The only status consistent with `supplied` out of `ordered`.
    pub fn derive(ordered: i64, supplied: i64) -> Result<Self, DomainError> {
        if supplied < 0 {
            return Err(DomainError::validation("quantity_supplied", "cannot be negative"));
        }
        if supplied > ordered {
            return Err(DomainError::validation(
                "quantity_supplied",
                format!("{supplied} exceeds quantity ordered ({ordered})"),
            ));
        }
        Ok(if supplied == 0 {
            SupplyStatus::NotSupplied
        } else if supplied == ordered {
            SupplyStatus::Supplied
        } else {
            SupplyStatus::PartiallySupplied
        })
    }

    /// Derive the status and reject a caller-declared one that disagrees.
    pub fn reconcile(declared: Option<SupplyStatus>, ordered: i64, supplied: i64) -> Result<Self, DomainError> {
        let derived = Self::derive(ordered, supplied)?;
        match declared {
            Some(status) if status != derived => Err(DomainError::validation(
                "supply_status",
                format!(
                    "'{}' does not match {supplied} of {ordered} supplied (expected '{}')",
                    status.as_str(),
                    derived.as_str()
                ),
            )),
            _ => Ok(derived),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SupplyStatus::NotSupplied => "Not Supplied",
            SupplyStatus::PartiallySupplied => "Partially Supplied",
            SupplyStatus::Supplied => "Supplied",
        }
    }
}

impl FromStr for SupplyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "not supplied" => Ok(SupplyStatus::NotSupplied),
            "partially supplied" => Ok(SupplyStatus::PartiallySupplied),
            "supplied" => Ok(SupplyStatus::Supplied),
            _ => Err(DomainError::validation(
                "supply_status",
                format!("unknown supply status '{s}'"),
            )),
        }
    }
}

/// Stock effect of moving a line from one supplied quantity to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyChange {
    Unchanged,
    /// More goods left the shop: record `OUT/SALE`.
    Consume(i64),
    /// Goods came back from the customer: record `IN/RETURN`.
    Return(i64),
}

impl SupplyChange {
    pub fn between(previous: i64, next: i64) -> Self {
        match next - previous {
            0 => SupplyChange::Unchanged,
            d if d > 0 => SupplyChange::Consume(d),
            d => SupplyChange::Return(-d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn maps_supplied_quantity_to_status() {
        assert_eq!(SupplyStatus::derive(10, 0).unwrap(), SupplyStatus::NotSupplied);
        assert_eq!(SupplyStatus::derive(10, 4).unwrap(), SupplyStatus::PartiallySupplied);
        assert_eq!(SupplyStatus::derive(10, 10).unwrap(), SupplyStatus::Supplied);
    }

    #[test]
    fn out_of_range_supply_is_rejected() {
        assert!(SupplyStatus::derive(10, 11).is_err());
        assert!(SupplyStatus::derive(10, -1).is_err());
    }

    #[test]
    fn mismatched_declared_status_is_rejected() {
        let err = SupplyStatus::reconcile(Some(SupplyStatus::Supplied), 10, 4).unwrap_err();
        assert_eq!(err.field(), Some("supply_status"));
        assert_eq!(
            SupplyStatus::reconcile(None, 10, 4).unwrap(),
            SupplyStatus::PartiallySupplied
        );
    }

    #[test]
    fn parses_and_serializes_display_names() {
        assert_eq!(
            "partially_supplied".parse::<SupplyStatus>().unwrap(),
            SupplyStatus::PartiallySupplied
        );
        let json = serde_json::to_string(&SupplyStatus::NotSupplied).unwrap();
        assert_eq!(json, "\"Not Supplied\"");
    }

    #[test]
    fn supply_change_direction() {
        assert_eq!(SupplyChange::between(3, 3), SupplyChange::Unchanged);
        assert_eq!(SupplyChange::between(3, 7), SupplyChange::Consume(4));
        assert_eq!(SupplyChange::between(7, 2), SupplyChange::Return(5));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            .. ProptestConfig::default()
        })]

        #[test]
        fn derived_status_matches_bound(ordered in 1i64..1_000, supplied in -5i64..1_100) {
            match SupplyStatus::derive(ordered, supplied) {
                Ok(SupplyStatus::NotSupplied) => prop_assert_eq!(supplied, 0),
                Ok(SupplyStatus::Supplied) => prop_assert_eq!(supplied, ordered),
                Ok(SupplyStatus::PartiallySupplied) => prop_assert!(0 < supplied && supplied < ordered),
                Err(_) => prop_assert!(supplied < 0 || supplied > ordered),
            }
        }
    }
}
