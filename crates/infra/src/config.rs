//! Ledger configuration, read from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `DUKA_VAT_RATE_BPS` | `1600` | VAT applied to new sales, in basis points |
//! | `DUKA_LOCK_TIMEOUT_MS` | `2000` | Longest wait for aggregate locks before a conflict |
//! | `DUKA_STORE` | `memory` | `memory` or `postgres` |
//! | `DATABASE_URL` | none | Required when `DUKA_STORE=postgres` |

use std::time::Duration;

use thiserror::Error;

use duka_core::VatRate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub vat_rate: VatRate,
    pub lock_timeout: Duration,
    pub store: StoreBackend,
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            vat_rate: VatRate::STANDARD,
            lock_timeout: Duration::from_millis(2_000),
            store: StoreBackend::Memory,
            database_url: None,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(raw) = lookup("DUKA_VAT_RATE_BPS") {
            let bps = raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                var: "DUKA_VAT_RATE_BPS",
                message: e.to_string(),
            })?;
            cfg.vat_rate = VatRate::from_basis_points(bps).map_err(|e| ConfigError::Invalid {
                var: "DUKA_VAT_RATE_BPS",
                message: e.to_string(),
            })?;
        }

        if let Some(raw) = lookup("DUKA_LOCK_TIMEOUT_MS") {
            let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: "DUKA_LOCK_TIMEOUT_MS",
                message: e.to_string(),
            })?;
            cfg.lock_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("DUKA_STORE") {
            cfg.store = match raw.trim().to_ascii_lowercase().as_str() {
                "memory" | "in_memory" => StoreBackend::Memory,
                "postgres" => StoreBackend::Postgres,
                other => {
                    return Err(ConfigError::Invalid {
                        var: "DUKA_STORE",
                        message: format!("unknown store '{other}' (expected memory or postgres)"),
                    });
                }
            };
        }

        cfg.database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if cfg.store == StoreBackend::Postgres && cfg.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(LedgerConfig::from_lookup(lookup(&[])).unwrap(), LedgerConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = LedgerConfig::from_lookup(lookup(&[
            ("DUKA_VAT_RATE_BPS", "800"),
            ("DUKA_LOCK_TIMEOUT_MS", "50"),
        ]))
        .unwrap();
        assert_eq!(cfg.vat_rate.basis_points(), 800);
        assert_eq!(cfg.lock_timeout, Duration::from_millis(50));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(LedgerConfig::from_lookup(lookup(&[("DUKA_VAT_RATE_BPS", "abc")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[("DUKA_VAT_RATE_BPS", "20000")])).is_err());
        assert_eq!(
            LedgerConfig::from_lookup(lookup(&[("DUKA_STORE", "postgres")])).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }
}
