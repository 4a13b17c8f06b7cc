//! Server configuration, read once from the environment at start-up.
//!
//! `DUKA_BIND_ADDR` (default `0.0.0.0:8080`) plus everything
//! [`LedgerConfig`] reads.

use std::net::SocketAddr;

use thiserror::Error;

use duka_infra::{ConfigError, LedgerConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiConfigError {
    #[error("DUKA_BIND_ADDR: {0}")]
    BindAddr(String),

    #[error(transparent)]
    Ledger(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub ledger: LedgerConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ApiConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiConfigError> {
        let raw = lookup("DUKA_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw
            .trim()
            .parse()
            .map_err(|e: std::net::AddrParseError| ApiConfigError::BindAddr(e.to_string()))?;
        Ok(Self {
            bind_addr,
            ledger: LedgerConfig::from_lookup(lookup)?,
        })
    }

    /// In-memory store on an ephemeral localhost port; used by tests.
    pub fn ephemeral() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ledger: LedgerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| vars.get(k).cloned()
    }

    #[test]
    fn defaults_to_port_8080() {
        let cfg = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.ledger, LedgerConfig::default());
    }

    #[test]
    fn reads_bind_addr_and_ledger_settings() {
        let cfg = ApiConfig::from_lookup(lookup(&[
            ("DUKA_BIND_ADDR", "127.0.0.1:9000"),
            ("DUKA_LOCK_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.ledger.lock_timeout.as_millis(), 250);
    }

    #[test]
    fn rejects_a_bad_address() {
        let err = ApiConfig::from_lookup(lookup(&[("DUKA_BIND_ADDR", "nowhere")])).unwrap_err();
        assert!(matches!(err, ApiConfigError::BindAddr(_)));
    }
}
