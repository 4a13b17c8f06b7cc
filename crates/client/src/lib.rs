//! `duka-client`: typed HTTP client for the ledger API.
//!
//! Holds the caller's [`Session`] (base URL, tenant, user, bearer token),
//! refreshes the token once on a 401 and normalizes the two list envelopes
//! into [`Page`].

pub mod client;
pub mod error;
pub mod models;
pub mod page;
pub mod session;

pub use client::DukaClient;
pub use error::{ApiErrorBody, ClientError};
pub use page::{ListEnvelope, Page};
pub use session::{NoRefresh, Session, TokenRefresher};
