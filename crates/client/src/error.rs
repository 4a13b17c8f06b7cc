use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Error body the server sends with every non-2xx response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default)]
    pub message: String,
    pub field: Option<String>,
    pub requested: Option<i64>,
    pub available: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status}: {body:?}")]
    Api { status: StatusCode, body: ApiErrorBody },

    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// A `next` link pointed back at a page already fetched.
    #[error("pagination loops back to {0}")]
    RepeatedPage(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Field named by a validation failure, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            ClientError::Api { body, .. } => body.field.as_deref(),
            _ => None,
        }
    }

    /// A 409 means the whole command can be retried.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }
}
