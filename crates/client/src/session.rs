use std::future::Future;
use std::sync::RwLock;

use reqwest::Url;

use duka_core::{TenantId, UserId};

use crate::error::ClientError;

/// Produces a fresh bearer token after the server answered 401.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self) -> impl Future<Output = Result<String, ClientError>> + Send;
}

/// Used when the client has no way to refresh credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

impl TokenRefresher for NoRefresh {
    async fn refresh(&self) -> Result<String, ClientError> {
        Err(ClientError::Refresh("no token refresher configured".to_string()))
    }
}

/// Who is talking to which server.
#[derive(Debug)]
pub struct Session {
    base_url: Url,
    tenant_id: TenantId,
    user_id: Option<UserId>,
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new(base_url: &str, tenant_id: TenantId) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        // Url::join drops the last segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            tenant_id,
            user_id: None,
            token: RwLock::new(None),
        })
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    pub fn set_token(&self, token: String) {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }
    }

    /// Resolve a server path (`/sales`), a relative `next` link or an
    /// absolute URL against the base.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, ClientError> {
        let relative = path_or_url.trim_start_matches('/');
        if path_or_url.contains("://") {
            Url::parse(path_or_url)
        } else {
            self.base_url.join(relative)
        }
        .map_err(|e| ClientError::InvalidUrl(format!("{path_or_url}: {e}")))
    }
}
