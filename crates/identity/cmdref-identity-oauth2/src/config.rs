//! Login flow configuration.

use std::collections::HashMap;
use std::time::Duration;

pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(180);

/// Everything the orchestrator needs to build the authorization request.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub client_id: String,
    pub authorization_endpoint: String,
    pub scopes: Vec<String>,
    /// Provider-specific parameters appended to the authorization URL
    pub auth_params: HashMap<String, String>,
    /// Path the loopback server answers on
    pub callback_path: String,
    /// How long to wait for the browser redirect
    pub callback_timeout: Duration,
}

impl LoginConfig {
    pub fn new(client_id: impl Into<String>, authorization_endpoint: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorization_endpoint: authorization_endpoint.into(),
            scopes: Vec::new(),
            auth_params: HashMap::new(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    /// Google desktop-app login, asking for a long-lived grant.
    pub fn google(client_id: impl Into<String>) -> Self {
        Self::new(client_id, GOOGLE_AUTHORIZATION_ENDPOINT)
            .with_scopes(["openid", "email", "profile"])
            .with_auth_param("access_type", "offline")
            .with_auth_param("prompt", "consent")
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_params.insert(key.into(), value.into());
        self
    }

    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.callback_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }
}
