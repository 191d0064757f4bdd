//! Authorization code exchange against the cmdref backend.

use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::{ExchangeRequest, ExchangeResponse};
use async_trait::async_trait;
use cmdref_identity_core::Credential;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

pub const EXCHANGE_PATH: &str = "/v1/auth/google/exchange";

/// Turns an authorization code into a cmdref credential.
///
/// Implementations send exactly one request; codes are single-use so nothing
/// here retries.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> OAuth2Result<Credential>;
}

/// Exchanges codes through the backend proxy, which holds the provider
/// client secret and answers with its own session token.
#[derive(Clone)]
pub struct BackendExchanger {
    http_client: Client,
    endpoint: String,
}

impl BackendExchanger {
    pub fn new(api_base: &str, http_timeout: Duration) -> OAuth2Result<Self> {
        let http_client = Client::builder().timeout(http_timeout).build()?;
        Ok(Self::with_client(http_client, api_base))
    }

    pub fn with_client(http_client: Client, api_base: &str) -> Self {
        Self {
            http_client,
            endpoint: format!("{}{}", api_base.trim_end_matches('/'), EXCHANGE_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CodeExchanger for BackendExchanger {
    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> OAuth2Result<Credential> {
        let request = ExchangeRequest {
            code,
            code_verifier,
            redirect_uri,
        };

        debug!("Exchanging authorization code at {}", self.endpoint);

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Token exchange failed with HTTP {}", status.as_u16());
            return Err(OAuth2Error::TokenExchangeFailed {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ExchangeResponse = serde_json::from_str(&body)
            .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()))?;

        if parsed.token.is_empty() {
            return Err(OAuth2Error::EmptyToken);
        }

        info!("Successfully exchanged code for a session token");

        let mut credential = Credential::new(parsed.token, parsed.email, parsed.name);
        credential.picture = parsed.picture.filter(|p| !p.is_empty());
        Ok(credential)
    }
}
