//! OAuth2 protocol types.

use serde::{Deserialize, Serialize};

/// Query parameters the provider appends to the loopback redirect
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// The single result of one authorization attempt, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Code(String),
    Denied { error: String, description: String },
}

/// Body sent to the backend exchange endpoint
#[derive(Debug, Serialize)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub code_verifier: &'a str,
    pub redirect_uri: &'a str,
}

/// Backend exchange response: the cmdref session token plus identity fields
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}
