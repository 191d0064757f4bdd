//! OAuth2 login error types.

use cmdref_identity_session::SessionError;
use std::time::Duration;
use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Secure random source failed: {0}")]
    RandomSource(#[from] rand::Error),

    #[error("Local callback server failed: {0}")]
    CallbackServer(#[source] std::io::Error),

    #[error("Authorization failed: {error} ({description})")]
    Authorization { error: String, description: String },

    #[error(
        "Login timed out after {}s without a browser redirect; run login again",
        .0.as_secs()
    )]
    Timeout(Duration),

    #[error("Login cancelled")]
    Cancelled,

    #[error("Token exchange with {endpoint} failed with HTTP {status}: {body}")]
    TokenExchangeFailed {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Token endpoint returned an empty token")]
    EmptyToken,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}
