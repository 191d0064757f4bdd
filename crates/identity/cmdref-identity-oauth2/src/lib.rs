//! Loopback OAuth2 login with PKCE for the cmdref CLI.
//!
//! The flow binds a short-lived HTTP listener on `127.0.0.1`, sends the user's
//! browser to the provider with an S256 code challenge and a CSRF state token,
//! captures the single redirect, and exchanges the code through the cmdref
//! backend for a session credential that is then persisted.

mod browser;
mod config;
mod error;
mod exchange;
mod flow;
mod pkce;
mod server;
mod types;

#[cfg(test)]
mod tests;

pub use browser::{BrowserLauncher, PrintOnly, SystemBrowser};
pub use config::{
    DEFAULT_CALLBACK_PATH, DEFAULT_CALLBACK_TIMEOUT, GOOGLE_AUTHORIZATION_ENDPOINT, LoginConfig,
};
pub use error::{OAuth2Error, OAuth2Result};
pub use exchange::{BackendExchanger, CodeExchanger, EXCHANGE_PATH};
pub use flow::{LoginFlow, LoginPhase, authorization_url};
pub use pkce::{CHALLENGE_METHOD, PkceParams, code_challenge};
pub use server::CallbackServer;
pub use types::{AuthorizationOutcome, CallbackQuery, ExchangeRequest, ExchangeResponse};

// Re-export common types for convenience
pub use cmdref_identity_core::Credential;
pub use cmdref_identity_session::{SessionError, SessionStore};
