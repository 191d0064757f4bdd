//! Login orchestration.
//!
//! One attempt walks `Idle → Listening → WaitingForCallback → Exchanging` and
//! ends in `Succeeded` or `Failed`. While waiting, three producers race: the
//! callback server (code or provider error), a wall-clock timer, and an
//! optional external cancel signal. The first to resolve wins and the callback
//! server is shut down before anything else happens.

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::config::LoginConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::exchange::CodeExchanger;
use crate::pkce::{CHALLENGE_METHOD, PkceParams};
use crate::server::CallbackServer;
use crate::types::AuthorizationOutcome;
use cmdref_identity_core::Credential;
use cmdref_identity_session::SessionStore;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    Idle,
    Listening,
    WaitingForCallback,
    Exchanging,
    Succeeded,
    Failed,
}

impl fmt::Display for LoginPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginPhase::Idle => "idle",
            LoginPhase::Listening => "listening",
            LoginPhase::WaitingForCallback => "waiting-for-callback",
            LoginPhase::Exchanging => "exchanging",
            LoginPhase::Succeeded => "succeeded",
            LoginPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct PhaseTracker(LoginPhase);

impl PhaseTracker {
    fn advance(&mut self, next: LoginPhase) {
        debug!(from = %self.0, to = %next, "Login phase transition");
        self.0 = next;
    }

    fn fail<T>(&mut self, err: OAuth2Error) -> OAuth2Result<T> {
        self.advance(LoginPhase::Failed);
        Err(err)
    }
}

enum WaitEvent {
    Outcome(AuthorizationOutcome),
    ServerStopped,
    TimedOut,
    Cancelled,
}

/// Build the provider authorization URL for one attempt.
pub fn authorization_url(
    config: &LoginConfig,
    redirect_uri: &str,
    pkce: &PkceParams,
) -> OAuth2Result<Url> {
    let mut url = Url::parse(&config.authorization_endpoint)?;

    {
        let mut params = url.query_pairs_mut();
        params.append_pair("client_id", &config.client_id);
        params.append_pair("redirect_uri", redirect_uri);
        params.append_pair("response_type", "code");

        if !config.scopes.is_empty() {
            params.append_pair("scope", &config.scopes.join(" "));
        }

        params.append_pair("state", &pkce.state);
        params.append_pair("code_challenge", &pkce.code_challenge);
        params.append_pair("code_challenge_method", CHALLENGE_METHOD);

        for (key, value) in &config.auth_params {
            params.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Drives one complete loopback PKCE login and persists the result.
pub struct LoginFlow {
    config: LoginConfig,
    exchanger: Arc<dyn CodeExchanger>,
    sessions: Arc<dyn SessionStore>,
    browser: Arc<dyn BrowserLauncher>,
}

impl LoginFlow {
    pub fn new(
        config: LoginConfig,
        exchanger: Arc<dyn CodeExchanger>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            exchanger,
            sessions,
            browser: Arc::new(SystemBrowser),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Run the flow with the timeout as the only way out of the wait.
    pub async fn run(&self) -> OAuth2Result<Credential> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the flow, treating `cancel` resolving as one more racing event.
    pub async fn run_until<F>(&self, cancel: F) -> OAuth2Result<Credential>
    where
        F: Future<Output = ()>,
    {
        let mut phase = PhaseTracker(LoginPhase::Idle);

        let pkce = match PkceParams::generate() {
            Ok(pkce) => pkce,
            Err(e) => return phase.fail(e),
        };

        let mut server =
            match CallbackServer::bind(&self.config.callback_path, &pkce.state).await {
                Ok(server) => server,
                Err(e) => return phase.fail(OAuth2Error::CallbackServer(e)),
            };
        let redirect_uri = server.redirect_uri().to_string();
        phase.advance(LoginPhase::Listening);

        let auth_url = match authorization_url(&self.config, &redirect_uri, &pkce) {
            Ok(url) => url,
            Err(e) => {
                server.shutdown().await;
                return phase.fail(e);
            }
        };

        self.hand_off(auth_url.as_str());
        phase.advance(LoginPhase::WaitingForCallback);

        let timeout = self.config.callback_timeout;
        let event = tokio::select! {
            outcome = server.next_outcome() => match outcome {
                Some(outcome) => WaitEvent::Outcome(outcome),
                None => WaitEvent::ServerStopped,
            },
            _ = tokio::time::sleep(timeout) => WaitEvent::TimedOut,
            _ = cancel => WaitEvent::Cancelled,
        };

        server.shutdown().await;

        let code = match event {
            WaitEvent::Outcome(AuthorizationOutcome::Code(code)) => code,
            WaitEvent::Outcome(AuthorizationOutcome::Denied { error, description }) => {
                return phase.fail(OAuth2Error::Authorization { error, description });
            }
            WaitEvent::ServerStopped => {
                return phase.fail(OAuth2Error::CallbackServer(std::io::Error::other(
                    "callback server stopped before a redirect arrived",
                )));
            }
            WaitEvent::TimedOut => {
                warn!("No browser redirect within {:?}", timeout);
                return phase.fail(OAuth2Error::Timeout(timeout));
            }
            WaitEvent::Cancelled => return phase.fail(OAuth2Error::Cancelled),
        };

        phase.advance(LoginPhase::Exchanging);

        let credential = match self
            .exchanger
            .exchange(&code, &pkce.code_verifier, &redirect_uri)
            .await
        {
            Ok(credential) => credential,
            Err(e) => return phase.fail(e),
        };

        let stored = match self.sessions.save(&credential) {
            Ok(stored) => stored,
            Err(e) => return phase.fail(e.into()),
        };

        phase.advance(LoginPhase::Succeeded);
        info!("Login completed for {}", stored.display_identity());
        Ok(stored)
    }

    fn hand_off(&self, url: &str) {
        println!("Opening browser for login...");
        println!("If it does not open, visit this URL:\n\n  {}\n", url);

        if let Err(e) = self.browser.open(url) {
            warn!("Failed to launch browser: {}", e);
            eprintln!("Could not open a browser ({}); use the URL above.", e);
        }
    }
}
