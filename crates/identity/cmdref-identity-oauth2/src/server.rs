//! Loopback HTTP server that receives the provider redirect.
//!
//! The server binds `127.0.0.1:0`, answers a single route, and hands the first
//! valid outcome to the orchestrator through a single-use slot. Requests with a
//! foreign `state` are rejected and never reach the orchestrator.

use crate::types::{AuthorizationOutcome, CallbackQuery};
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on waiting for in-flight responses after shutdown is signalled.
/// The listening socket itself is closed as soon as the signal fires.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>cmdref login</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h3>Login successful.</h3>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#;

const ALREADY_HANDLED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>cmdref login</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h3>This login was already handled.</h3>
<p>Return to the terminal to see the result.</p>
</body>
</html>"#;

fn failure_page(error: &str, description: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>cmdref login</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h3>Login failed.</h3>
<p>{}: {}</p>
<p>Return to the terminal and run the login command again.</p>
</body>
</html>"#,
        escape_html(error),
        escape_html(description)
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    slot: Arc<Mutex<Option<oneshot::Sender<AuthorizationOutcome>>>>,
}

impl CallbackState {
    /// Hand the outcome to the orchestrator if nothing was delivered yet.
    async fn deliver(&self, outcome: AuthorizationOutcome) -> bool {
        let sender = self.slot.lock().await.take();
        match sender {
            Some(sender) => sender.send(outcome).is_ok(),
            None => {
                debug!("Authorization outcome already captured, ignoring repeat callback");
                false
            }
        }
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if query.state.as_deref() != Some(&*state.expected_state) {
        warn!("Rejected callback with missing or mismatched state");
        return (StatusCode::BAD_REQUEST, "Invalid state").into_response();
    }

    if let Some(error) = query.error.filter(|e| !e.is_empty()) {
        let description = query.error_description.unwrap_or_default();
        info!("Provider reported authorization error: {}", error);
        let page = failure_page(&error, &description);
        let delivered = state
            .deliver(AuthorizationOutcome::Denied { error, description })
            .await;
        if !delivered {
            return Html(ALREADY_HANDLED_PAGE).into_response();
        }
        return (StatusCode::BAD_REQUEST, Html(page)).into_response();
    }

    match query.code.filter(|c| !c.is_empty()) {
        Some(code) => {
            debug!("Received authorization code");
            if state.deliver(AuthorizationOutcome::Code(code)).await {
                Html(SUCCESS_PAGE).into_response()
            } else {
                Html(ALREADY_HANDLED_PAGE).into_response()
            }
        }
        None => (StatusCode::BAD_REQUEST, "Missing code").into_response(),
    }
}

/// A running loopback listener for one login attempt.
///
/// Dropping the server signals shutdown; [`CallbackServer::shutdown`] also
/// waits for the server task so the port is known to be free afterwards.
pub struct CallbackServer {
    addr: SocketAddr,
    redirect_uri: String,
    outcome_rx: Option<oneshot::Receiver<AuthorizationOutcome>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl CallbackServer {
    /// Bind an OS-assigned loopback port and start serving `callback_path`.
    pub async fn bind(callback_path: &str, expected_state: &str) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let redirect_uri = format!("http://{}{}", addr, callback_path);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState {
            expected_state: Arc::from(expected_state),
            slot: Arc::new(Mutex::new(Some(outcome_tx))),
        };

        let app = Router::new()
            .route(callback_path, get(handle_callback))
            .with_state(state);

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        debug!(port = addr.port(), "Callback server listening");

        Ok(Self {
            addr,
            redirect_uri,
            outcome_rx: Some(outcome_rx),
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the first delivered outcome.
    ///
    /// Returns `None` if the server stopped without delivering anything, or if
    /// the outcome was already taken.
    pub async fn next_outcome(&mut self) -> Option<AuthorizationOutcome> {
        let rx = self.outcome_rx.as_mut()?;
        let outcome = rx.await.ok();
        self.outcome_rx = None;
        outcome
    }

    /// Stop accepting connections, let in-flight responses drain, and release the port.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let Some(task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(DRAIN_GRACE, task).await {
            Ok(Ok(Ok(()))) => debug!(port = self.port(), "Callback server stopped"),
            Ok(Ok(Err(e))) => warn!("Callback server exited with error: {}", e),
            Ok(Err(e)) => warn!("Callback server task failed: {}", e),
            Err(_) => warn!("Callback server connections still draining after shutdown"),
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
