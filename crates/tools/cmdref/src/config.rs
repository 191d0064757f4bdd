//! Resolved runtime configuration.

use crate::cli::Args;
use crate::error::CliResult;
use cmdref_identity_oauth2::LoginConfig;
use cmdref_identity_session::{DEFAULT_DIR_NAME, FileSessionStore, SessionError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8080";
pub const DEFAULT_CLIENT_ID: &str = "YOUR_DESKTOP_CLIENT_ID.apps.googleusercontent.com";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub api_base: String,
    pub client_id: String,
    /// Directory holding `session.json`
    pub home: PathBuf,
    pub login_timeout: Duration,
    pub http_timeout: Duration,
    /// Shell used by `run`, invoked as `<shell> -lc <command>`
    pub shell: String,
}

impl CliConfig {
    pub fn from_args(args: &Args) -> CliResult<Self> {
        let home = match &args.home {
            Some(home) => home.clone(),
            None => dirs::home_dir()
                .ok_or(SessionError::NoHomeDirectory)?
                .join(DEFAULT_DIR_NAME),
        };

        let shell = args
            .shell
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SHELL)
            .to_string();

        Ok(Self {
            api_base: args.api_base.trim_end_matches('/').to_string(),
            client_id: args.client_id.clone(),
            home,
            login_timeout: Duration::from_secs(args.login_timeout),
            http_timeout: Duration::from_secs(args.http_timeout),
            shell,
        })
    }

    pub fn session_store(&self) -> FileSessionStore {
        FileSessionStore::in_dir(&self.home)
    }

    pub fn login_config(&self) -> LoginConfig {
        LoginConfig::google(&self.client_id).with_timeout(self.login_timeout)
    }
}
