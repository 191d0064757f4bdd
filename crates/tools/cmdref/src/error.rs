use crate::api::ApiError;
use cmdref_identity_oauth2::OAuth2Error;
use cmdref_identity_session::SessionError;
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced by the cmdref binary, each with a stable exit code.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("not logged in. run: cmdref login")]
    NotLoggedIn,

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("login failed: {0}")]
    Login(#[from] OAuth2Error),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("error copying: {0}")]
    Clipboard(String),

    #[error("run error: could not start {shell}: {source}")]
    Spawn {
        shell: String,
        source: std::io::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Login(OAuth2Error::Session(_)) => 2,
            CliError::Login(_) | CliError::Output(_) => 1,
            CliError::Api(ApiError::NotFound { .. }) => 3,
            CliError::InvalidInput(_)
            | CliError::NotLoggedIn
            | CliError::Api(_)
            | CliError::Session(_) => 2,
            CliError::Clipboard(_) => 4,
            CliError::Spawn { .. } => 5,
        }
    }
}
