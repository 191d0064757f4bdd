use crate::commands::App;
use crate::config::{
    CliConfig, DEFAULT_API_BASE, DEFAULT_CLIENT_ID, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_LOGIN_TIMEOUT_SECS,
};
use crate::error::CliResult;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Save and recall important terminal commands
#[derive(Parser, Debug)]
#[command(name = "cmdref")]
#[command(about = "Save and recall important terminal commands")]
#[command(version)]
pub struct Args {
    /// Base URL of the cmdref API
    #[arg(long, env = "CMDREF_API_BASE", default_value = DEFAULT_API_BASE, global = true)]
    pub api_base: String,

    /// Google OAuth desktop client id
    #[arg(long, env = "CMDREF_GOOGLE_CLIENT_ID", default_value = DEFAULT_CLIENT_ID, global = true)]
    pub client_id: String,

    /// Directory holding the session file (defaults to ~/.cmdref)
    #[arg(long, env = "CMDREF_HOME", value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    /// Seconds to wait for the browser redirect during login
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_LOGIN_TIMEOUT_SECS, global = true)]
    pub login_timeout: u64,

    /// Timeout in seconds for API requests
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS, global = true)]
    pub http_timeout: u64,

    /// Shell used by `run` (falls back to /bin/sh)
    #[arg(long, env = "SHELL", global = true)]
    pub shell: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Sign in with Google through the browser
    Login {
        /// Print the login URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Show the signed-in account
    Whoami,
    /// Forget the stored session
    Logout,
    /// Save a new command
    Add {
        #[arg(long)]
        title: String,

        /// The command line to save
        #[arg(long = "cmd", value_name = "COMMAND")]
        command: String,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },
    /// List saved commands
    List,
    /// Search saved commands
    Search {
        #[arg(required = true, num_args = 1.., value_name = "QUERY")]
        query: Vec<String>,
    },
    /// Show one command in full
    Show { id: String },
    /// Copy a command to the clipboard
    Copy { id: String },
    /// Run a command through the shell
    Run { id: String },
    /// Delete a command
    Rm { id: String },
}

impl Args {
    /// Execute the parsed command, returning the process exit code.
    pub async fn run(&self) -> CliResult<i32> {
        let config = CliConfig::from_args(self)?;
        let app = App::new(config);
        let mut stdout = std::io::stdout();
        app.execute(&self.command, &mut stdout).await
    }
}
