//! cmdref: a personal catalog of terminal commands backed by the cmdref API.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Args, Commands};
pub use commands::App;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
