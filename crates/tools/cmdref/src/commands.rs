//! Handlers behind each subcommand.

use crate::api::{CatalogClient, Command, NewCommand};
use crate::cli::Commands;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use cmdref_identity_oauth2::{
    BackendExchanger, BrowserLauncher, LoginFlow, PrintOnly, SystemBrowser,
};
use cmdref_identity_session::SessionStore;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// An external program that reads text on stdin and puts it on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardTool {
    pub program: String,
    pub args: Vec<String>,
}

impl ClipboardTool {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Tools tried in order on the current platform.
    pub fn platform_defaults() -> Vec<Self> {
        if cfg!(target_os = "macos") {
            vec![Self::new("pbcopy", Vec::<String>::new())]
        } else if cfg!(windows) {
            vec![Self::new("clip", Vec::<String>::new())]
        } else {
            vec![
                Self::new("wl-copy", Vec::<String>::new()),
                Self::new("xclip", ["-selection", "clipboard"]),
                Self::new("xsel", ["--clipboard", "--input"]),
            ]
        }
    }
}

pub struct App {
    config: CliConfig,
    sessions: Arc<dyn SessionStore>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    clipboard: Vec<ClipboardTool>,
}

impl App {
    pub fn new(config: CliConfig) -> Self {
        let sessions = Arc::new(config.session_store());
        Self {
            config,
            sessions,
            browser: None,
            clipboard: ClipboardTool::platform_defaults(),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_clipboard(mut self, tools: Vec<ClipboardTool>) -> Self {
        self.clipboard = tools;
        self
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Run one subcommand, writing user-facing output to `out`.
    ///
    /// Returns the exit code: `0` on success, or the child's code for `run`.
    pub async fn execute(&self, command: &Commands, out: &mut dyn Write) -> CliResult<i32> {
        match command {
            Commands::Login { no_browser } => self.login(*no_browser, out).await?,
            Commands::Whoami => self.whoami(out)?,
            Commands::Logout => self.logout(out)?,
            Commands::Add {
                title,
                command,
                tags,
                notes,
            } => {
                let new_command =
                    build_new_command(title, command, tags.as_deref(), notes.as_deref())?;
                self.add(&new_command, out).await?
            }
            Commands::List => self.list(out).await?,
            Commands::Search { query } => self.search(query, out).await?,
            Commands::Show { id } => self.show(parse_id(id)?, out).await?,
            Commands::Copy { id } => self.copy(parse_id(id)?, out).await?,
            Commands::Run { id } => return self.run(parse_id(id)?).await,
            Commands::Rm { id } => self.remove(parse_id(id)?, out).await?,
        }
        Ok(0)
    }

    async fn login(&self, no_browser: bool, out: &mut dyn Write) -> CliResult<()> {
        let exchanger = BackendExchanger::new(&self.config.api_base, self.config.http_timeout)?;

        let browser: Arc<dyn BrowserLauncher> = match (&self.browser, no_browser) {
            (_, true) => Arc::new(PrintOnly),
            (Some(browser), false) => browser.clone(),
            (None, false) => Arc::new(SystemBrowser),
        };

        let flow = LoginFlow::new(
            self.config.login_config(),
            Arc::new(exchanger),
            self.sessions.clone(),
        )
        .with_browser(browser);

        let credential = flow.run_until(interrupted()).await?;
        writeln!(out, "Logged in as: {}", credential.display_identity())?;
        Ok(())
    }

    fn whoami(&self, out: &mut dyn Write) -> CliResult<()> {
        match self.sessions.load()? {
            Some(credential) => {
                writeln!(out, "Logged in as: {}", credential.display_identity())?
            }
            None => writeln!(out, "Not logged in. Run: cmdref login")?,
        }
        Ok(())
    }

    fn logout(&self, out: &mut dyn Write) -> CliResult<()> {
        self.sessions.clear()?;
        writeln!(out, "Logged out")?;
        Ok(())
    }

    fn catalog(&self) -> CliResult<CatalogClient> {
        let credential = self
            .sessions
            .load()?
            .filter(|c| c.has_token())
            .ok_or(CliError::NotLoggedIn)?;

        Ok(CatalogClient::new(
            &self.config.api_base,
            credential.token,
            self.config.http_timeout,
        )?)
    }

    async fn add(&self, new_command: &NewCommand, out: &mut dyn Write) -> CliResult<()> {
        let created = self.catalog()?.create(new_command).await?;
        info!("Saved command #{}", created.id);
        writeln!(out, "Saved #{}: {}", created.id, created.title)?;
        Ok(())
    }

    async fn list(&self, out: &mut dyn Write) -> CliResult<()> {
        let items = self.catalog()?.list().await?;
        if items.is_empty() {
            writeln!(out, "(empty) add one with: cmdref add --title ... --cmd ...")?;
            return Ok(());
        }
        write_summaries(out, items)
    }

    async fn search(&self, words: &[String], out: &mut dyn Write) -> CliResult<()> {
        let query = words.join(" ");
        let query = query.trim();
        if query.is_empty() {
            return Err(CliError::InvalidInput("search requires a query".to_string()));
        }

        let items = self.catalog()?.search(query).await?;
        if items.is_empty() {
            writeln!(out, "(no matches)")?;
            return Ok(());
        }
        write_summaries(out, items)
    }

    async fn show(&self, id: u64, out: &mut dyn Write) -> CliResult<()> {
        let item = self.catalog()?.get(id).await?;

        writeln!(out, "#{} {}", item.id, item.title)?;
        if !item.tags.is_empty() {
            writeln!(out, "Tags: {}", item.tags.join(", "))?;
        }
        if !item.notes.is_empty() {
            writeln!(out, "Notes: {}", item.notes)?;
        }
        writeln!(out, "Command:\n{}", item.command)?;
        Ok(())
    }

    async fn copy(&self, id: u64, out: &mut dyn Write) -> CliResult<()> {
        let item = self.catalog()?.get(id).await?;
        copy_to_clipboard(&self.clipboard, &item.command).await?;
        writeln!(out, "Copied #{} to clipboard", item.id)?;
        Ok(())
    }

    async fn run(&self, id: u64) -> CliResult<i32> {
        let item = self.catalog()?.get(id).await?;
        let shell = &self.config.shell;
        debug!("Running #{} with {} -lc", item.id, shell);

        let status = tokio::process::Command::new(shell)
            .arg("-lc")
            .arg(&item.command)
            .status()
            .await
            .map_err(|source| CliError::Spawn {
                shell: shell.clone(),
                source,
            })?;

        Ok(exit_status_code(status))
    }

    async fn remove(&self, id: u64, out: &mut dyn Write) -> CliResult<()> {
        self.catalog()?.delete(id).await?;
        writeln!(out, "Removed #{}", id)?;
        Ok(())
    }
}

/// Resolves on Ctrl-C; never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn write_summaries(out: &mut dyn Write, mut items: Vec<Command>) -> CliResult<()> {
    items.sort_by_key(|item| item.id);
    for item in &items {
        writeln!(out, "{}", summary_line(item))?;
    }
    Ok(())
}

pub fn summary_line(item: &Command) -> String {
    if item.tags.is_empty() {
        format!("{}) {}", item.id, item.title)
    } else {
        format!("{}) {} [{}]", item.id, item.title, item.tags.join(","))
    }
}

/// Lowercase, trim, drop empties, dedupe and sort a comma-separated tag list.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn parse_id(raw: &str) -> CliResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(CliError::InvalidInput(format!("invalid id: {}", raw))),
    }
}

pub fn build_new_command(
    title: &str,
    command: &str,
    tags: Option<&str>,
    notes: Option<&str>,
) -> CliResult<NewCommand> {
    let title = title.trim();
    let command = command.trim();
    if title.is_empty() || command.is_empty() {
        return Err(CliError::InvalidInput(
            "--title and --cmd are required".to_string(),
        ));
    }

    Ok(NewCommand {
        title: title.to_string(),
        command: command.to_string(),
        tags: tags.map(parse_tags).unwrap_or_default(),
        notes: notes.unwrap_or_default().trim().to_string(),
    })
}

/// Try each tool in order until one accepts the text.
pub async fn copy_to_clipboard(tools: &[ClipboardTool], text: &str) -> CliResult<()> {
    let mut failures = Vec::new();

    for tool in tools {
        match pipe_into(tool, text).await {
            Ok(()) => {
                debug!("Copied to clipboard with {}", tool.program);
                return Ok(());
            }
            Err(e) => {
                debug!("Clipboard tool {} failed: {}", tool.program, e);
                failures.push(format!("{}: {}", tool.program, e));
            }
        }
    }

    if failures.is_empty() {
        return Err(CliError::Clipboard("no clipboard tool available".to_string()));
    }
    Err(CliError::Clipboard(failures.join("; ")))
}

async fn pipe_into(tool: &ClipboardTool, text: &str) -> io::Result<()> {
    let mut child = tokio::process::Command::new(&tool.program)
        .args(&tool.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).await?;
    }

    let status = child.wait().await?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("exited with {}", status)))
    }
}

fn exit_status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
