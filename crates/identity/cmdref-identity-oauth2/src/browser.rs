//! Browser handoff for the authorization URL.

use std::io;

/// Opens the authorization URL for the user.
///
/// Failure is never fatal to the login; the orchestrator always prints the
/// URL first so the flow keeps working on headless machines.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Platform default browser (`open`, `xdg-open`, `start`, ...), spawned detached.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        webbrowser::open(url)
    }
}

/// Never launches anything; the printed URL is the only handoff.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintOnly;

impl BrowserLauncher for PrintOnly {
    fn open(&self, _url: &str) -> io::Result<()> {
        Ok(())
    }
}
