//! Session persistence for cmdref.
//!
//! The session is a single JSON document. Writers never touch the canonical
//! file directly: they write a sibling temp file with owner-only permissions
//! and rename it into place, so readers see either the previous session or the
//! new one, never a partial write.

use chrono::Utc;
use cmdref_identity_core::Credential;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info};

pub const SESSION_FILE_NAME: &str = "session.json";
pub const DEFAULT_DIR_NAME: &str = ".cmdref";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Refusing to save a session with an empty token")]
    EmptyToken,

    #[error("Cannot determine the home directory")]
    NoHomeDirectory,

    #[error("Session I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Session file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Storage for the single logged-in session.
pub trait SessionStore: Send + Sync {
    /// Persist the credential, replacing any previous session whole.
    ///
    /// Returns the credential as stored (with `created_at` filled in).
    fn save(&self, credential: &Credential) -> SessionResult<Credential>;

    /// Load the current session. `None` means "not logged in".
    fn load(&self) -> SessionResult<Option<Credential>>;

    /// Remove the session. Clearing an absent session is not an error.
    fn clear(&self) -> SessionResult<()>;
}

fn stamp(credential: &Credential) -> SessionResult<Credential> {
    if !credential.has_token() {
        return Err(SessionError::EmptyToken);
    }

    let mut stored = credential.clone();
    if stored.created_at.is_none() {
        stored.created_at = Some(Utc::now());
    }
    Ok(stored)
}

/// File-backed session store, by default at `~/.cmdref/session.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the session as `session.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SESSION_FILE_NAME))
    }

    pub fn default_location() -> SessionResult<Self> {
        let home = dirs::home_dir().ok_or(SessionError::NoHomeDirectory)?;
        Ok(Self::in_dir(home.join(DEFAULT_DIR_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn ensure_dir(&self) -> SessionResult<()> {
        let dir = self.parent_dir();
        if dir.is_dir() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(dir)
                .map_err(|e| self.io_error(e))?;
        }

        #[cfg(not(unix))]
        {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }

        debug!("Created session directory {}", dir.display());
        Ok(())
    }

    /// Temp file next to the session file so the final rename stays on one filesystem.
    fn temp_file(&self) -> io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".session-").suffix(".tmp");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o600));
        }

        builder.tempfile_in(self.parent_dir())
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, credential: &Credential) -> SessionResult<Credential> {
        let stored = stamp(credential)?;
        self.ensure_dir()?;

        let contents = serde_json::to_vec_pretty(&stored)?;

        let mut tmp = self.temp_file().map_err(|e| self.io_error(e))?;
        tmp.write_all(&contents).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        info!("Saved session to {}", self.path.display());
        Ok(stored)
    }

    fn load(&self) -> SessionResult<Option<Credential>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let credential: Credential =
            serde_json::from_str(&contents).map_err(|source| SessionError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        if !credential.has_token() {
            debug!("Session file has an empty token, treating as logged out");
            return Ok(None);
        }

        Ok(Some(credential))
    }

    fn clear(&self) -> SessionResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed session {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Process-local session store, handy for tests and embedding.
#[derive(Default)]
pub struct InMemorySessionStore {
    session: RwLock<Option<Credential>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn save(&self, credential: &Credential) -> SessionResult<Credential> {
        let stored = stamp(credential)?;
        let mut session = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *session = Some(stored.clone());
        Ok(stored)
    }

    fn load(&self) -> SessionResult<Option<Credential>> {
        let session = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(session.clone())
    }

    fn clear(&self) -> SessionResult<()> {
        let mut session = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *session = None;
        Ok(())
    }
}
