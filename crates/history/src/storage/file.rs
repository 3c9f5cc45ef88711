//! File-backed store implementations
//!
//! Each store owns one small JSON file, by default in the Lumen config
//! directory. Writes replace the file atomically; a file that cannot be
//! parsed is reported as an error.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{FlagStore, RefreshFlag, SessionStore};
use crate::models::Session;

/// Default flag file name in the config directory
pub const FLAG_FILE: &str = "refresh-flag.json";

/// Default session file name in the config directory
pub const SESSION_FILE: &str = "session.json";

fn default_path(filename: &str) -> Result<PathBuf> {
    config::config_path(filename).context("Could not determine config directory")
}

/// FlagStore persisted as a JSON file shared by all local instances
pub struct FileFlagStore {
    path: PathBuf,
}

impl FileFlagStore {
    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at ~/.config/lumen/refresh-flag.json
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(default_path(FLAG_FILE)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlagStore for FileFlagStore {
    fn read(&self) -> Result<Option<RefreshFlag>> {
        config::read_json_file(&self.path)
    }

    fn write(&self, flag: RefreshFlag) -> Result<()> {
        config::write_json_file(&self.path, &flag)
    }

    fn clear(&self) -> Result<()> {
        config::remove_file(&self.path)
    }
}

/// SessionStore persisted as a JSON file
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at ~/.config/lumen/session.json
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(default_path(SESSION_FILE)?))
    }
}

impl SessionStore for FileSessionStore {
    fn current(&self) -> Result<Option<Session>> {
        let session: Option<Session> = config::read_json_file(&self.path)?;
        // A hand-edited file with a blank name is anonymous
        Ok(session.filter(|s| !s.username.trim().is_empty()))
    }

    fn set(&self, session: &Session) -> Result<()> {
        config::write_json_file(&self.path, session)
    }

    fn clear(&self) -> Result<()> {
        config::remove_file(&self.path)
    }
}
