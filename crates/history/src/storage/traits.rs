//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Session;

/// "History changed, please refresh" marker left by a save.
///
/// Shared by every running instance and written without coordination, so
/// it is only a hint: readers re-fetch instead of trusting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshFlag {
    pub needs_refresh: bool,
    /// When the save that raised the flag happened
    pub saved_at: DateTime<Utc>,
}

impl RefreshFlag {
    /// A raised flag stamped with the current time
    pub fn raised_now() -> Self {
        Self {
            needs_refresh: true,
            saved_at: Utc::now(),
        }
    }

    /// Age of the flag at `now`; a flag from the future counts as brand new
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.saved_at).max(Duration::zero())
    }
}

/// Storage for the advisory refresh flag
pub trait FlagStore: Send + Sync {
    /// Read the flag, if any
    fn read(&self) -> Result<Option<RefreshFlag>>;

    /// Replace the flag
    fn write(&self, flag: RefreshFlag) -> Result<()>;

    /// Remove the flag (no-op when absent)
    fn clear(&self) -> Result<()>;
}

/// Storage for the signed-in user, kept across restarts
pub trait SessionStore: Send + Sync {
    /// The remembered session, if any
    fn current(&self) -> Result<Option<Session>>;

    /// Remember a session, replacing any previous one
    fn set(&self, session: &Session) -> Result<()>;

    /// Forget the session (logout)
    fn clear(&self) -> Result<()>;
}
