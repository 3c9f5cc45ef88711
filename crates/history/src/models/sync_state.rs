//! Synchronization state as observed by readers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::HistoryItem;
use crate::gateway::GatewayError;

/// Where the controller is in its fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SyncPhase {
    /// Nothing in flight
    #[default]
    Idle,
    /// A list fetch is outstanding
    Fetching,
    /// The last fetch failed; items are the last good list
    FetchFailed,
}

/// Why a refresh was requested. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefreshReason {
    Activation,
    Broadcast,
    Flag,
    Focus,
    Manual,
    UserChanged,
    /// A forced request that arrived while another fetch was busy
    Queued,
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshReason::Activation => "activation",
            RefreshReason::Broadcast => "broadcast",
            RefreshReason::Flag => "flag",
            RefreshReason::Focus => "focus",
            RefreshReason::Manual => "manual",
            RefreshReason::UserChanged => "user-changed",
            RefreshReason::Queued => "queued",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of the controller state.
///
/// Cloning is cheap: the item list is shared, never copied.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// User the items belong to (None when anonymous)
    pub username: Option<String>,
    /// Last known-good history list, in server order
    pub items: Arc<[HistoryItem]>,
    pub phase: SyncPhase,
    /// When the last successful fetch completed
    pub last_success_at: Option<DateTime<Utc>>,
    /// Cause of the most recent failed fetch, kept for display
    pub last_error: Option<GatewayError>,
}

impl Snapshot {
    /// First load for this user: nothing to show yet, so show a spinner
    pub fn is_initial_load(&self) -> bool {
        self.phase == SyncPhase::Fetching && self.last_success_at.is_none()
    }

    /// Refresh on top of an already displayed list
    pub fn is_background_refresh(&self) -> bool {
        self.phase == SyncPhase::Fetching && self.last_success_at.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.phase == SyncPhase::FetchFailed
    }

    /// Ids in display order
    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().map(|item| item.id.value()).collect()
    }
}
