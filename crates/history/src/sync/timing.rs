//! Sync timing utilities for debounce, focus and flag staleness
//!
//! Pure functions that can be tested without a runtime. Intervals use the
//! monotonic clock; flag ages use wall-clock time because the flag is
//! written by other processes.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::storage::RefreshFlag;

/// Check if enough time has elapsed since the last success to allow a new
/// fetch.
///
/// # Arguments
/// * `last_success` - When the last successful fetch completed (None if never)
/// * `now` - Current monotonic time
/// * `cooldown` - Minimum time that must elapse between fetches
///
/// # Returns
/// `true` if enough time has passed (or never fetched), `false` if still in cooldown
pub fn cooldown_elapsed(last_success: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    match last_success {
        Some(last) => now.saturating_duration_since(last) >= cooldown,
        None => true,
    }
}

/// What the flag poller should do with the flag it read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagCheck {
    /// No flag, or a lowered one with nothing to clean up
    Absent,
    /// Raised recently: refresh, then clear
    Fresh,
    /// Raised too long ago (or lowered): clear without refreshing
    Stale,
}

/// Classify a flag read from the store
pub fn check_flag(flag: Option<RefreshFlag>, now: DateTime<Utc>, max_age: Duration) -> FlagCheck {
    let Some(flag) = flag else {
        return FlagCheck::Absent;
    };
    if !flag.needs_refresh {
        return FlagCheck::Stale;
    }

    let age = flag.age(now).to_std().unwrap_or(Duration::ZERO);
    if age < max_age {
        FlagCheck::Fresh
    } else {
        FlagCheck::Stale
    }
}
