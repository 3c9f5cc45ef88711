//! Settings for the history service and sync timing
//!
//! Loaded from (in order of priority):
//! 1. Environment variables (LUMEN_API_URL, LUMEN_REQUEST_TIMEOUT_SECS)
//! 2. JSON file (~/.config/lumen/settings.json), any subset of fields
//! 3. Built-in defaults

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::gateway::HttpHistoryGateway;

/// Settings filename in the Lumen config directory
const SETTINGS_FILE: &str = "settings.json";

/// Backend location and sync timing knobs.
///
/// Durations are stored as plain numbers so the file stays hand-editable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// API root of the analysis backend
    pub api_base_url: String,
    /// Upper bound for a single gateway call
    pub request_timeout_secs: u64,
    /// Upper bound for one review, explain or suggest call
    pub analysis_timeout_secs: u64,
    /// Non-forced refreshes closer than this to the last success are dropped
    pub min_refresh_interval_ms: u64,
    /// Wait after a "history changed" broadcast before refreshing
    pub broadcast_delay_ms: u64,
    /// How often the advisory flag is checked
    pub flag_poll_interval_secs: u64,
    /// Flags older than this are discarded unread
    pub flag_max_age_secs: u64,
    /// Focus only refreshes when the last success is older than this
    pub focus_stale_after_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: HttpHistoryGateway::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
            analysis_timeout_secs: 20,
            min_refresh_interval_ms: 2_000,
            broadcast_delay_ms: 1_000,
            flag_poll_interval_secs: 3,
            flag_max_age_secs: 30,
            focus_stale_after_secs: 10,
        }
    }
}

impl Settings {
    /// Load settings using file, then environment, then defaults
    pub fn load() -> Result<Self> {
        let mut settings = if config::config_exists(SETTINGS_FILE) {
            config::load_json(SETTINGS_FILE)?
        } else {
            Self::default()
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse settings JSON")
    }

    /// Override fields from environment variables, ignoring malformed values
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("LUMEN_API_URL")
            && !url.trim().is_empty()
        {
            self.api_base_url = url;
        }

        if let Ok(raw) = std::env::var("LUMEN_REQUEST_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!("Ignoring LUMEN_REQUEST_TIMEOUT_SECS={:?}", raw),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.min_refresh_interval_ms)
    }

    pub fn broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_delay_ms)
    }

    pub fn flag_poll_interval(&self) -> Duration {
        Duration::from_secs(self.flag_poll_interval_secs)
    }

    pub fn flag_max_age(&self) -> Duration {
        Duration::from_secs(self.flag_max_age_secs)
    }

    pub fn focus_stale_after(&self) -> Duration {
        Duration::from_secs(self.focus_stale_after_secs)
    }
}
