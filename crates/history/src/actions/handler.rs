//! Action handler for history mutations
//!
//! Saves and deletes go straight to the service. After a mutation succeeds
//! the handler tells every open history view about it: a "history changed"
//! broadcast for this process and the advisory refresh flag for others.

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{Analysis, AnalysisGateway, AnalysisRequest};
use crate::gateway::{GatewayError, HistoryGateway};
use crate::models::{AnalysisKind, HistoryDraft, HistoryId};
use crate::storage::{FlagStore, RefreshFlag};
use crate::sync::HistoryEvents;

/// Save attempts before giving up: the first try plus three retries
pub const SAVE_ATTEMPTS: u32 = 4;

/// Delay before the first retry; doubled for each further one
pub const SAVE_RETRY_BASE: Duration = Duration::from_secs(1);

/// Handler for history actions like save and delete
pub struct ActionHandler {
    gateway: Arc<dyn HistoryGateway>,
    flags: Arc<dyn FlagStore>,
    events: HistoryEvents,
}

impl ActionHandler {
    /// Create a new action handler
    pub fn new(gateway: Arc<dyn HistoryGateway>, flags: Arc<dyn FlagStore>, events: HistoryEvents) -> Self {
        Self {
            gateway,
            flags,
            events,
        }
    }

    /// Save an analysis result and announce the change.
    ///
    /// Network failures and 5xx responses are retried with exponential
    /// backoff (1s, 2s, 4s); anything else, timeouts included, fails at once.
    pub async fn save(&self, draft: &HistoryDraft) -> Result<HistoryId, GatewayError> {
        validate(draft)?;
        info!(
            "Saving {} history for {} ({})",
            draft.kind.label(),
            draft.username,
            draft.language
        );

        let mut attempt = 1;
        let id = loop {
            match self.gateway.save_history(draft).await {
                Ok(id) => break id,
                Err(e) if e.is_retryable() && attempt < SAVE_ATTEMPTS => {
                    let delay = SAVE_RETRY_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        "Save attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, SAVE_ATTEMPTS, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Save failed after {} attempt(s): {}", attempt, e);
                    return Err(e);
                }
            }
        };

        info!("Saved history {}", id);
        self.announce_change();
        Ok(id)
    }

    /// Run an analysis for `username` and save what it produced.
    ///
    /// Nothing is saved when the analysis fails.
    pub async fn analyze_and_save(
        &self,
        analyzer: &dyn AnalysisGateway,
        kind: AnalysisKind,
        username: &str,
        request: &AnalysisRequest,
    ) -> Result<(Analysis, HistoryId), GatewayError> {
        info!("Running {} for {} ({})", kind.label(), username, request.language);
        let analysis = analyzer.analyze(kind, username, request).await.inspect_err(|e| {
            warn!("{} failed: {}", kind.label(), e);
        })?;

        let id = self.save(&analysis.to_draft(username, request)).await?;
        Ok((analysis, id))
    }

    /// Delete a history record owned by `username` and announce the change
    pub async fn delete(&self, id: HistoryId, username: &str) -> Result<(), GatewayError> {
        info!("Deleting history {} for {}", id, username);
        self.gateway.delete_history(id, username).await?;

        info!("Deleted history {}", id);
        self.announce_change();
        Ok(())
    }

    fn announce_change(&self) {
        let flag = RefreshFlag::raised_now();
        // The flag is only a hint; a failed write must not fail the action
        match self.flags.write(flag) {
            Ok(()) => self.events.remember_flag(&flag),
            Err(e) => warn!("Failed to raise refresh flag: {:#}", e),
        }
        self.events.notify_changed();
    }
}

fn validate(draft: &HistoryDraft) -> Result<(), GatewayError> {
    if draft.username.trim().is_empty() {
        return Err(GatewayError::InvalidDraft {
            message: "username is required".to_string(),
        });
    }
    if draft.original_code.trim().is_empty() {
        return Err(GatewayError::InvalidDraft {
            message: "original code is required".to_string(),
        });
    }
    Ok(())
}
