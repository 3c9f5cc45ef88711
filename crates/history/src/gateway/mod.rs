//! Remote history service integration
//!
//! This module provides:
//! - The `HistoryGateway` trait the sync controller talks to
//! - An HTTP client for the analysis backend
//! - An in-memory gateway for tests and offline use
//! - Normalization of wire records into domain models

mod client;
mod error;
mod memory;
mod normalize;

pub use client::HttpHistoryGateway;
pub(crate) use client::{agent_with_timeout, map_error, parse_base_url, run_blocking};
pub use error::GatewayError;
pub use memory::InMemoryHistoryGateway;
pub use normalize::{normalize_record, parse_created_at, parse_error_lines};

use async_trait::async_trait;

use crate::models::{HistoryDraft, HistoryId, HistoryItem};

/// Access to the remote history service.
///
/// Every call is a fresh round trip; implementations must not cache.
/// Callers abandon a call by dropping its future, after which its result is
/// never observed.
#[async_trait]
pub trait HistoryGateway: Send + Sync {
    /// List all history records for a user, in server order
    async fn list_history(&self, username: &str) -> Result<Vec<HistoryItem>, GatewayError>;

    /// Fetch one record with its full text
    async fn get_detail(&self, id: HistoryId) -> Result<HistoryItem, GatewayError>;

    /// Persist a new analysis, returning its assigned id
    async fn save_history(&self, draft: &HistoryDraft) -> Result<HistoryId, GatewayError>;

    /// Delete a record owned by `username`
    async fn delete_history(&self, id: HistoryId, username: &str) -> Result<(), GatewayError>;
}

/// History service wire types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// One history record as returned by the list and detail endpoints
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub id: i64,
        pub original_code: Option<String>,
        pub review_summary: Option<String>,
        pub fixed_code: Option<String>,
        pub language: Option<String>,
        /// JSON array, or a string holding a JSON array
        pub error_lines: Option<serde_json::Value>,
        /// ISO-8601 string, or a [y, m, d, h, min, s, nanos] array
        pub created_at: Option<serde_json::Value>,
        pub user: Option<RecordOwner>,
        #[serde(rename = "type", alias = "kind")]
        pub kind: Option<String>,
    }

    /// Owner summary embedded in a record
    #[derive(Debug, Clone, Deserialize)]
    pub struct RecordOwner {
        pub id: Option<i64>,
        pub username: String,
    }

    /// Body of a save request
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SaveRequest<'a> {
        pub username: &'a str,
        pub original_code: &'a str,
        pub review_summary: &'a str,
        pub fixed_code: &'a str,
        pub language: &'a str,
        pub error_lines: &'a [u32],
        #[serde(rename = "type")]
        pub kind: &'a str,
    }

    /// Response from save and delete
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MutationResponse {
        pub success: bool,
        pub message: Option<String>,
        pub history_id: Option<i64>,
    }
}
