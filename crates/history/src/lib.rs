//! History crate - Business logic for analysis history
//!
//! This crate keeps a user's code-analysis history in sync with the
//! analysis service:
//! - Domain models (HistoryItem, HistoryDraft, Session, Snapshot)
//! - History service gateway (HTTP and in-memory)
//! - Analysis service gateway (review, explain, suggest)
//! - Advisory refresh flag and session stores
//! - Sync controller with single-flight, debounced refreshes
//! - Refresh triggers (broadcast bus, flag poller)
//! - Query helpers for UI consumption
//! - Action handlers for mutations (save, delete, analyze then save)
//!
//! This crate has zero UI dependencies.

pub mod actions;
pub mod analysis;
pub mod config;
pub mod gateway;
pub mod models;
pub mod query;
pub mod storage;
pub mod sync;

pub use crate::config::Settings;
pub use actions::ActionHandler;
pub use analysis::{
    Analysis, AnalysisGateway, AnalysisRequest, HttpAnalysisGateway, InMemoryAnalysisGateway,
};
pub use gateway::{GatewayError, HistoryGateway, HttpHistoryGateway, InMemoryHistoryGateway};
pub use models::{
    AnalysisKind, Artifact, HistoryDraft, HistoryId, HistoryItem, RefreshReason, Session, Snapshot,
    SyncPhase,
};
pub use query::{HistoryFilter, HistorySummary, available_languages, filter_history, history_title};
pub use storage::{
    FileFlagStore, FileSessionStore, FlagStore, InMemoryFlagStore, InMemorySessionStore,
    RefreshFlag, SessionStore,
};
pub use sync::{
    HistoryEvent, HistoryEvents, HistorySync, Triggers, WeakHistorySync,
    // Pure arbitration, for callers driving their own runtime
    Decision, SyncArbiter,
};
