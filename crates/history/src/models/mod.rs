//! Domain models for analysis history

mod item;
mod session;
mod sync_state;

pub use item::{
    AnalysisKind, Artifact, HistoryDraft, HistoryId, HistoryItem, HistoryItemBuilder,
    UNKNOWN_LANGUAGE, normalize_language,
};
pub use session::Session;
pub use sync_state::{RefreshReason, Snapshot, SyncPhase};
