//! Query API for UI consumption
//!
//! Filtering and display helpers over the items in a sync snapshot.

mod history;

pub use history::{
    ALL_LANGUAGES, HistoryFilter, HistorySummary, PREVIEW_CHARS, available_languages,
    filter_history, history_title,
};
