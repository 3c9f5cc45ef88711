//! History list queries
//!
//! Pure functions over a snapshot's items: filtering for the list view,
//! the language picker contents, and display summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisKind, HistoryId, HistoryItem, UNKNOWN_LANGUAGE};

/// Feedback previews are cut to this many characters
pub const PREVIEW_CHARS: usize = 100;

/// Language value that matches every item
pub const ALL_LANGUAGES: &str = "all";

/// List view filter; the default matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Language tag, or None / "all" for any
    pub language: Option<String>,
    /// Case-insensitive text matched against the title and the original code
    pub search: Option<String>,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Check a single item against the filter
    pub fn matches(&self, item: &HistoryItem) -> bool {
        let language_ok = match self.language.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(lang) if lang.eq_ignore_ascii_case(ALL_LANGUAGES) => true,
            Some(lang) => item.language.eq_ignore_ascii_case(lang),
        };
        if !language_ok {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                history_title(item).to_lowercase().contains(&term)
                    || item.original_code.to_lowercase().contains(&term)
            }
        }
    }
}

/// Items matching `filter`, in their original order
pub fn filter_history<'a>(items: &'a [HistoryItem], filter: &HistoryFilter) -> Vec<&'a HistoryItem> {
    items.iter().filter(|item| filter.matches(item)).collect()
}

/// Distinct languages in first-seen order, skipping unknown ones
pub fn available_languages(items: &[HistoryItem]) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for item in items {
        let lang = item.language.trim();
        if lang.is_empty() || lang == UNKNOWN_LANGUAGE {
            continue;
        }
        if !languages.iter().any(|seen| seen == lang) {
            languages.push(lang.to_string());
        }
    }
    languages
}

/// Display title, e.g. "Review PYTHON Code #5"
pub fn history_title(item: &HistoryItem) -> String {
    format!(
        "{} {} Code #{}",
        item.kind.label(),
        item.language.to_uppercase(),
        item.id
    )
}

/// Summary information for displaying a history entry in a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: HistoryId,
    pub title: String,
    pub language: String,
    pub kind: AnalysisKind,
    /// Start of the feedback, if there is any
    pub preview: Option<String>,
    /// Number of flagged lines
    pub error_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&HistoryItem> for HistorySummary {
    fn from(item: &HistoryItem) -> Self {
        Self {
            id: item.id,
            title: history_title(item),
            language: item.language.clone(),
            kind: item.kind,
            preview: item.artifact.feedback.as_deref().map(preview),
            error_count: item.error_lines.len(),
            created_at: item.created_at,
        }
    }
}

/// First PREVIEW_CHARS characters, with "..." when cut
fn preview(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
