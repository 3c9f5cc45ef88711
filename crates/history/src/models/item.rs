//! History item model representing one past analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a history record (server-assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryId(pub i64);

impl HistoryId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for HistoryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which analysis produced a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnalysisKind {
    #[default]
    #[serde(rename = "Re")]
    Review,
    #[serde(rename = "Ex")]
    Explain,
    #[serde(rename = "Su")]
    Suggest,
}

impl AnalysisKind {
    /// Short code used on the wire ("Re", "Ex", "Su")
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisKind::Review => "Re",
            AnalysisKind::Explain => "Ex",
            AnalysisKind::Suggest => "Su",
        }
    }

    /// Parse a wire code or a spelled-out name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "re" | "review" => Some(AnalysisKind::Review),
            "ex" | "explain" => Some(AnalysisKind::Explain),
            "su" | "suggest" => Some(AnalysisKind::Suggest),
            _ => None,
        }
    }

    /// Human-readable label for titles
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::Review => "Review",
            AnalysisKind::Explain => "Explain",
            AnalysisKind::Suggest => "Suggest",
        }
    }
}

/// What an analysis produced. Which fields are set depends on the kind:
/// reviews usually carry both, explanations only feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Review summary, explanation or naming suggestions
    pub feedback: Option<String>,
    /// Revised source code, if the analysis produced one
    pub revised_code: Option<String>,
}

impl Artifact {
    pub fn is_empty(&self) -> bool {
        self.feedback.is_none() && self.revised_code.is_none()
    }
}

/// One persisted analysis. Immutable once fetched; a refresh replaces the
/// whole list rather than patching items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: HistoryId,
    /// Owner of the record
    pub username: String,
    /// Language tag ("unknown" when the server had none)
    pub language: String,
    pub kind: AnalysisKind,
    /// Source text that was submitted
    pub original_code: String,
    pub artifact: Artifact,
    /// 1-based line numbers flagged by the analysis
    #[serde(default)]
    pub error_lines: Vec<u32>,
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    /// Start building a history item
    pub fn builder(id: HistoryId, username: impl Into<String>) -> HistoryItemBuilder {
        HistoryItemBuilder::new(id, username)
    }
}

/// Builder for HistoryItem
pub struct HistoryItemBuilder {
    id: HistoryId,
    username: String,
    language: String,
    kind: AnalysisKind,
    original_code: String,
    artifact: Artifact,
    error_lines: Vec<u32>,
    created_at: DateTime<Utc>,
}

impl HistoryItemBuilder {
    fn new(id: HistoryId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            language: UNKNOWN_LANGUAGE.to_string(),
            kind: AnalysisKind::default(),
            original_code: String::new(),
            artifact: Artifact::default(),
            error_lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = normalize_language(&language.into());
        self
    }

    pub fn kind(mut self, kind: AnalysisKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn original_code(mut self, code: impl Into<String>) -> Self {
        self.original_code = code.into();
        self
    }

    pub fn feedback(mut self, feedback: impl Into<String>) -> Self {
        self.artifact.feedback = Some(feedback.into());
        self
    }

    pub fn revised_code(mut self, code: impl Into<String>) -> Self {
        self.artifact.revised_code = Some(code.into());
        self
    }

    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn error_lines(mut self, lines: Vec<u32>) -> Self {
        self.error_lines = lines;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn build(self) -> HistoryItem {
        HistoryItem {
            id: self.id,
            username: self.username,
            language: self.language,
            kind: self.kind,
            original_code: self.original_code,
            artifact: self.artifact,
            error_lines: self.error_lines,
            created_at: self.created_at,
        }
    }
}

/// Language tag used when none was recorded
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Trim and lowercase a language tag, mapping blank and placeholder values
/// ("undefined", "null") to "unknown".
pub fn normalize_language(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "undefined" || trimmed == "null" {
        UNKNOWN_LANGUAGE.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Payload for persisting a new analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDraft {
    pub username: String,
    pub language: String,
    pub kind: AnalysisKind,
    pub original_code: String,
    pub artifact: Artifact,
    #[serde(default)]
    pub error_lines: Vec<u32>,
}

impl HistoryDraft {
    pub fn new(
        username: impl Into<String>,
        language: impl Into<String>,
        kind: AnalysisKind,
        original_code: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            language: normalize_language(&language.into()),
            kind,
            original_code: original_code.into(),
            artifact: Artifact::default(),
            error_lines: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn with_error_lines(mut self, lines: Vec<u32>) -> Self {
        self.error_lines = lines;
        self
    }
}
