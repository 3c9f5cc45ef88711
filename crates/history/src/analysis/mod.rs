//! Analysis service integration
//!
//! The service reviews, explains or suggests names for a piece of code. Its
//! result is what a history record persists, so this module also turns a
//! finished analysis into a [`HistoryDraft`].

mod client;
mod memory;

pub use client::HttpAnalysisGateway;
pub use memory::InMemoryAnalysisGateway;

use async_trait::async_trait;

use crate::gateway::GatewayError;
use crate::models::{AnalysisKind, Artifact, HistoryDraft};

/// Code submitted for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Language tag as the user picked it
    pub language: String,
    pub code: String,
}

impl AnalysisRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }
}

/// What one analysis produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub kind: AnalysisKind,
    /// Review feedback, explanation or naming suggestions, plus revised code
    pub artifact: Artifact,
    /// Short overview, when the service sent one
    pub summary: Option<String>,
    /// 1-based lines the analysis flagged
    pub error_lines: Vec<u32>,
}

impl Analysis {
    /// Draft that persists this result for `username`
    pub fn to_draft(&self, username: &str, request: &AnalysisRequest) -> HistoryDraft {
        HistoryDraft::new(username, request.language.as_str(), self.kind, request.code.as_str())
            .with_artifact(self.artifact.clone())
            .with_error_lines(self.error_lines.clone())
    }
}

/// Access to the remote analysis service
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Review code for problems, possibly with a revised version
    async fn review(&self, username: &str, request: &AnalysisRequest) -> Result<Analysis, GatewayError>;

    /// Explain what code does
    async fn explain(&self, username: &str, request: &AnalysisRequest) -> Result<Analysis, GatewayError>;

    /// Suggest better names for identifiers
    async fn suggest(&self, request: &AnalysisRequest) -> Result<Analysis, GatewayError>;

    /// Run the analysis of the given kind
    async fn analyze(
        &self,
        kind: AnalysisKind,
        username: &str,
        request: &AnalysisRequest,
    ) -> Result<Analysis, GatewayError> {
        match kind {
            AnalysisKind::Review => self.review(username, request).await,
            AnalysisKind::Explain => self.explain(username, request).await,
            AnalysisKind::Suggest => self.suggest(request).await,
        }
    }
}

/// Analysis service wire types
pub mod api {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::Analysis;
    use crate::gateway::{GatewayError, parse_error_lines};
    use crate::models::{AnalysisKind, Artifact};

    /// Body of a review, explain or suggest request
    #[derive(Debug, Serialize)]
    pub struct AnalyzeRequest<'a> {
        pub language: &'a str,
        pub code: &'a str,
        /// Review names the submitter `user`
        #[serde(skip_serializing_if = "Option::is_none")]
        pub user: Option<&'a str>,
        /// Explain names the submitter `username`
        #[serde(skip_serializing_if = "Option::is_none")]
        pub username: Option<&'a str>,
    }

    /// Response of any analysis endpoint. Each endpoint fills a different
    /// subset of fields.
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AnalysisResponse {
        pub success: Option<bool>,
        pub message: Option<String>,
        pub error: Option<String>,
        pub feedback: Option<String>,
        pub explanation: Option<String>,
        pub suggestions: Option<String>,
        pub summary: Option<String>,
        pub improved_code: Option<String>,
        pub fixed_code: Option<String>,
        /// JSON array, or a string holding a JSON array
        pub error_lines: Option<Value>,
    }

    fn non_blank(text: Option<String>) -> Option<String> {
        text.filter(|t| !t.trim().is_empty())
    }

    impl AnalysisResponse {
        /// Pick the fields that matter for `kind`
        pub fn into_analysis(self, kind: AnalysisKind) -> Result<Analysis, GatewayError> {
            let AnalysisResponse {
                success,
                message,
                error,
                feedback,
                explanation,
                suggestions,
                summary,
                improved_code,
                fixed_code,
                error_lines,
            } = self;

            if success == Some(false) {
                return Err(GatewayError::ServerError {
                    status: 200,
                    message: non_blank(message)
                        .or(error)
                        .unwrap_or_else(|| format!("{} rejected", kind.label())),
                });
            }

            let text = match kind {
                AnalysisKind::Review => non_blank(feedback).or_else(|| non_blank(summary.clone())),
                AnalysisKind::Explain => non_blank(explanation).or_else(|| non_blank(feedback)),
                AnalysisKind::Suggest => non_blank(suggestions)
                    .or_else(|| non_blank(explanation))
                    .or_else(|| non_blank(feedback)),
            };
            let Some(text) = text else {
                return Err(GatewayError::malformed(format!(
                    "{} response has no result",
                    kind.label()
                )));
            };

            let (revised_code, error_lines) = match kind {
                AnalysisKind::Review => (
                    non_blank(improved_code).or_else(|| non_blank(fixed_code)),
                    error_lines.as_ref().map(parse_error_lines).unwrap_or_default(),
                ),
                _ => (None, Vec::new()),
            };

            Ok(Analysis {
                kind,
                artifact: Artifact {
                    feedback: Some(text),
                    revised_code,
                },
                summary: non_blank(summary),
                error_lines,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::api::AnalysisResponse;
    use super::*;

    fn response(json: &str) -> AnalysisResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_review_response() {
        let analysis = response(
            r#"{
                "success": true,
                "feedback": "Line 2 divides by zero.",
                "improvedCode": "x = 1\ny = x / 1",
                "summary": "One bug",
                "errorLines": [2],
                "originalCode": "x = 1\ny = x / 0"
            }"#,
        )
        .into_analysis(AnalysisKind::Review)
        .unwrap();

        assert_eq!(analysis.artifact.feedback.as_deref(), Some("Line 2 divides by zero."));
        assert_eq!(analysis.artifact.revised_code.as_deref(), Some("x = 1\ny = x / 1"));
        assert_eq!(analysis.summary.as_deref(), Some("One bug"));
        assert_eq!(analysis.error_lines, vec![2]);
    }

    #[test]
    fn test_explain_and_suggest_responses() {
        let explained = response(r#"{"explanation": "Prints one.", "summary": " "}"#)
            .into_analysis(AnalysisKind::Explain)
            .unwrap();
        assert_eq!(explained.artifact.feedback.as_deref(), Some("Prints one."));
        assert_eq!(explained.artifact.revised_code, None);
        assert_eq!(explained.summary, None);

        let suggested = response(r#"{"success": true, "suggestions": "Rename x to count", "errorLines": [1]}"#)
            .into_analysis(AnalysisKind::Suggest)
            .unwrap();
        assert_eq!(suggested.artifact.feedback.as_deref(), Some("Rename x to count"));
        assert!(suggested.error_lines.is_empty());
    }

    #[test]
    fn test_rejected_and_empty_responses() {
        let rejected = response(r#"{"success": false, "message": "Code must not be empty"}"#)
            .into_analysis(AnalysisKind::Suggest);
        assert_eq!(
            rejected,
            Err(GatewayError::ServerError {
                status: 200,
                message: "Code must not be empty".to_string(),
            })
        );

        let empty = response(r#"{"success": true, "feedback": ""}"#).into_analysis(AnalysisKind::Review);
        assert!(matches!(empty, Err(GatewayError::MalformedResponse { .. })));
    }

    #[test]
    fn test_analysis_to_draft() {
        let analysis = Analysis {
            kind: AnalysisKind::Explain,
            artifact: Artifact {
                feedback: Some("Adds two numbers".to_string()),
                revised_code: None,
            },
            summary: None,
            error_lines: Vec::new(),
        };
        let request = AnalysisRequest::new(" Rust ", "fn add(a: i32, b: i32) -> i32 { a + b }");

        let draft = analysis.to_draft("alice", &request);
        assert_eq!(draft.username, "alice");
        assert_eq!(draft.language, "rust");
        assert_eq!(draft.kind, AnalysisKind::Explain);
        assert_eq!(draft.original_code, request.code);
        assert_eq!(draft.artifact.feedback.as_deref(), Some("Adds two numbers"));
    }
}
