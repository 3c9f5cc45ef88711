//! In-memory analysis gateway
//!
//! Produces simple, deterministic analyses without a model behind them.
//! Used by tests and by the app's offline mode.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{Analysis, AnalysisGateway, AnalysisRequest};
use crate::gateway::GatewayError;
use crate::models::{AnalysisKind, Artifact};

/// Lines longer than this are flagged by a review
const MAX_LINE_CHARS: usize = 100;

/// Markers a review flags as unfinished work
const MARKERS: [&str; 2] = ["TODO", "FIXME"];

/// In-memory implementation of AnalysisGateway
#[derive(Default)]
pub struct InMemoryAnalysisGateway {
    /// Failures handed out to the next calls, in order
    failures: Mutex<VecDeque<GatewayError>>,
    calls: AtomicUsize,
}

impl InMemoryAnalysisGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next analysis with `error`
    pub fn fail_next(&self, error: GatewayError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of analyses requested
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        failure.map_or(Ok(()), Err)
    }
}

fn line_count(code: &str) -> usize {
    code.lines().count()
}

/// Single-letter names on the left of an assignment
fn short_names(code: &str) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    for (index, line) in code.lines().enumerate() {
        let Some((left, right)) = line.split_once('=') else {
            continue;
        };
        if right.starts_with('=') || left.ends_with(['!', '<', '>', '=']) {
            continue;
        }
        // Drop a type annotation: `q: int = 4`
        let left = left.split_once(':').map_or(left, |(name, _)| name).trim();
        let Some(name) = left.rsplit(char::is_whitespace).next() else {
            continue;
        };
        if name.len() == 1 && name.chars().all(|c| c.is_ascii_alphabetic()) {
            found.push((index + 1, name.to_string()));
        }
    }
    found
}

#[async_trait]
impl AnalysisGateway for InMemoryAnalysisGateway {
    async fn review(&self, _username: &str, request: &AnalysisRequest) -> Result<Analysis, GatewayError> {
        self.begin()?;

        let error_lines: Vec<u32> = request
            .code
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                line.chars().count() > MAX_LINE_CHARS || MARKERS.iter().any(|m| line.contains(m))
            })
            .map(|(index, _)| index as u32 + 1)
            .collect();

        let feedback = if error_lines.is_empty() {
            format!("No issues found in {} line(s).", line_count(&request.code))
        } else {
            let lines: Vec<String> = error_lines.iter().map(u32::to_string).collect();
            format!("Check line(s) {}: unfinished work or overlong lines.", lines.join(", "))
        };
        let revised: Vec<&str> = request.code.lines().map(str::trim_end).collect();

        Ok(Analysis {
            kind: AnalysisKind::Review,
            artifact: Artifact {
                feedback: Some(feedback),
                revised_code: Some(revised.join("\n")),
            },
            summary: Some(format!("{} issue(s)", error_lines.len())),
            error_lines,
        })
    }

    async fn explain(&self, _username: &str, request: &AnalysisRequest) -> Result<Analysis, GatewayError> {
        self.begin()?;

        let feedback = format!(
            "A {}-line {} snippet.",
            line_count(&request.code),
            request.language.trim()
        );
        Ok(Analysis {
            kind: AnalysisKind::Explain,
            artifact: Artifact {
                feedback: Some(feedback),
                revised_code: None,
            },
            summary: None,
            error_lines: Vec::new(),
        })
    }

    async fn suggest(&self, request: &AnalysisRequest) -> Result<Analysis, GatewayError> {
        self.begin()?;

        let names = short_names(&request.code);
        let feedback = if names.is_empty() {
            "No naming suggestions.".to_string()
        } else {
            names
                .iter()
                .map(|(line, name)| format!("Line {}: give '{}' a descriptive name.", line, name))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(Analysis {
            kind: AnalysisKind::Suggest,
            artifact: Artifact {
                feedback: Some(feedback),
                revised_code: None,
            },
            summary: Some(format!("{} suggestion(s)", names.len())),
            error_lines: Vec::new(),
        })
    }
}
