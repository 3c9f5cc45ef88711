//! Root application state for the Lumen history viewer

use chrono::{DateTime, Local, Utc};
use history::query::ALL_LANGUAGES;
use history::{
    ActionHandler, Analysis, AnalysisGateway, AnalysisRequest, HistoryDraft, HistoryFilter,
    HistoryId, HistoryItem, HistorySummary, HistorySync, RefreshReason, Session, SessionStore,
    Snapshot, available_languages, filter_history, history_title,
};
use log::{info, warn};
use std::sync::{Arc, PoisonError, RwLock};

use crate::commands::{self, Command};

/// Whether the prompt loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Root application state
pub struct LumenApp {
    sync: HistorySync,
    actions: ActionHandler,
    analyzer: Arc<dyn AnalysisGateway>,
    sessions: Arc<dyn SessionStore>,
    /// Shared with the snapshot printer
    filter: Arc<RwLock<HistoryFilter>>,
}

impl LumenApp {
    pub fn new(
        sync: HistorySync,
        actions: ActionHandler,
        analyzer: Arc<dyn AnalysisGateway>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            sync,
            actions,
            analyzer,
            sessions,
            filter: Arc::new(RwLock::new(HistoryFilter::default())),
        }
    }

    /// Print the list every time the controller publishes a new state
    pub fn spawn_printer(&self) {
        let mut rx = self.sync.subscribe();
        let filter = self.filter.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let text = {
                    let snapshot = rx.borrow_and_update();
                    let filter = filter.read().unwrap_or_else(PoisonError::into_inner);
                    render(&snapshot, &filter)
                };
                println!("{}", text);
            }
        });
    }

    /// Run one command
    pub async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::List => self.print_list(),
            Command::Refresh => self.sync.request_refresh(RefreshReason::Manual, true),
            Command::Focus => self.sync.on_focus_regained(),
            Command::Open(id) => match self.sync.open_detail(id).await {
                Ok(item) => println!("{}", render_detail(&item)),
                Err(e) => println!("Could not open #{}: {}", id, e),
            },
            Command::Analyze { language, kind, code } => {
                let Some(session) = self.sync.session() else {
                    println!("Sign in first: user <name>");
                    return Flow::Continue;
                };
                let request = AnalysisRequest::new(language, code);
                match self
                    .actions
                    .analyze_and_save(self.analyzer.as_ref(), kind, &session.username, &request)
                    .await
                {
                    Ok((analysis, id)) => println!("{}", render_analysis(&analysis, id)),
                    Err(e) => println!("{} failed: {}", kind.label(), e),
                }
            }
            Command::Save { language, kind, code } => {
                let Some(session) = self.sync.session() else {
                    println!("Sign in first: user <name>");
                    return Flow::Continue;
                };
                let draft = HistoryDraft::new(session.username, language, kind, code);
                match self.actions.save(&draft).await {
                    Ok(id) => println!("Saved #{}", id),
                    Err(e) => println!("Save failed: {}", e),
                }
            }
            Command::Delete(id) => {
                let Some(session) = self.sync.session() else {
                    println!("Sign in first: user <name>");
                    return Flow::Continue;
                };
                match self.actions.delete(id, &session.username).await {
                    Ok(()) => println!("Deleted #{}", id),
                    Err(e) => println!("Delete failed: {}", e),
                }
            }
            Command::Filter { language, search } => {
                {
                    let mut filter = self.filter.write().unwrap_or_else(PoisonError::into_inner);
                    filter.language = language;
                    filter.search = search;
                }
                self.print_list();
            }
            Command::User(name) => self.switch_user(&name),
            Command::Logout => {
                if let Err(e) = self.sessions.clear() {
                    warn!("Failed to forget session: {:#}", e);
                }
                self.sync.on_user_changed(None);
            }
            Command::Help => {
                for entry in commands::help() {
                    println!("  {:<32} {}", entry.usage, entry.description);
                }
            }
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn switch_user(&self, name: &str) {
        let Some(session) = Session::new(name) else {
            println!("Username cannot be blank");
            return;
        };
        if let Err(e) = self.sessions.set(&session) {
            warn!("Failed to remember session: {:#}", e);
        }
        info!("Signed in as {}", session.username);
        self.sync.on_user_changed(Some(session));
    }

    fn print_list(&self) {
        let filter = self.filter.read().unwrap_or_else(PoisonError::into_inner);
        println!("{}", render(&self.sync.snapshot(), &filter));
    }
}

/// Format a timestamp for display in local time
fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Render the list view for a snapshot
pub fn render(snapshot: &Snapshot, filter: &HistoryFilter) -> String {
    let mut out = Vec::new();

    match &snapshot.username {
        Some(user) => out.push(format!("== History for {} ==", user)),
        None => {
            out.push("Not signed in. Type 'user <name>' to sign in.".to_string());
            return out.join("\n");
        }
    }

    if snapshot.is_initial_load() {
        out.push("Loading history...".to_string());
        return out.join("\n");
    }
    if snapshot.is_background_refresh() {
        out.push("(refreshing...)".to_string());
    }
    if let Some(error) = snapshot.last_error.as_ref().filter(|_| snapshot.is_failed()) {
        out.push(format!("Could not load history: {}. Type 'refresh' to retry.", error));
    }

    let languages = available_languages(&snapshot.items);
    if !languages.is_empty() {
        out.push(format!("Languages: {}, {}", ALL_LANGUAGES, languages.join(", ")));
    }

    let shown = filter_history(&snapshot.items, filter);
    if snapshot.items.is_empty() {
        if !snapshot.is_failed() {
            out.push("No history yet.".to_string());
        }
    } else if shown.is_empty() {
        out.push("Nothing matches the filter.".to_string());
    }

    for item in shown {
        let summary = HistorySummary::from(item);
        let mut line = format!("  {:<32} {}", summary.title, format_time(summary.created_at));
        if summary.error_count > 0 {
            line.push_str(&format!("  [{} issue(s)]", summary.error_count));
        }
        out.push(line);
        if let Some(preview) = summary.preview {
            out.push(format!("      {}", preview.replace('\n', " ")));
        }
    }

    if let Some(at) = snapshot.last_success_at {
        out.push(format!("Updated {}", format_time(at)));
    }
    out.join("\n")
}

/// Render a fresh analysis and where it was saved
pub fn render_analysis(analysis: &Analysis, id: HistoryId) -> String {
    let mut out = vec![format!("== {} (saved as #{}) ==", analysis.kind.label(), id)];
    if let Some(summary) = &analysis.summary {
        out.push(summary.clone());
    }
    if let Some(feedback) = &analysis.artifact.feedback {
        out.push(feedback.clone());
    }
    if !analysis.error_lines.is_empty() {
        let lines: Vec<String> = analysis.error_lines.iter().map(u32::to_string).collect();
        out.push(format!("Flagged lines: {}", lines.join(", ")));
    }
    if let Some(revised) = &analysis.artifact.revised_code {
        out.push(format!("-- Revised code --\n{}", revised));
    }
    out.join("\n")
}

/// Render one record in full
pub fn render_detail(item: &HistoryItem) -> String {
    let mut out = vec![
        format!("== {} ==", history_title(item)),
        format!("Saved {} by {}", format_time(item.created_at), item.username),
        String::new(),
        item.original_code.clone(),
    ];

    if !item.error_lines.is_empty() {
        let lines: Vec<String> = item.error_lines.iter().map(u32::to_string).collect();
        out.push(format!("\nFlagged lines: {}", lines.join(", ")));
    }
    if let Some(feedback) = &item.artifact.feedback {
        out.push(format!("\n-- {} --\n{}", item.kind.label(), feedback));
    }
    if let Some(revised) = &item.artifact.revised_code {
        out.push(format!("\n-- Revised code --\n{}", revised));
    }
    out.join("\n")
}
