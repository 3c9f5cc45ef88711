//! Refresh arbitration state machine
//!
//! Decides, for every refresh request and every fetch completion, what the
//! controller should do next. It holds no runtime resources and never
//! reads a clock itself, so every transition can be driven step by step.
//!
//! Phases:
//!
//! ```text
//! Idle ──accepted request──▶ Fetching ──ok──▶ Idle
//!   ▲                          │
//!   │                          └──err──▶ FetchFailed ──accepted request──▶ Fetching
//!   └────────── user changed (from any phase) ◀──────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::timing::cooldown_elapsed;
use crate::gateway::GatewayError;
use crate::models::{HistoryItem, RefreshReason, Session, Snapshot, SyncPhase};

/// Identifies one fetch; completions carrying any other token are stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Instruction to start a list fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub token: RequestToken,
    pub username: String,
    pub reason: RefreshReason,
}

/// Why a request did not start a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No signed-in user
    Anonymous,
    /// The controller was disposed
    Disposed,
    /// A fetch is in flight and the request was not forced
    InFlight,
    /// A forced request arrived before the in-flight fetch went out; that
    /// fetch already covers it
    Coalesced,
    /// Too soon after the last success
    Debounced,
}

/// Outcome of a refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Start(FetchTicket),
    /// Remembered; a fetch starts as soon as the in-flight one succeeds
    Queued,
    Dropped(DropReason),
}

/// Outcome of a fetch completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Items replaced; `next` is the queued follow-up fetch, if any
    Updated { next: Option<FetchTicket> },
    /// Fetch failed; items kept
    Failed,
    /// Superseded or disposed; nothing changed
    Discarded,
}

#[derive(Debug, Clone, Copy)]
struct PendingFetch {
    token: RequestToken,
    /// The network call has gone out
    dispatched: bool,
    /// A forced request arrived after dispatch
    queued: bool,
}

/// Single-flight, debounced arbitration over one user's history list
#[derive(Debug)]
pub struct SyncArbiter {
    session: Option<Session>,
    items: Arc<[HistoryItem]>,
    phase: SyncPhase,
    last_success_at: Option<DateTime<Utc>>,
    last_success_instant: Option<Instant>,
    last_error: Option<GatewayError>,
    pending: Option<PendingFetch>,
    next_token: u64,
    min_interval: Duration,
    disposed: bool,
}

impl SyncArbiter {
    /// Create an arbiter for an anonymous session
    pub fn new(min_interval: Duration) -> Self {
        Self {
            session: None,
            items: Arc::from(Vec::new()),
            phase: SyncPhase::Idle,
            last_success_at: None,
            last_success_instant: None,
            last_error: None,
            pending: None,
            next_token: 1,
            min_interval,
            disposed: false,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Token of the in-flight fetch, if any
    pub fn pending_token(&self) -> Option<RequestToken> {
        self.pending.map(|p| p.token)
    }

    pub fn last_success_instant(&self) -> Option<Instant> {
        self.last_success_instant
    }

    /// Arbitrate a refresh request
    pub fn request(&mut self, reason: RefreshReason, force: bool, now: Instant) -> Decision {
        if self.disposed {
            return Decision::Dropped(DropReason::Disposed);
        }
        let Some(username) = self.session.as_ref().map(|s| s.username.clone()) else {
            return Decision::Dropped(DropReason::Anonymous);
        };

        if let Some(pending) = self.pending.as_mut() {
            if !force {
                return Decision::Dropped(DropReason::InFlight);
            }
            if !pending.dispatched {
                return Decision::Dropped(DropReason::Coalesced);
            }
            pending.queued = true;
            return Decision::Queued;
        }

        if !force && !cooldown_elapsed(self.last_success_instant, now, self.min_interval) {
            return Decision::Dropped(DropReason::Debounced);
        }

        Decision::Start(self.start(username, reason))
    }

    /// Record that the fetch for `token` is about to hit the network.
    ///
    /// Returns false when the token is no longer current, in which case the
    /// caller should not make the call at all.
    pub fn mark_dispatched(&mut self, token: RequestToken) -> bool {
        match self.pending.as_mut() {
            Some(pending) if !self.disposed && pending.token == token => {
                pending.dispatched = true;
                true
            }
            _ => false,
        }
    }

    /// Apply the result of the fetch identified by `token`
    pub fn complete(
        &mut self,
        token: RequestToken,
        result: Result<Vec<HistoryItem>, GatewayError>,
        now: Instant,
        wall_now: DateTime<Utc>,
    ) -> Completion {
        let pending = match self.pending {
            Some(pending) if !self.disposed && pending.token == token => pending,
            _ => return Completion::Discarded,
        };
        self.pending = None;

        match result {
            Ok(items) => {
                self.items = Arc::from(items);
                self.phase = SyncPhase::Idle;
                self.last_success_at = Some(wall_now);
                self.last_success_instant = Some(now);
                self.last_error = None;

                let next = match (pending.queued, self.session.as_ref()) {
                    (true, Some(session)) => {
                        let username = session.username.clone();
                        Some(self.start(username, RefreshReason::Queued))
                    }
                    _ => None,
                };
                Completion::Updated { next }
            }
            Err(error) => {
                // Keep the last good items on screen; no automatic retry
                self.phase = SyncPhase::FetchFailed;
                self.last_error = Some(error);
                Completion::Failed
            }
        }
    }

    /// Switch to a different user (or to anonymous).
    ///
    /// Everything belonging to the previous user is dropped, including any
    /// in-flight fetch. For a signed-in user a forced fetch starts at once.
    pub fn change_user(
        &mut self,
        session: Option<Session>,
        reason: RefreshReason,
        now: Instant,
    ) -> Option<FetchTicket> {
        if self.disposed {
            return None;
        }

        self.session = session;
        self.items = Arc::from(Vec::new());
        self.phase = SyncPhase::Idle;
        self.last_success_at = None;
        self.last_success_instant = None;
        self.last_error = None;
        self.pending = None;

        match self.request(reason, true, now) {
            Decision::Start(ticket) => Some(ticket),
            _ => None,
        }
    }

    /// Stop for good. Returns true the first time only.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        self.pending = None;
        true
    }

    /// Copy of the state for readers
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            username: self.session.as_ref().map(|s| s.username.clone()),
            items: self.items.clone(),
            phase: self.phase,
            last_success_at: self.last_success_at,
            last_error: self.last_error.clone(),
        }
    }

    fn start(&mut self, username: String, reason: RefreshReason) -> FetchTicket {
        let token = RequestToken(self.next_token);
        self.next_token += 1;
        self.pending = Some(PendingFetch {
            token,
            dispatched: false,
            queued: false,
        });
        self.phase = SyncPhase::Fetching;
        FetchTicket {
            token,
            username,
            reason,
        }
    }
}
