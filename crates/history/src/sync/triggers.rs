//! Refresh triggers
//!
//! Background tasks that turn outside signals into refresh requests: an
//! in-process "history changed" bus, and the advisory refresh flag other
//! processes leave in the config directory. Both only hold a weak handle,
//! so they end when the controller goes away.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::MissedTickBehavior;

use super::controller::{HistorySync, WeakHistorySync};
use super::timing::{FlagCheck, check_flag};
use crate::models::RefreshReason;
use crate::storage::{FlagStore, RefreshFlag};

/// Backlog kept per subscriber; older events are reported as lag
const EVENT_CAPACITY: usize = 16;

/// Application-wide history notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEvent {
    /// A record was saved or deleted somewhere in the app
    Changed,
}

impl HistoryEvent {
    /// Event name used when the event crosses a process boundary
    pub const NAME: &'static str = "history-changed";
}

/// In-process broadcast bus for [`HistoryEvent`]s.
///
/// Also remembers the last refresh flag this process raised, so the flag
/// poller can leave it for other instances.
#[derive(Clone)]
pub struct HistoryEvents {
    tx: broadcast::Sender<HistoryEvent>,
    raised_at: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl HistoryEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tx,
            raised_at: Arc::new(Mutex::new(None)),
        }
    }

    /// Note that this process just raised `flag`
    pub fn remember_flag(&self, flag: &RefreshFlag) {
        *self.raised_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(flag.saved_at);
    }

    /// Whether `flag` is the last one this process raised
    pub fn raised_here(&self, flag: &RefreshFlag) -> bool {
        *self.raised_at.lock().unwrap_or_else(PoisonError::into_inner) == Some(flag.saved_at)
    }

    /// Send `event` to every subscriber; returns how many were listening
    pub fn publish(&self, event: HistoryEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Shorthand for publishing [`HistoryEvent::Changed`]
    pub fn notify_changed(&self) -> usize {
        self.publish(HistoryEvent::Changed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for HistoryEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the trigger tasks attached to a controller
#[derive(Default)]
pub struct Triggers {
    events: Option<HistoryEvents>,
    flags: Option<Arc<dyn FlagStore>>,
}

impl Triggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh after "history changed" broadcasts
    pub fn broadcast(mut self, events: &HistoryEvents) -> Self {
        self.events = Some(events.clone());
        self
    }

    /// Poll the advisory refresh flag
    pub fn flag_store(mut self, store: Arc<dyn FlagStore>) -> Self {
        self.flags = Some(store);
        self
    }

    /// Start the configured tasks; returns how many were started.
    ///
    /// Subscribes to the bus before returning, so events published right
    /// after this call are not missed.
    pub fn spawn(self, sync: &HistorySync) -> usize {
        let settings = sync.settings().clone();
        let mut started = 0;

        if let Some(events) = &self.events {
            let rx = events.subscribe();
            sync.spawn_trigger(listen_for_broadcasts(
                sync.downgrade(),
                rx,
                settings.broadcast_delay(),
            ));
            started += 1;
        }

        if let Some(store) = self.flags {
            let interval = settings.flag_poll_interval();
            if interval.is_zero() {
                warn!("Refresh flag polling disabled: zero interval");
            } else {
                // With a broadcast listener attached, flags raised here are
                // already handled by the bus
                sync.spawn_trigger(poll_refresh_flag(
                    sync.downgrade(),
                    store,
                    self.events,
                    interval,
                    settings.flag_max_age(),
                ));
                started += 1;
            }
        }

        if sync.is_disposed() { 0 } else { started }
    }
}

async fn listen_for_broadcasts(
    sync: WeakHistorySync,
    mut rx: broadcast::Receiver<HistoryEvent>,
    delay: Duration,
) {
    loop {
        match rx.recv().await {
            Ok(HistoryEvent::Changed) => {}
            // Missed events still mean something changed
            Err(RecvError::Lagged(skipped)) => debug!("History bus lagged by {}", skipped),
            Err(RecvError::Closed) => {
                debug!("History bus closed, listener stopping");
                return;
            }
        }

        // Let the writer finish, then fold everything that arrived meanwhile
        tokio::time::sleep(delay).await;
        loop {
            match rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => break,
            }
        }

        let Some(sync) = sync.upgrade() else {
            return;
        };
        sync.request_refresh(RefreshReason::Broadcast, true);
    }
}

async fn poll_refresh_flag(
    sync: WeakHistorySync,
    store: Arc<dyn FlagStore>,
    local: Option<HistoryEvents>,
    interval: Duration,
    max_age: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(sync) = sync.upgrade() else {
            return;
        };
        check_refresh_flag(&sync, store.as_ref(), local.as_ref(), max_age);
    }
}

/// What one check of the refresh flag did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    /// No flag, or a lowered one with nothing to clean up
    Absent,
    /// Fresh flag: refreshed and cleared
    Refreshed,
    /// Stale, lowered or unreadable flag: cleared without refreshing
    Discarded,
    /// Fresh flag left in place for another instance
    Left,
}

/// Act on the refresh flag once.
///
/// A fresh flag triggers a forced refresh and is then cleared. It is left
/// alone when nobody is signed in here, or when `local` says this process
/// raised it. Stale and unreadable flags are cleared without refreshing.
pub fn check_refresh_flag(
    sync: &HistorySync,
    store: &dyn FlagStore,
    local: Option<&HistoryEvents>,
    max_age: Duration,
) -> FlagOutcome {
    let flag = match store.read() {
        Ok(flag) => flag,
        Err(e) => {
            warn!("Discarding unreadable refresh flag: {:#}", e);
            clear_flag(store);
            return FlagOutcome::Discarded;
        }
    };

    let outcome = match (check_flag(flag, Utc::now(), max_age), flag) {
        (FlagCheck::Absent, _) => return FlagOutcome::Absent,
        (FlagCheck::Fresh, Some(flag)) if local.is_some_and(|events| events.raised_here(&flag)) => {
            return FlagOutcome::Left;
        }
        (FlagCheck::Fresh, _) if sync.session().is_none() => {
            debug!("Refresh flag left for a signed-in instance");
            return FlagOutcome::Left;
        }
        (FlagCheck::Fresh, _) => {
            debug!("Refresh flag raised");
            sync.request_refresh(RefreshReason::Flag, true);
            FlagOutcome::Refreshed
        }
        (FlagCheck::Stale, _) => {
            debug!("Discarding stale refresh flag");
            FlagOutcome::Discarded
        }
    };

    clear_flag(store);
    outcome
}

fn clear_flag(store: &dyn FlagStore) {
    if let Err(e) = store.clear() {
        warn!("Failed to clear refresh flag: {:#}", e);
    }
}
