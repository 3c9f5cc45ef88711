//! History sync controller
//!
//! Owns the arbiter, runs fetches on the tokio runtime and publishes a
//! snapshot after every state change. Clones share one controller; the
//! last clone dropped stops it like [`HistorySync::dispose`].

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::arbiter::{Completion, Decision, DropReason, FetchTicket, SyncArbiter};
use super::timing::cooldown_elapsed;
use crate::config::Settings;
use crate::gateway::{GatewayError, HistoryGateway};
use crate::models::{HistoryId, HistoryItem, RefreshReason, Session, Snapshot};

struct Inner {
    arbiter: SyncArbiter,
    /// Task running the current fetch
    inflight: Option<AbortHandle>,
    /// Trigger tasks stopped on dispose
    triggers: Vec<AbortHandle>,
}

struct Shared {
    inner: Mutex<Inner>,
    gateway: Arc<dyn HistoryGateway>,
    settings: Settings,
    snapshots: watch::Sender<Snapshot>,
    runtime: Handle,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = inner.inflight.take() {
            task.abort();
        }
        for task in inner.triggers.drain(..) {
            task.abort();
        }
    }
}

/// Handle to a history sync controller
#[derive(Clone)]
pub struct HistorySync {
    shared: Arc<Shared>,
}

/// Non-owning handle held by background tasks
#[derive(Clone)]
pub struct WeakHistorySync {
    shared: Weak<Shared>,
}

impl WeakHistorySync {
    /// Get the controller back if any strong handle is still alive
    pub fn upgrade(&self) -> Option<HistorySync> {
        self.shared.upgrade().map(|shared| HistorySync { shared })
    }
}

impl HistorySync {
    /// Create a controller with no signed-in user.
    ///
    /// Must be called from within a tokio runtime; fetches are spawned on it.
    pub fn new(gateway: Arc<dyn HistoryGateway>, settings: Settings) -> Result<Self> {
        let runtime = Handle::try_current().context("History sync needs a tokio runtime")?;
        let arbiter = SyncArbiter::new(settings.min_refresh_interval());
        let (snapshots, _) = watch::channel(arbiter.snapshot());

        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    arbiter,
                    inflight: None,
                    triggers: Vec::new(),
                }),
                gateway,
                settings,
                snapshots,
                runtime,
            }),
        })
    }

    /// Create a controller for `session` and start the initial fetch
    pub fn activate(
        gateway: Arc<dyn HistoryGateway>,
        settings: Settings,
        session: Option<Session>,
    ) -> Result<Self> {
        let sync = Self::new(gateway, settings)?;
        sync.switch_user(session, RefreshReason::Activation);
        Ok(sync)
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn downgrade(&self) -> WeakHistorySync {
        WeakHistorySync {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Current state
    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// Receive every published state; the current one is marked seen
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.snapshots.subscribe()
    }

    /// The signed-in user, if any
    pub fn session(&self) -> Option<Session> {
        self.lock().arbiter.session().cloned()
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().arbiter.is_disposed()
    }

    /// Ask for the list to be refetched.
    ///
    /// Unforced requests give way to an in-flight fetch and to the debounce
    /// window. Forced ones skip the window; while a fetch is in flight they
    /// are folded into it or queued behind it.
    pub fn request_refresh(&self, reason: RefreshReason, force: bool) {
        let mut inner = self.lock();
        match inner.arbiter.request(reason, force, Instant::now()) {
            Decision::Start(ticket) => {
                info!("Refreshing history for {} ({})", ticket.username, reason);
                self.launch(&mut inner, ticket);
            }
            Decision::Queued => {
                debug!("Refresh ({}) queued behind the in-flight fetch", reason);
            }
            Decision::Dropped(DropReason::Disposed) => {}
            Decision::Dropped(why) => {
                debug!("Refresh ({}) skipped: {:?}", reason, why);
            }
        }
    }

    /// Switch to another user, or to none on logout
    pub fn on_user_changed(&self, session: Option<Session>) {
        self.switch_user(session, RefreshReason::UserChanged);
    }

    /// Window focus came back; refetch if the list is getting old
    pub fn on_focus_regained(&self) {
        let stale = {
            let inner = self.lock();
            cooldown_elapsed(
                inner.arbiter.last_success_instant(),
                Instant::now(),
                self.shared.settings.focus_stale_after(),
            )
        };

        if stale {
            self.request_refresh(RefreshReason::Focus, true);
        } else {
            debug!("Focus regained, history is recent enough");
        }
    }

    /// Fetch the full record behind a list entry
    pub async fn open_detail(&self, id: HistoryId) -> Result<HistoryItem, GatewayError> {
        let gateway = self.shared.gateway.clone();
        let timeout = self.shared.settings.request_timeout();

        match tokio::time::timeout(timeout, gateway.get_detail(id)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    /// Stop fetching and ignore anything still on its way. Idempotent.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        if !inner.arbiter.dispose() {
            return;
        }
        if let Some(task) = inner.inflight.take() {
            task.abort();
        }
        for task in inner.triggers.drain(..) {
            task.abort();
        }
        info!("History sync disposed");
    }

    /// Run a background task whose lifetime ends with the controller
    pub(crate) fn spawn_trigger<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.arbiter.is_disposed() {
            return;
        }
        let handle = self.shared.runtime.spawn(task);
        inner.triggers.push(handle.abort_handle());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.shared.snapshots.send_replace(inner.arbiter.snapshot());
    }

    fn switch_user(&self, session: Option<Session>, reason: RefreshReason) {
        let mut inner = self.lock();
        if inner.arbiter.is_disposed() {
            return;
        }

        if let Some(task) = inner.inflight.take() {
            task.abort();
        }
        let ticket = inner.arbiter.change_user(session, reason, Instant::now());

        match ticket {
            Some(ticket) => {
                info!("History user is now {}", ticket.username);
                self.launch(&mut inner, ticket);
            }
            None => {
                info!("History user signed out");
                self.publish(&inner);
            }
        }
    }

    /// Spawn the fetch for `ticket`; the caller holds the lock
    fn launch(&self, inner: &mut Inner, ticket: FetchTicket) {
        self.publish(inner);

        let weak = self.downgrade();
        let gateway = self.shared.gateway.clone();
        let timeout = self.shared.settings.request_timeout();

        let task = self.shared.runtime.spawn(async move {
            {
                let Some(sync) = weak.upgrade() else {
                    return;
                };
                if !sync.lock().arbiter.mark_dispatched(ticket.token) {
                    return;
                }
            }

            let result = match tokio::time::timeout(timeout, gateway.list_history(&ticket.username)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout),
            };

            if let Some(sync) = weak.upgrade() {
                sync.finish(ticket, result);
            }
        });

        if let Some(previous) = inner.inflight.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    fn finish(&self, ticket: FetchTicket, result: Result<Vec<HistoryItem>, GatewayError>) {
        let mut inner = self.lock();
        let outcome = match &result {
            Ok(items) => format!("{} items", items.len()),
            Err(e) => e.to_string(),
        };

        match inner.arbiter.complete(ticket.token, result, Instant::now(), Utc::now()) {
            Completion::Updated { next } => {
                inner.inflight = None;
                info!("History for {} refreshed: {}", ticket.username, outcome);
                match next {
                    Some(next) => {
                        info!("Running queued history refresh for {}", next.username);
                        self.launch(&mut inner, next);
                    }
                    None => self.publish(&inner),
                }
            }
            Completion::Failed => {
                inner.inflight = None;
                warn!("History refresh for {} failed: {}", ticket.username, outcome);
                self.publish(&inner);
            }
            Completion::Discarded => {
                debug!("Discarded stale history result {} ({})", ticket.token, outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryHistoryGateway;
    use crate::models::SyncPhase;
    use std::time::Duration;

    fn seeded() -> Arc<InMemoryHistoryGateway> {
        let gateway = Arc::new(InMemoryHistoryGateway::new());
        for id in 1..=3 {
            gateway.insert(
                HistoryItem::builder(HistoryId::new(id), "alice")
                    .language("java")
                    .original_code("class A {}")
                    .build(),
            );
        }
        gateway
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = HistorySync::new(seeded(), Settings::default());
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_loads_list() {
        let gateway = seeded();
        let sync = HistorySync::activate(gateway.clone(), Settings::default(), Session::new("alice")).unwrap();
        assert_eq!(sync.snapshot().phase, SyncPhase::Fetching);

        let mut rx = sync.subscribe();
        rx.wait_for(|s| s.phase == SyncPhase::Idle).await.unwrap();

        assert_eq!(sync.snapshot().ids(), vec![3, 2, 1]);
        assert_eq!(gateway.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_activation_stays_idle() {
        let gateway = seeded();
        let sync = HistorySync::activate(gateway.clone(), Settings::default(), None).unwrap();
        sync.request_refresh(RefreshReason::Manual, true);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(sync.snapshot().phase, SyncPhase::Idle);
        assert_eq!(gateway.list_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_in_flight_fetch() {
        let gateway = seeded();
        gateway.set_latency(Duration::from_secs(5));
        let sync = HistorySync::activate(gateway.clone(), Settings::default(), Session::new("alice")).unwrap();
        let mut rx = sync.subscribe();
        let weak = sync.downgrade();

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(sync);
        assert!(weak.upgrade().is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        // Sender is gone with the controller
        assert!(rx.changed().await.is_err());
        assert_eq!(gateway.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_detail_times_out() {
        let gateway = seeded();
        gateway.set_latency(Duration::from_secs(60));
        let sync = HistorySync::new(gateway, Settings::default()).unwrap();

        assert_eq!(sync.open_detail(HistoryId::new(1)).await, Err(GatewayError::Timeout));
    }
}
