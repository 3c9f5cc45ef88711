//! In-memory history gateway
//!
//! Behaves like the backend (per-user lists, newest first, server-assigned
//! ids) without a network. Used by tests and by the app's offline mode.
//! Latency and failures can be injected to exercise the sync controller.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{GatewayError, HistoryGateway};
use crate::models::{HistoryDraft, HistoryId, HistoryItem};

#[derive(Default)]
struct Faults {
    /// Failures handed out to the next list calls, in order
    queued: VecDeque<GatewayError>,
    /// Failure returned by every list call while set
    sticky: Option<GatewayError>,
}

/// In-memory implementation of HistoryGateway
pub struct InMemoryHistoryGateway {
    /// username -> records, newest first
    records: Mutex<HashMap<String, Vec<HistoryItem>>>,
    next_id: AtomicI64,
    latency: Mutex<Duration>,
    faults: Mutex<Faults>,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    /// Usernames in the order list_history was called with them
    list_log: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryHistoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            latency: Mutex::new(Duration::ZERO),
            faults: Mutex::new(Faults::default()),
            list_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            list_log: Mutex::new(Vec::new()),
        }
    }

    /// Seed a record as if it had been saved earlier.
    ///
    /// The record is placed first (newest) in its owner's list and the id
    /// counter is moved past its id.
    pub fn insert(&self, item: HistoryItem) {
        self.next_id.fetch_max(item.id.value() + 1, Ordering::SeqCst);
        let mut records = lock(&self.records);
        let list = records.entry(item.username.clone()).or_default();
        list.retain(|existing| existing.id != item.id);
        list.insert(0, item);
    }

    /// Delay every call by `latency` (uses tokio time, so paused clocks apply)
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Fail the next list call with `error`; queued failures are used in order
    pub fn fail_next(&self, error: GatewayError) {
        lock(&self.faults).queued.push_back(error);
    }

    /// Fail every list call until cleared with `None`
    pub fn set_failure(&self, error: Option<GatewayError>) {
        lock(&self.faults).sticky = error;
    }

    /// Number of list_history calls received
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of get_detail calls received
    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    /// Usernames passed to list_history, in call order
    pub fn list_log(&self) -> Vec<String> {
        lock(&self.list_log).clone()
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_fault(&self) -> Option<GatewayError> {
        let mut faults = lock(&self.faults);
        faults.queued.pop_front().or_else(|| faults.sticky.clone())
    }
}

impl Default for InMemoryHistoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryGateway for InMemoryHistoryGateway {
    async fn list_history(&self, username: &str) -> Result<Vec<HistoryItem>, GatewayError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.list_log).push(username.to_string());

        // Read after the delay so writes made meanwhile are visible, like a
        // real round trip that reaches the server late
        self.simulate_latency().await;

        if let Some(error) = self.take_fault() {
            return Err(error);
        }

        Ok(lock(&self.records).get(username).cloned().unwrap_or_default())
    }

    async fn get_detail(&self, id: HistoryId) -> Result<HistoryItem, GatewayError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        lock(&self.records)
            .values()
            .flatten()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                resource: format!("history {}", id),
            })
    }

    async fn save_history(&self, draft: &HistoryDraft) -> Result<HistoryId, GatewayError> {
        self.simulate_latency().await;

        let id = HistoryId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let item = HistoryItem::builder(id, draft.username.clone())
            .language(draft.language.clone())
            .kind(draft.kind)
            .original_code(draft.original_code.clone())
            .artifact(draft.artifact.clone())
            .error_lines(draft.error_lines.clone())
            .created_at(Utc::now())
            .build();

        lock(&self.records)
            .entry(draft.username.clone())
            .or_default()
            .insert(0, item);
        Ok(id)
    }

    async fn delete_history(&self, id: HistoryId, username: &str) -> Result<(), GatewayError> {
        self.simulate_latency().await;

        let mut records = lock(&self.records);
        let owner = records
            .iter()
            .find(|(_, items)| items.iter().any(|item| item.id == id))
            .map(|(owner, _)| owner.clone())
            .ok_or_else(|| GatewayError::NotFound {
                resource: format!("history {}", id),
            })?;

        if owner != username {
            return Err(GatewayError::ServerError {
                status: 403,
                message: format!("history {} belongs to another user", id),
            });
        }

        if let Some(items) = records.get_mut(&owner) {
            items.retain(|item| item.id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisKind;

    fn item(id: i64, user: &str) -> HistoryItem {
        HistoryItem::builder(HistoryId::new(id), user)
            .language("rust")
            .original_code(format!("fn item_{}() {{}}", id))
            .build()
    }

    #[test]
    fn test_list_is_newest_first_and_per_user() {
        let gw = InMemoryHistoryGateway::new();
        gw.insert(item(1, "alice"));
        gw.insert(item(4, "alice"));
        gw.insert(item(2, "bob"));

        let alice = tokio_test::block_on(gw.list_history("alice")).unwrap();
        let ids: Vec<i64> = alice.iter().map(|i| i.id.value()).collect();
        assert_eq!(ids, vec![4, 1]);

        let carol = tokio_test::block_on(gw.list_history("carol")).unwrap();
        assert!(carol.is_empty());
        assert_eq!(gw.list_calls(), 2);
        assert_eq!(gw.list_log(), vec!["alice", "carol"]);
    }

    #[test]
    fn test_save_assigns_ids_after_seeded_records() {
        let gw = InMemoryHistoryGateway::new();
        gw.insert(item(5, "alice"));

        let draft = HistoryDraft::new("alice", "go", AnalysisKind::Suggest, "func main() {}");
        let id = tokio_test::block_on(gw.save_history(&draft)).unwrap();
        assert_eq!(id, HistoryId(6));

        let list = tokio_test::block_on(gw.list_history("alice")).unwrap();
        assert_eq!(list[0].id, HistoryId(6));
        assert_eq!(list[0].kind, AnalysisKind::Suggest);
    }

    #[test]
    fn test_fault_injection() {
        let gw = InMemoryHistoryGateway::new();
        gw.fail_next(GatewayError::Timeout);

        assert_eq!(
            tokio_test::block_on(gw.list_history("alice")),
            Err(GatewayError::Timeout)
        );
        assert!(tokio_test::block_on(gw.list_history("alice")).is_ok());

        gw.set_failure(Some(GatewayError::network("down")));
        assert!(tokio_test::block_on(gw.list_history("alice")).is_err());
        assert!(tokio_test::block_on(gw.list_history("alice")).is_err());
        gw.set_failure(None);
        assert!(tokio_test::block_on(gw.list_history("alice")).is_ok());
    }

    #[test]
    fn test_detail_and_delete() {
        let gw = InMemoryHistoryGateway::new();
        gw.insert(item(3, "alice"));

        let detail = tokio_test::block_on(gw.get_detail(HistoryId(3))).unwrap();
        assert_eq!(detail.username, "alice");
        assert!(matches!(
            tokio_test::block_on(gw.get_detail(HistoryId(99))),
            Err(GatewayError::NotFound { .. })
        ));

        assert!(matches!(
            tokio_test::block_on(gw.delete_history(HistoryId(3), "bob")),
            Err(GatewayError::ServerError { status: 403, .. })
        ));
        tokio_test::block_on(gw.delete_history(HistoryId(3), "alice")).unwrap();
        assert!(tokio_test::block_on(gw.list_history("alice")).unwrap().is_empty());
    }
}
