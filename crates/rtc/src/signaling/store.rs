//! Signaling record store seam
//!
//! The store holds one signaling record per (room, user). Each record
//! carries the user's inbound descriptions and candidates keyed by
//! sender. The production deployment backs this with the platform's
//! document database; `MemorySignalingStore` is the in-process
//! implementation used by tests and single-process rooms.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::signaling::protocol::{CandidatePayload, InboundSnapshot, StoredCandidate, StoredDescription};
use crate::Result;

/// Identifier for an active record watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// Storage seam for signaling records
///
/// Semantics the channel layer relies on:
/// - `append_candidate` assigns a store-wide monotonic sequence number
/// - watchers receive the full record snapshot, first immediately on
///   `watch` and then on every subsequent change
/// - `unwatch` is synchronous, so a teardown path can detach without
///   awaiting
#[async_trait]
pub trait SignalingStore: Send + Sync {
    /// Append a candidate from `from` to the record of `to`, returning
    /// the assigned sequence number
    async fn append_candidate(
        &self,
        room_id: &str,
        to: &str,
        from: &str,
        payload: CandidatePayload,
    ) -> Result<u64>;

    /// Set the pending description from `from` in the record of `to`,
    /// replacing any earlier one
    async fn put_description(
        &self,
        room_id: &str,
        to: &str,
        from: &str,
        description: StoredDescription,
    ) -> Result<()>;

    /// Delete the pending description from `from` in the record of `to`
    async fn clear_description(&self, room_id: &str, to: &str, from: &str) -> Result<()>;

    /// Delete all candidates from `from` in the record of `to`
    async fn clear_candidates(&self, room_id: &str, to: &str, from: &str) -> Result<()>;

    /// Read the current record of `user_id` in `room_id`
    async fn load(&self, room_id: &str, user_id: &str) -> Result<InboundSnapshot>;

    /// Subscribe to changes of the record of `user_id` in `room_id`
    ///
    /// The current snapshot is delivered on the receiver before this
    /// call returns a value.
    async fn watch(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(WatchId, mpsc::UnboundedReceiver<InboundSnapshot>)>;

    /// Detach a watch; no further snapshots are delivered after return
    fn unwatch(&self, watch_id: WatchId);
}

type RecordKey = (String, String);

struct Watcher {
    key: RecordKey,
    tx: mpsc::UnboundedSender<InboundSnapshot>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<RecordKey, InboundSnapshot>,
    watchers: HashMap<u64, Watcher>,
    next_seq: u64,
    next_watch_id: u64,
}

impl Inner {
    fn notify(&mut self, key: &RecordKey) {
        let snapshot = self.records.get(key).cloned().unwrap_or_default();
        // Drop watchers whose receiver side is gone
        self.watchers
            .retain(|_, w| w.key != *key || w.tx.send(snapshot.clone()).is_ok());
    }

    fn drop_record_if_empty(&mut self, key: &RecordKey) {
        if self.records.get(key).is_some_and(InboundSnapshot::is_empty) {
            self.records.remove(key);
        }
    }
}

/// In-process signaling store
///
/// All mutation happens under one mutex; watcher notification sends on
/// unbounded channels and never blocks inside the critical section.
///
/// ```
/// use parlor_rtc::signaling::{
///     DescriptionKind, MemorySignalingStore, SignalingStore, StoredDescription,
/// };
///
/// # tokio_test::block_on(async {
/// let store = MemorySignalingStore::new();
/// let offer = StoredDescription {
///     kind: DescriptionKind::Offer,
///     sdp: "v=0\r\n".to_string(),
/// };
/// store
///     .put_description("room", "alice", "bob", offer)
///     .await
///     .unwrap();
///
/// let snapshot = store.load("room", "alice").await.unwrap();
/// assert!(snapshot.description_from("bob").is_some());
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MemorySignalingStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySignalingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live watches, for teardown assertions
    pub fn watch_count(&self) -> usize {
        self.inner.lock().watchers.len()
    }
}

#[async_trait]
impl SignalingStore for MemorySignalingStore {
    async fn append_candidate(
        &self,
        room_id: &str,
        to: &str,
        from: &str,
        payload: CandidatePayload,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let key = (room_id.to_string(), to.to_string());
        inner
            .records
            .entry(key.clone())
            .or_default()
            .candidates
            .entry(from.to_string())
            .or_default()
            .push(StoredCandidate { seq, payload });
        inner.notify(&key);
        Ok(seq)
    }

    async fn put_description(
        &self,
        room_id: &str,
        to: &str,
        from: &str,
        description: StoredDescription,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let key = (room_id.to_string(), to.to_string());
        inner
            .records
            .entry(key.clone())
            .or_default()
            .descriptions
            .insert(from.to_string(), description);
        inner.notify(&key);
        Ok(())
    }

    async fn clear_description(&self, room_id: &str, to: &str, from: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let key = (room_id.to_string(), to.to_string());
        let removed = inner
            .records
            .get_mut(&key)
            .and_then(|record| record.descriptions.remove(from))
            .is_some();
        if removed {
            inner.drop_record_if_empty(&key);
            inner.notify(&key);
        }
        Ok(())
    }

    async fn clear_candidates(&self, room_id: &str, to: &str, from: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let key = (room_id.to_string(), to.to_string());
        let removed = inner
            .records
            .get_mut(&key)
            .and_then(|record| record.candidates.remove(from))
            .is_some_and(|list| !list.is_empty());
        if removed {
            inner.drop_record_if_empty(&key);
            inner.notify(&key);
        }
        Ok(())
    }

    async fn load(&self, room_id: &str, user_id: &str) -> Result<InboundSnapshot> {
        let inner = self.inner.lock();
        let key = (room_id.to_string(), user_id.to_string());
        Ok(inner.records.get(&key).cloned().unwrap_or_default())
    }

    async fn watch(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(WatchId, mpsc::UnboundedReceiver<InboundSnapshot>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_watch_id += 1;
        let id = inner.next_watch_id;
        let key = (room_id.to_string(), user_id.to_string());
        let snapshot = inner.records.get(&key).cloned().unwrap_or_default();
        // Initial snapshot; the receiver is still in hand, so this cannot fail
        let _ = tx.send(snapshot);
        inner.watchers.insert(id, Watcher { key, tx });
        debug!(room_id, user_id, watch_id = id, "Record watch attached");
        Ok((WatchId(id), rx))
    }

    fn unwatch(&self, watch_id: WatchId) {
        let mut inner = self.inner.lock();
        if inner.watchers.remove(&watch_id.0).is_some() {
            debug!(watch_id = watch_id.0, "Record watch detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: u32) -> CandidatePayload {
        CandidatePayload {
            candidate: format!("candidate:{} 1 udp 2130706431 10.0.0.1 5000 typ host", n),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_monotonic_seq() {
        let store = MemorySignalingStore::new();
        let s1 = store
            .append_candidate("room", "alice", "bob", payload(1))
            .await
            .unwrap();
        let s2 = store
            .append_candidate("room", "alice", "bob", payload(2))
            .await
            .unwrap();
        // Still monotonic across unrelated pairings
        let s3 = store
            .append_candidate("room", "carol", "dave", payload(3))
            .await
            .unwrap();
        assert!(s1 < s2);
        assert!(s2 < s3);
    }

    #[tokio::test]
    async fn test_watch_delivers_initial_snapshot() {
        let store = MemorySignalingStore::new();
        store
            .append_candidate("room", "alice", "bob", payload(1))
            .await
            .unwrap();

        let (watch, mut rx) = store.watch("room", "alice").await.unwrap();
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.candidates_from("bob").len(), 1);
        store.unwatch(watch);
    }

    #[tokio::test]
    async fn test_change_notifies_full_snapshot() {
        let store = MemorySignalingStore::new();
        let (watch, mut rx) = store.watch("room", "alice").await.unwrap();
        assert!(rx.recv().await.unwrap().is_empty());

        store
            .append_candidate("room", "alice", "bob", payload(1))
            .await
            .unwrap();
        store
            .append_candidate("room", "alice", "bob", payload(2))
            .await
            .unwrap();

        // Each change redelivers the whole record, not a diff
        let first = rx.recv().await.unwrap();
        assert_eq!(first.candidates_from("bob").len(), 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.candidates_from("bob").len(), 2);
        store.unwatch(watch);
    }

    #[tokio::test]
    async fn test_unwatch_stops_deliveries() {
        let store = MemorySignalingStore::new();
        let (watch, mut rx) = store.watch("room", "alice").await.unwrap();
        assert!(rx.recv().await.unwrap().is_empty());

        store.unwatch(watch);
        store
            .append_candidate("room", "alice", "bob", payload(1))
            .await
            .unwrap();

        // Sender side is gone, so the channel reports closed
        assert!(rx.recv().await.is_none());
        assert_eq!(store.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_candidates_scoped_to_sender() {
        let store = MemorySignalingStore::new();
        store
            .append_candidate("room", "alice", "bob", payload(1))
            .await
            .unwrap();
        store
            .append_candidate("room", "alice", "carol", payload(2))
            .await
            .unwrap();

        store.clear_candidates("room", "alice", "bob").await.unwrap();

        let snapshot = store.load("room", "alice").await.unwrap();
        assert!(snapshot.candidates_from("bob").is_empty());
        assert_eq!(snapshot.candidates_from("carol").len(), 1);
    }

    #[tokio::test]
    async fn test_description_point_set_semantics() {
        let store = MemorySignalingStore::new();
        let offer = StoredDescription {
            kind: crate::signaling::protocol::DescriptionKind::Offer,
            sdp: "v=0 first".to_string(),
        };
        let replacement = StoredDescription {
            kind: crate::signaling::protocol::DescriptionKind::Offer,
            sdp: "v=0 second".to_string(),
        };

        store
            .put_description("room", "alice", "bob", offer)
            .await
            .unwrap();
        store
            .put_description("room", "alice", "bob", replacement.clone())
            .await
            .unwrap();

        let snapshot = store.load("room", "alice").await.unwrap();
        assert_eq!(snapshot.description_from("bob"), Some(&replacement));

        store.clear_description("room", "alice", "bob").await.unwrap();
        let snapshot = store.load("room", "alice").await.unwrap();
        assert!(snapshot.description_from("bob").is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let store = MemorySignalingStore::new();
        let (_watch, rx) = store.watch("room", "alice").await.unwrap();
        drop(rx);

        // Next change prunes the dead watcher instead of erroring
        store
            .append_candidate("room", "alice", "bob", payload(1))
            .await
            .unwrap();
        assert_eq!(store.watch_count(), 0);
    }
}
