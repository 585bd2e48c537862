//! Addressed signaling over a shared record store
//!
//! The channel gives peer pairings their send/receive surface: publish
//! writes into the counterpart's record, subscribe watches one's own.
//! Delivery is at-least-once with full-snapshot redelivery; consumers
//! clear entries after processing them. Every store failure here is
//! logged and abandoned, never retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::signaling::protocol::{CandidatePayload, InboundSnapshot, StoredDescription};
use crate::signaling::store::{SignalingStore, WatchId};
use crate::Result;

/// Handler invoked with the full inbound snapshot on every record change
pub type SnapshotHandler = Arc<dyn Fn(InboundSnapshot) -> BoxFuture<'static, ()> + Send + Sync>;

/// Send/receive surface for one user in one room
#[derive(Clone)]
pub struct SignalingChannel {
    room_id: String,
    store: Arc<dyn SignalingStore>,
}

impl SignalingChannel {
    /// Create a channel bound to one room on the given store
    pub fn new(room_id: impl Into<String>, store: Arc<dyn SignalingStore>) -> Self {
        Self {
            room_id: room_id.into(),
            store,
        }
    }

    /// Room this channel is bound to
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Append a candidate under (to, from); best-effort
    pub async fn publish_candidate(&self, from: &str, to: &str, payload: CandidatePayload) {
        if let Err(e) = self
            .store
            .append_candidate(&self.room_id, to, from, payload)
            .await
        {
            warn!(from, to, error = %e, "Failed to publish candidate");
        }
    }

    /// Set the pending description under (to, from); best-effort
    pub async fn publish_description(&self, from: &str, to: &str, description: StoredDescription) {
        if let Err(e) = self
            .store
            .put_description(&self.room_id, to, from, description)
            .await
        {
            warn!(from, to, error = %e, "Failed to publish description");
        }
    }

    /// Remove all stored candidates from `from` addressed to `self_id`;
    /// best-effort
    pub async fn clear_candidates(&self, self_id: &str, from: &str) {
        if let Err(e) = self
            .store
            .clear_candidates(&self.room_id, self_id, from)
            .await
        {
            warn!(self_id, from, error = %e, "Failed to clear candidates");
        }
    }

    /// Remove the pending description from `from` addressed to `self_id`;
    /// best-effort
    pub async fn clear_description(&self, self_id: &str, from: &str) {
        if let Err(e) = self
            .store
            .clear_description(&self.room_id, self_id, from)
            .await
        {
            warn!(self_id, from, error = %e, "Failed to clear description");
        }
    }

    /// Watch the inbound record of `self_id`
    ///
    /// The handler receives the full current snapshot immediately and
    /// again on every change. Deliveries for one subscription are
    /// serialized: the next snapshot is not dispatched until the
    /// handler future for the previous one resolves.
    pub async fn subscribe(&self, self_id: &str, handler: SnapshotHandler) -> Result<Subscription> {
        let (watch_id, mut rx) = self.store.watch(&self.room_id, self_id).await?;

        let active = Arc::new(AtomicBool::new(true));
        let dispatch_active = active.clone();
        let task = tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                if !dispatch_active.load(Ordering::SeqCst) {
                    break;
                }
                handler(snapshot).await;
            }
        });

        debug!(self_id, room_id = %self.room_id, "Signaling subscription attached");
        Ok(Subscription {
            active,
            watch_id,
            store: self.store.clone(),
            _task: task,
        })
    }
}

/// Handle for one active signaling subscription
///
/// `unsubscribe` detaches synchronously: once it returns, no further
/// handler invocation starts (a handler already running may finish).
pub struct Subscription {
    active: Arc<AtomicBool>,
    watch_id: WatchId,
    store: Arc<dyn SignalingStore>,
    _task: JoinHandle<()>,
}

impl Subscription {
    /// Detach from the store; idempotent
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.store.unwatch(self.watch_id);
        }
    }

    /// True until `unsubscribe` is called
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
