//! Room session orchestration
//!
//! A [`RoomSession`] owns one signaling channel and one connection
//! registry for a room, and drives the full life of each peer pairing:
//! open, negotiate over the store, apply inbound candidates, close.
//!
//! Negotiation roles are deterministic: the lexicographically smaller
//! peer id creates the offer, the other side answers. Both sides may
//! call `open` concurrently without glare.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::RtcConfig;
use crate::media::{LocalStream, RemoteMedia};
use crate::peer::connection::{ConnectionPhase, PeerConnection};
use crate::peer::registry::{ConnectionRegistry, TeardownFn};
use crate::signaling::{
    CandidatePayload, DescriptionKind, InboundSnapshot, SignalingChannel, SignalingStore,
    SnapshotHandler, StoredDescription,
};
use crate::{Error, Result};

/// UI callback invoked once per new inbound track
pub type RemoteTrackHandler = Arc<dyn Fn(RemoteMedia) + Send + Sync>;

/// A participant's view of one room
///
/// Holds the signaling channel and the connection registry. All peer
/// connections opened through a session share its configuration.
pub struct RoomSession {
    my_id: String,
    room_id: String,
    config: RtcConfig,
    channel: SignalingChannel,
    registry: Arc<ConnectionRegistry>,
}

impl RoomSession {
    /// Create a session for `my_id` in `room_id`, backed by `store`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the configuration fails
    /// validation or `my_id` is empty.
    pub fn new(
        my_id: impl Into<String>,
        room_id: impl Into<String>,
        config: RtcConfig,
        store: Arc<dyn SignalingStore>,
    ) -> Result<Self> {
        let my_id = my_id.into();
        let room_id = room_id.into();

        if my_id.is_empty() {
            return Err(Error::InvalidConfig("peer id must not be empty".to_string()));
        }
        config.validate()?;

        let registry = Arc::new(ConnectionRegistry::new(config.max_peers)?);
        let channel = SignalingChannel::new(room_id.clone(), store);

        info!(my_id = %my_id, room_id = %room_id, "Creating room session");

        Ok(Self {
            my_id,
            room_id,
            config,
            channel,
            registry,
        })
    }

    /// This participant's peer id
    pub fn my_id(&self) -> &str {
        &self.my_id
    }

    /// The room this session belongs to
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Session configuration
    pub fn config(&self) -> &RtcConfig {
        &self.config
    }

    /// The live connection toward `peer_id`, if one is open
    pub fn connection(&self, peer_id: &str) -> Option<Arc<PeerConnection>> {
        self.registry.acquire(peer_id)
    }

    /// Ids of all peers with an open connection
    pub fn peer_ids(&self) -> Vec<String> {
        self.registry.peer_ids()
    }

    /// Open a connection toward `peer_id`
    ///
    /// Idempotent: a second call while the first connection is still
    /// registered returns the same connection. Local tracks from
    /// `local` are attached before negotiation starts; per-track
    /// failures are logged and skipped. `on_remote_track` fires once
    /// per new inbound track, deduplicated by (stream id, track id),
    /// and never after the connection is closed.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot be created, the
    /// signaling subscription fails, or the peer limit is reached.
    #[instrument(skip(self, local, on_remote_track), fields(my_id = %self.my_id, peer_id = %peer_id))]
    pub async fn open(
        &self,
        peer_id: &str,
        local: Option<&LocalStream>,
        on_remote_track: RemoteTrackHandler,
    ) -> Result<Arc<PeerConnection>> {
        if peer_id == self.my_id {
            return Err(Error::PeerConnectionError(
                "Cannot open a connection to self".to_string(),
            ));
        }

        if let Some(existing) = self.registry.acquire(peer_id) {
            debug!("Reusing existing connection");
            return Ok(existing);
        }

        let connection = Arc::new(PeerConnection::new(peer_id.to_string(), &self.config).await?);

        if let Some(stream) = local {
            for track in stream.tracks() {
                if let Err(e) = connection.attach_track(track.rtc_track()).await {
                    warn!(track_id = %track.id(), "Failed to attach local track: {}", e);
                }
            }
        }

        self.install_candidate_publisher(&connection, peer_id);
        self.install_remote_track_handler(&connection, peer_id, on_remote_track);

        let drain = Arc::new(PairingDrain {
            connection: Arc::clone(&connection),
            channel: self.channel.clone(),
            my_id: self.my_id.clone(),
            peer_id: peer_id.to_string(),
            watermark: AtomicU64::new(0),
            last_description: Mutex::new(None),
        });
        let handler: SnapshotHandler =
            Arc::new(move |snapshot: InboundSnapshot| -> BoxFuture<'static, ()> {
                let drain = Arc::clone(&drain);
                Box::pin(async move { drain.drain(snapshot).await })
            });
        let subscription = self.channel.subscribe(&self.my_id, handler).await?;

        let conn_for_teardown = Arc::clone(&connection);
        let teardowns: Vec<TeardownFn> = vec![
            Box::new(move || subscription.unsubscribe()),
            Box::new(move || conn_for_teardown.mark_closed()),
        ];

        if !self.registry.register(peer_id, Arc::clone(&connection), teardowns) {
            // Lost a race with a concurrent open, or the room is full.
            // Dropping the teardowns unsubscribed our watch already.
            if let Err(e) = connection.close().await {
                debug!("Failed to close superseded connection: {}", e);
            }
            if let Some(existing) = self.registry.acquire(peer_id) {
                return Ok(existing);
            }
            return Err(Error::PeerConnectionError(format!(
                "Maximum peer limit reached ({})",
                self.config.max_peers
            )));
        }

        if self.is_offerer(peer_id) {
            self.publish_offer(&connection, peer_id).await;
        }
        self.watch_negotiation(&connection, peer_id);

        Ok(connection)
    }

    /// Close the connection toward `peer_id`
    ///
    /// Unsubscribes the signaling watch, marks the phase CLOSED and
    /// closes the underlying connection. Idempotent; failures during
    /// cleanup are logged, never surfaced.
    #[instrument(skip(self), fields(my_id = %self.my_id, peer_id = %peer_id))]
    pub async fn close(&self, peer_id: &str) {
        let Some(connection) = self.registry.release(peer_id) else {
            debug!("No connection registered, nothing to close");
            return;
        };

        if let Err(e) = connection.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }

    /// Close every open connection in the session
    pub async fn shutdown(&self) {
        let released = self.registry.release_all();
        info!(my_id = %self.my_id, peers = released.len(), "Shutting down room session");

        for (peer_id, connection) in released {
            if let Err(e) = connection.close().await {
                warn!(peer_id = %peer_id, "Failed to close peer connection during shutdown: {}", e);
            }
        }
    }

    /// The lexicographically smaller id makes the offer
    fn is_offerer(&self, peer_id: &str) -> bool {
        self.my_id.as_str() < peer_id
    }

    fn install_candidate_publisher(&self, connection: &Arc<PeerConnection>, peer_id: &str) {
        let channel = self.channel.clone();
        let from = self.my_id.clone();
        let to = peer_id.to_string();

        connection.on_local_candidate(move |candidate| {
            let channel = channel.clone();
            let from = from.clone();
            let to = to.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!(peer_id = %to, "Local candidate gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        channel
                            .publish_candidate(&from, &to, CandidatePayload::from_init(init))
                            .await;
                    }
                    Err(e) => {
                        warn!(peer_id = %to, "Failed to serialize local candidate: {}", e);
                    }
                }
            })
        });
    }

    fn install_remote_track_handler(
        &self,
        connection: &Arc<PeerConnection>,
        peer_id: &str,
        on_remote_track: RemoteTrackHandler,
    ) {
        // Weak: the transport owns this callback, a strong reference
        // back to the connection would cycle.
        let conn = Arc::downgrade(connection);
        let seen: Arc<Mutex<HashSet<(String, String)>>> = Arc::new(Mutex::new(HashSet::new()));
        let peer = peer_id.to_string();

        connection.on_remote_track(move |track, _receiver, _transceiver| {
            let Some(conn) = conn.upgrade() else {
                return Box::pin(async {});
            };
            if conn.phase() == ConnectionPhase::Closed {
                debug!(peer_id = %peer, "Ignoring remote track after close");
                return Box::pin(async {});
            }

            let media = RemoteMedia::new(track);
            let key = (media.stream_id().to_string(), media.track_id().to_string());
            if !seen.lock().insert(key) {
                debug!(peer_id = %peer, track_id = %media.track_id(), "Duplicate remote track suppressed");
                return Box::pin(async {});
            }

            debug!(peer_id = %peer, stream_id = %media.stream_id(), track_id = %media.track_id(), "Remote track received");
            on_remote_track(media);
            Box::pin(async {})
        });
    }

    async fn publish_offer(&self, connection: &Arc<PeerConnection>, peer_id: &str) {
        let offer = match connection.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                warn!(peer_id = %peer_id, "Failed to create offer: {}", e);
                return;
            }
        };
        match StoredDescription::from_session_description(&offer) {
            Ok(stored) => {
                self.channel
                    .publish_description(&self.my_id, peer_id, stored)
                    .await;
            }
            Err(e) => warn!(peer_id = %peer_id, "Failed to encode offer: {}", e),
        }
    }

    /// Warn when a pairing is still negotiating after the configured
    /// timeout. Observability only; the connection is left alone.
    fn watch_negotiation(&self, connection: &Arc<PeerConnection>, peer_id: &str) {
        let conn = Arc::downgrade(connection);
        let peer = peer_id.to_string();
        let timeout = Duration::from_secs(u64::from(self.config.negotiation_timeout_secs));

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(conn) = conn.upgrade() else { return };
            match conn.phase() {
                ConnectionPhase::Connected | ConnectionPhase::Closed => {}
                phase => {
                    warn!(
                        peer_id = %peer,
                        ?phase,
                        timeout_secs = timeout.as_secs(),
                        "Negotiation has not completed"
                    );
                }
            }
        });
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("my_id", &self.my_id)
            .field("room_id", &self.room_id)
            .field("peers", &self.registry.len())
            .finish()
    }
}

/// Per-pairing snapshot drain
///
/// One instance per open(), shared with the subscription's dispatch
/// task. Deliveries are serialized by the channel, so the watermark
/// and description bookkeeping never race with themselves.
struct PairingDrain {
    connection: Arc<PeerConnection>,
    channel: SignalingChannel,
    my_id: String,
    peer_id: String,
    /// Highest candidate seq consumed so far; redelivered snapshots
    /// replay candidates at or below it.
    watermark: AtomicU64,
    last_description: Mutex<Option<StoredDescription>>,
}

impl PairingDrain {
    /// Apply one inbound snapshot; no error escapes
    async fn drain(&self, snapshot: InboundSnapshot) {
        self.drain_description(&snapshot).await;
        self.drain_candidates(&snapshot).await;
    }

    async fn drain_description(&self, snapshot: &InboundSnapshot) {
        let Some(description) = snapshot.description_from(&self.peer_id) else {
            return;
        };

        let already_applied = {
            let last = self.last_description.lock();
            last.as_ref() == Some(description)
        };
        if already_applied {
            debug!(peer_id = %self.peer_id, "Skipping already-applied remote description");
            return;
        }

        if self.connection.phase() == ConnectionPhase::Closed {
            debug!(peer_id = %self.peer_id, "Connection closed, discarding remote description");
            self.channel
                .clear_description(&self.my_id, &self.peer_id)
                .await;
            return;
        }

        // Recorded before applying: a failed description is not retried
        // on redelivery.
        *self.last_description.lock() = Some(description.clone());
        self.apply_description(description).await;
        self.channel
            .clear_description(&self.my_id, &self.peer_id)
            .await;
    }

    async fn apply_description(&self, description: &StoredDescription) {
        let session_description = match description.to_session_description() {
            Ok(d) => d,
            Err(e) => {
                warn!(peer_id = %self.peer_id, "Discarding malformed remote description: {}", e);
                return;
            }
        };

        match description.kind {
            DescriptionKind::Offer => {
                if let Err(e) = self
                    .connection
                    .set_remote_description(session_description)
                    .await
                {
                    warn!(peer_id = %self.peer_id, "Failed to apply remote offer: {}", e);
                    return;
                }
                self.publish_answer().await;
            }
            DescriptionKind::Answer => {
                if let Err(e) = self
                    .connection
                    .set_remote_description(session_description)
                    .await
                {
                    warn!(peer_id = %self.peer_id, "Failed to apply remote answer: {}", e);
                }
            }
        }
    }

    async fn publish_answer(&self) {
        let answer = match self.connection.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(peer_id = %self.peer_id, "Failed to create answer: {}", e);
                return;
            }
        };
        match StoredDescription::from_session_description(&answer) {
            Ok(stored) => {
                self.channel
                    .publish_description(&self.my_id, &self.peer_id, stored)
                    .await;
            }
            Err(e) => warn!(peer_id = %self.peer_id, "Failed to encode answer: {}", e),
        }
    }

    async fn drain_candidates(&self, snapshot: &InboundSnapshot) {
        let inbound = snapshot.candidates_from(&self.peer_id);
        if inbound.is_empty() {
            return;
        }

        for stored in inbound {
            if stored.seq <= self.watermark.load(Ordering::SeqCst) {
                continue;
            }
            // Consumed even when application fails or is skipped.
            self.watermark.fetch_max(stored.seq, Ordering::SeqCst);

            if self.connection.phase() == ConnectionPhase::Closed {
                debug!(
                    peer_id = %self.peer_id,
                    seq = stored.seq,
                    "Connection closed, consuming candidate without applying"
                );
                continue;
            }

            if let Err(e) = self.connection.add_ice_candidate(&stored.payload).await {
                warn!(
                    peer_id = %self.peer_id,
                    seq = stored.seq,
                    "Failed to apply remote candidate: {}", e
                );
            }
        }

        self.channel
            .clear_candidates(&self.my_id, &self.peer_id)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::MemorySignalingStore;

    fn lan_session(my_id: &str, store: &Arc<MemorySignalingStore>) -> RoomSession {
        let store: Arc<dyn SignalingStore> = Arc::clone(store) as Arc<dyn SignalingStore>;
        RoomSession::new(my_id, "room-1", RtcConfig::lan(), store).unwrap()
    }

    fn noop_track_handler() -> RemoteTrackHandler {
        Arc::new(|_media| {})
    }

    #[test]
    fn test_session_creation() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);

        assert_eq!(session.my_id(), "alice");
        assert_eq!(session.room_id(), "room-1");
        assert!(session.peer_ids().is_empty());
    }

    #[test]
    fn test_session_rejects_empty_id() {
        let store: Arc<dyn SignalingStore> = Arc::new(MemorySignalingStore::new());
        let result = RoomSession::new("", "room-1", RtcConfig::lan(), store);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_session_rejects_invalid_config() {
        let store: Arc<dyn SignalingStore> = Arc::new(MemorySignalingStore::new());
        let config = RtcConfig::lan().with_max_peers(0);
        assert!(RoomSession::new("alice", "room-1", config, store).is_err());
    }

    #[test]
    fn test_offerer_role_is_deterministic() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);

        assert!(session.is_offerer("bob"));
        assert!(!session.is_offerer("aaron"));
    }

    #[tokio::test]
    async fn test_open_rejects_self() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);

        let result = session.open("alice", None, noop_track_handler()).await;
        assert!(matches!(result, Err(Error::PeerConnectionError(_))));
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);

        let first = session.open("bob", None, noop_track_handler()).await.unwrap();
        let second = session.open("bob", None, noop_track_handler()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.peer_ids(), vec!["bob".to_string()]);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_enforces_peer_limit() {
        let store: Arc<dyn SignalingStore> = Arc::new(MemorySignalingStore::new());
        let config = RtcConfig::lan().with_max_peers(1);
        let session = RoomSession::new("alice", "room-1", config, store).unwrap();

        session.open("bob", None, noop_track_handler()).await.unwrap();
        let result = session.open("carol", None, noop_track_handler()).await;
        assert!(matches!(result, Err(Error::PeerConnectionError(_))));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_offerer_publishes_offer_on_open() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);

        session.open("bob", None, noop_track_handler()).await.unwrap();

        // "alice" < "bob": the offer lands in bob's inbound record
        let snapshot = store.load("room-1", "bob").await.unwrap();
        let description = snapshot.description_from("alice").unwrap();
        assert_eq!(description.kind, DescriptionKind::Offer);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_answerer_does_not_publish_on_open() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("bob", &store);

        session.open("alice", None, noop_track_handler()).await.unwrap();

        let snapshot = store.load("room-1", "alice").await.unwrap();
        assert!(snapshot.description_from("bob").is_none());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);

        let connection = session.open("bob", None, noop_track_handler()).await.unwrap();
        assert_eq!(session.peer_ids().len(), 1);

        session.close("bob").await;
        assert!(session.connection("bob").is_none());
        assert_eq!(connection.phase(), ConnectionPhase::Closed);

        session.close("bob").await;
        assert!(session.connection("bob").is_none());
    }

    #[tokio::test]
    async fn test_close_unknown_peer_is_noop() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);
        session.close("nobody").await;
    }

    #[tokio::test]
    async fn test_close_unsubscribes_store_watch() {
        let store = Arc::new(MemorySignalingStore::new());
        let session = lan_session("alice", &store);

        session.open("bob", None, noop_track_handler()).await.unwrap();
        assert_eq!(store.watch_count(), 1);

        session.close("bob").await;
        assert_eq!(store.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_offer_answer_roundtrip_over_store() {
        let store = Arc::new(MemorySignalingStore::new());
        let alice = lan_session("alice", &store);
        let bob = lan_session("bob", &store);

        alice.open("bob", None, noop_track_handler()).await.unwrap();
        bob.open("alice", None, noop_track_handler()).await.unwrap();

        // Bob consumes the offer and answers; Alice consumes the answer.
        // Both stored descriptions end up cleared.
        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let to_bob = store.load("room-1", "bob").await.unwrap();
                let to_alice = store.load("room-1", "alice").await.unwrap();
                if to_bob.description_from("alice").is_none()
                    && to_alice.description_from("bob").is_none()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(settled.is_ok(), "offer/answer exchange did not settle");

        let alice_conn = alice.connection("bob").unwrap();
        let bob_conn = bob.connection("alice").unwrap();
        assert_ne!(alice_conn.phase(), ConnectionPhase::Created);
        assert_ne!(bob_conn.phase(), ConnectionPhase::Created);

        alice.shutdown().await;
        bob.shutdown().await;
    }

    fn host_candidate(port: u16) -> CandidatePayload {
        CandidatePayload {
            candidate: format!("candidate:1 1 udp 2130706431 127.0.0.1 {} typ host", port),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    fn drain_for(connection: &Arc<PeerConnection>, store: &Arc<MemorySignalingStore>) -> PairingDrain {
        PairingDrain {
            connection: Arc::clone(connection),
            channel: SignalingChannel::new("room-1", Arc::clone(store) as Arc<dyn SignalingStore>),
            my_id: "alice".to_string(),
            peer_id: "bob".to_string(),
            watermark: AtomicU64::new(0),
            last_description: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_drain_consumes_candidates_after_close() {
        let store = Arc::new(MemorySignalingStore::new());
        let connection =
            Arc::new(PeerConnection::new("bob".to_string(), &RtcConfig::lan()).await.unwrap());
        connection.close().await.unwrap();

        // A candidate delivered after close is still cleared from the
        // store, but never applied.
        store
            .append_candidate("room-1", "alice", "bob", host_candidate(54321))
            .await
            .unwrap();

        let drain = drain_for(&connection, &store);
        let snapshot = store.load("room-1", "alice").await.unwrap();
        drain.drain(snapshot).await;

        assert_eq!(connection.applied_candidate_count(), 0);
        assert_eq!(connection.buffered_candidate_count(), 0);
        let after = store.load("room-1", "alice").await.unwrap();
        assert!(after.candidates_from("bob").is_empty());
    }

    #[tokio::test]
    async fn test_drain_watermark_skips_redelivered_candidates() {
        let store = Arc::new(MemorySignalingStore::new());
        let connection =
            Arc::new(PeerConnection::new("bob".to_string(), &RtcConfig::lan()).await.unwrap());

        store
            .append_candidate("room-1", "alice", "bob", host_candidate(54321))
            .await
            .unwrap();

        let drain = drain_for(&connection, &store);
        let snapshot = store.load("room-1", "alice").await.unwrap();
        drain.drain(snapshot.clone()).await;
        // No remote description yet: the candidate lands in the buffer
        assert_eq!(connection.buffered_candidate_count(), 1);

        // Same snapshot again: the watermark blocks a second buffering
        drain.drain(snapshot).await;
        assert_eq!(connection.buffered_candidate_count(), 1);
        assert_eq!(connection.applied_candidate_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_survives_malformed_candidate() {
        let store = Arc::new(MemorySignalingStore::new());

        // A real offer with an audio section lets candidates apply
        let offerer =
            Arc::new(PeerConnection::new("alice".to_string(), &RtcConfig::lan()).await.unwrap());
        let stream = LocalStream::new();
        let track = stream.add_audio_track(&crate::config::AudioCodec::Opus);
        offerer.attach_track(track.rtc_track()).await.unwrap();
        let offer = offerer.create_offer().await.unwrap();

        let connection =
            Arc::new(PeerConnection::new("bob".to_string(), &RtcConfig::lan()).await.unwrap());
        connection.set_remote_description(offer).await.unwrap();

        store
            .append_candidate("room-1", "alice", "bob", host_candidate(50000))
            .await
            .unwrap();
        store
            .append_candidate(
                "room-1",
                "alice",
                "bob",
                CandidatePayload {
                    candidate: "not a candidate".to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                    username_fragment: None,
                },
            )
            .await
            .unwrap();

        let drain = drain_for(&connection, &store);
        let snapshot = store.load("room-1", "alice").await.unwrap();
        drain.drain(snapshot).await;

        // The valid candidate applied, the malformed one was consumed
        assert_eq!(connection.applied_candidate_count(), 1);
        let after = store.load("room-1", "alice").await.unwrap();
        assert!(after.candidates_from("bob").is_empty());

        offerer.close().await.unwrap();
        connection.close().await.unwrap();
    }
}
