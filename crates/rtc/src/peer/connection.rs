//! Peer connection lifecycle
//!
//! Wraps a webrtc::RTCPeerConnection behind the four coarse phases the
//! room layer cares about and buffers remote candidates that arrive
//! before the remote description.

use crate::config::RtcConfig;
use crate::signaling::protocol::CandidatePayload;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection as WebRTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Coarse connection phase
///
/// The underlying transport exposes finer-grained states; the room
/// layer only contracts these four. Failed/disconnected transports are
/// logged and left observable through `transport_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Connection object exists, negotiation not started
    Created,
    /// Offer/answer exchange in progress
    Negotiating,
    /// Media transport established
    Connected,
    /// Torn down locally or by the transport
    Closed,
}

/// One point-to-point media connection to a remote peer
pub struct PeerConnection {
    /// Identifier of the remote peer
    peer_id: String,

    /// Unique identifier for this connection instance
    connection_id: String,

    /// Actual WebRTC peer connection
    peer_connection: Arc<WebRTCPeerConnection>,

    /// Coarse phase, synchronously readable so teardown paths and
    /// in-flight drains agree on CLOSED without awaiting
    phase: Arc<Mutex<ConnectionPhase>>,

    /// Timestamp when the connection object was created
    created_at: Instant,

    /// Timestamp when the transport last reached Connected
    connected_at: Arc<Mutex<Option<Instant>>>,

    /// Remote candidates that arrived before the remote description
    pending_remote: Mutex<Vec<CandidatePayload>>,

    /// Set once the remote description is in place
    remote_description_set: AtomicBool,

    /// Candidates applied to the transport so far
    applied_candidates: AtomicU64,

    /// Candidates buffered while waiting for the remote description
    buffered_candidates: AtomicU64,

    /// RTP senders retained so added tracks are not cleaned up
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

impl PeerConnection {
    /// Create a new peer connection
    ///
    /// # Arguments
    ///
    /// * `peer_id` - Identifier of the remote peer
    /// * `config` - STUN/TURN servers and codec preferences
    #[instrument(skip(config), fields(peer_id = %peer_id))]
    pub async fn new(peer_id: String, config: &RtcConfig) -> Result<Self> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Creating peer connection: peer_id={}, connection_id={}",
            peer_id, connection_id
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let phase = Arc::new(Mutex::new(ConnectionPhase::Created));
        let connected_at = Arc::new(Mutex::new(None));

        let phase_clone = Arc::clone(&phase);
        let connected_at_clone = Arc::clone(&connected_at);
        let peer_id_clone = peer_id.clone();

        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let phase = Arc::clone(&phase_clone);
                let connected_at = Arc::clone(&connected_at_clone);
                let peer_id = peer_id_clone.clone();

                Box::pin(async move {
                    match s {
                        RTCPeerConnectionState::Connected => {
                            let mut guard = phase.lock();
                            if *guard != ConnectionPhase::Closed {
                                debug!(
                                    "Peer {} phase transition: {:?} -> Connected",
                                    peer_id, *guard
                                );
                                *guard = ConnectionPhase::Connected;
                                *connected_at.lock() = Some(Instant::now());
                            }
                        }
                        RTCPeerConnectionState::Closed => {
                            let mut guard = phase.lock();
                            if *guard != ConnectionPhase::Closed {
                                debug!(
                                    "Peer {} phase transition: {:?} -> Closed",
                                    peer_id, *guard
                                );
                                *guard = ConnectionPhase::Closed;
                            }
                        }
                        // Abrupt counterpart loss is not resolved here;
                        // callers poll transport_state for detail
                        RTCPeerConnectionState::Failed => {
                            warn!("Peer {} transport failed", peer_id);
                        }
                        RTCPeerConnectionState::Disconnected => {
                            warn!("Peer {} transport disconnected", peer_id);
                        }
                        other => {
                            debug!("Peer {} transport state: {}", peer_id, other);
                        }
                    }
                })
            },
        ));

        Ok(Self {
            peer_id,
            connection_id,
            peer_connection,
            phase,
            created_at: Instant::now(),
            connected_at,
            pending_remote: Mutex::new(Vec::new()),
            remote_description_set: AtomicBool::new(false),
            applied_candidates: AtomicU64::new(0),
            buffered_candidates: AtomicU64::new(0),
            senders: Mutex::new(Vec::new()),
        })
    }

    /// Get the peer ID
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Get the connection ID
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Current coarse phase
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.lock()
    }

    /// Raw transport state, for callers that want more than the phase
    pub fn transport_state(&self) -> RTCPeerConnectionState {
        self.peer_connection.connection_state()
    }

    /// Force the phase to Closed; used by teardown so a drain already
    /// dispatched observes the closure before the async close lands
    pub fn mark_closed(&self) {
        let mut guard = self.phase.lock();
        if *guard != ConnectionPhase::Closed {
            debug!(
                "Peer {} phase transition: {:?} -> Closed",
                self.peer_id, *guard
            );
            *guard = ConnectionPhase::Closed;
        }
    }

    fn set_phase(&self, new_phase: ConnectionPhase) {
        let mut guard = self.phase.lock();
        if *guard == new_phase || *guard == ConnectionPhase::Closed {
            return;
        }
        debug!(
            "Peer {} phase transition: {:?} -> {:?}",
            self.peer_id, *guard, new_phase
        );
        *guard = new_phase;
    }

    /// Create an SDP offer and install it as the local description
    pub async fn create_offer(&self) -> Result<RTCSessionDescription> {
        self.set_phase(ConnectionPhase::Negotiating);

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        debug!("Created SDP offer for peer {}", self.peer_id);

        self.peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("No local description after setting offer".to_string()))
    }

    /// Create an SDP answer and install it as the local description
    ///
    /// The remote offer must already be in place.
    pub async fn create_answer(&self) -> Result<RTCSessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        debug!("Created SDP answer for peer {}", self.peer_id);

        self.peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("No local description after setting answer".to_string()))
    }

    /// Install the counterpart's description and flush any candidates
    /// buffered while waiting for it
    pub async fn set_remote_description(&self, description: RTCSessionDescription) -> Result<()> {
        debug!("Setting remote description for peer {}", self.peer_id);

        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        self.set_phase(ConnectionPhase::Negotiating);

        // Flip the flag and drain under one lock so a concurrently
        // arriving candidate either lands in the drained batch or takes
        // the direct path, never neither
        let drained: Vec<CandidatePayload> = {
            let mut pending = self.pending_remote.lock();
            self.remote_description_set.store(true, Ordering::SeqCst);
            std::mem::take(&mut *pending)
        };

        if !drained.is_empty() {
            debug!(
                "Flushing {} buffered candidates for peer {}",
                drained.len(),
                self.peer_id
            );
        }
        for payload in drained {
            if let Err(e) = self.apply_candidate(&payload).await {
                warn!(
                    "Failed to apply buffered candidate for peer {}: {}",
                    self.peer_id, e
                );
            }
        }

        Ok(())
    }

    /// Hand a remote candidate to the transport, or buffer it when the
    /// remote description has not arrived yet
    pub async fn add_ice_candidate(&self, payload: &CandidatePayload) -> Result<()> {
        {
            let mut pending = self.pending_remote.lock();
            if !self.remote_description_set.load(Ordering::SeqCst) {
                pending.push(payload.clone());
                self.buffered_candidates.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "Buffered candidate for peer {} until the remote description arrives",
                    self.peer_id
                );
                return Ok(());
            }
        }

        self.apply_candidate(payload).await
    }

    async fn apply_candidate(&self, payload: &CandidatePayload) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(payload.to_init())
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))?;
        self.applied_candidates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Attach a local track for sending media to this peer
    pub async fn attach_track(&self, track: Arc<TrackLocalStaticSample>) -> Result<()> {
        let sender = self
            .peer_connection
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;
        self.senders.lock().push(sender);
        Ok(())
    }

    /// Register a callback for when a remote track arrives
    pub fn on_remote_track<F>(&self, handler: F)
    where
        F: Fn(
                Arc<TrackRemote>,
                Arc<RTCRtpReceiver>,
                Arc<RTCRtpTransceiver>,
            ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            + Send
            + Sync
            + 'static,
    {
        self.peer_connection.on_track(Box::new(handler));
    }

    /// Register a callback for locally gathered candidates
    ///
    /// The callback receives `None` once gathering for the current
    /// negotiation is complete.
    pub fn on_local_candidate<F>(&self, handler: F)
    where
        F: Fn(
                Option<RTCIceCandidate>,
            ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            + Send
            + Sync
            + 'static,
    {
        self.peer_connection.on_ice_candidate(Box::new(handler));
    }

    /// Close the connection; idempotent
    pub async fn close(&self) -> Result<()> {
        info!("Closing peer connection for peer {}", self.peer_id);

        self.mark_closed();

        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close connection: {}", e)))
    }

    /// Time since the transport last reached Connected
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.lock().map(|at| at.elapsed())
    }

    /// Time since the connection object was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Number of remote candidates applied to the transport
    pub fn applied_candidate_count(&self) -> u64 {
        self.applied_candidates.load(Ordering::SeqCst)
    }

    /// Number of remote candidates buffered ahead of the remote description
    pub fn buffered_candidate_count(&self) -> u64 {
        self.buffered_candidates.load(Ordering::SeqCst)
    }
}
