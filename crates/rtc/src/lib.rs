//! Peer-to-peer WebRTC room sessions with store-backed signaling
//!
//! This crate connects participants of a small room in a full mesh of
//! WebRTC peer connections. Signaling flows through a shared key-value
//! store record per participant instead of a dedicated signaling
//! server, so any backend that can point-update a record and notify
//! watchers can carry a room.
//!
//! # Features
//!
//! - **Store-backed signaling**: offer/answer and ICE candidates ride
//!   a per-user record behind the [`SignalingStore`] trait
//! - **Deterministic roles**: the lexicographically smaller peer id
//!   offers, so both sides can open a pairing concurrently
//! - **Candidate buffering**: candidates that arrive before the remote
//!   description are held and flushed in order
//! - **Idempotent lifecycle**: repeated `open`/`close` calls are safe;
//!   one live connection per peer id
//! - **Audio level metering**: FFT-based 0-100 loudness scalar at
//!   display-refresh cadence for volume widgets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  RoomSession (one per participant per room)     │
//! │  ├─ SignalingChannel → SignalingStore (trait)   │
//! │  ├─ ConnectionRegistry (one entry per peer id)  │
//! │  │   └─ PeerConnection (phase, candidates)      │
//! │  └─ LocalStream tracks ↔ remote peers           │
//! │                                                 │
//! │  AudioLevelMeter ← LocalStream audio tap        │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use parlor_rtc::RtcConfig;
//!
//! let config = RtcConfig::lan().with_max_peers(4);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Opening a peer connection
//!
//! ```no_run
//! use std::sync::Arc;
//! use parlor_rtc::{MemorySignalingStore, RemoteMedia, RoomSession, RtcConfig, SignalingStore};
//!
//! # async fn example() -> parlor_rtc::Result<()> {
//! let store: Arc<dyn SignalingStore> = Arc::new(MemorySignalingStore::new());
//! let session = RoomSession::new("alice", "room-1", RtcConfig::default(), store)?;
//!
//! let connection = session
//!     .open(
//!         "bob",
//!         None,
//!         Arc::new(|media: RemoteMedia| {
//!             println!("remote track {} arrived", media.track_id());
//!         }),
//!     )
//!     .await?;
//!
//! println!("phase: {:?}", connection.phase());
//! session.close("bob").await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod signaling;

// Re-exports for public API
pub use config::{AudioCodec, IceServerConfig, RtcConfig, VideoCodec};
pub use error::{Error, Result};
pub use media::{
    AudioLevelMeter, LocalStream, LocalTrack, MeterHandle, RemoteMedia, SpectrumAnalyzer,
    TrackKind,
};
pub use peer::{
    ConnectionPhase, ConnectionRegistry, PeerConnection, RemoteTrackHandler, RoomSession,
};
pub use signaling::{
    CandidatePayload, DescriptionKind, InboundSnapshot, MemorySignalingStore, SignalingChannel,
    SignalingStore, StoredCandidate, StoredDescription, Subscription,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
