//! Local and remote media stream handles
//!
//! A [`LocalStream`] groups the tracks a participant publishes into a
//! room. Tracks carry pre-encoded media; capture and encoding happen
//! upstream and feed each track through [`LocalTrack::write_media`].
//! Audio tracks additionally expose a PCM tap that the level meter
//! samples without touching the RTP path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use crate::config::{AudioCodec, VideoCodec};
use crate::{Error, Result};

/// What kind of media a local track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    /// String form used in track identifiers
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single outbound media track
///
/// Wraps the underlying WebRTC sample track together with an enable
/// flag and, for audio, the most recent raw PCM frame for analysis.
pub struct LocalTrack {
    kind: TrackKind,
    track: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    /// Most recent PCM frame pushed by the capture side. Disabling the
    /// track clears the tap so readers observe silence, not a stale frame.
    pcm_tap: Mutex<Vec<f32>>,
}

impl LocalTrack {
    fn new(kind: TrackKind, capability: RTCRtpCodecCapability, stream_id: &str) -> Self {
        let track_id = format!("{}-{}", kind.as_str(), Uuid::new_v4());
        let track = Arc::new(TrackLocalStaticSample::new(
            capability,
            track_id,
            stream_id.to_string(),
        ));
        Self {
            kind,
            track,
            enabled: AtomicBool::new(true),
            pcm_tap: Mutex::new(Vec::new()),
        }
    }

    /// Track identifier (unique per track)
    pub fn id(&self) -> String {
        use webrtc::track::track_local::TrackLocal;
        self.track.id().to_string()
    }

    /// Kind of media this track carries
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Underlying WebRTC track, for attaching to a peer connection
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.track)
    }

    /// Whether this track is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable the track
    ///
    /// A disabled track drops writes instead of transmitting, and its
    /// PCM tap is cleared so level analysis reads silence.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.pcm_tap.lock().clear();
        }
    }

    /// Write one pre-encoded media sample to the track
    ///
    /// The payload must already be encoded for the track's codec. When
    /// the track is disabled the sample is dropped and `Ok` returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaTrackError`] if the underlying track
    /// rejects the sample.
    pub async fn write_media(&self, data: Bytes, duration: Duration) -> Result<()> {
        if !self.is_enabled() {
            debug!(track_id = %self.id(), "Track disabled, dropping sample");
            return Ok(());
        }

        let sample = Sample {
            data,
            duration,
            timestamp: std::time::SystemTime::now(),
            ..Default::default()
        };

        self.track
            .write_sample(&sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write media sample: {}", e)))
    }

    /// Publish the latest raw PCM frame for level analysis
    ///
    /// The tap keeps only the most recent frame. Frames pushed while
    /// the track is disabled are dropped.
    pub fn push_pcm(&self, samples: &[f32]) {
        if !self.is_enabled() {
            return;
        }
        let mut tap = self.pcm_tap.lock();
        tap.clear();
        tap.extend_from_slice(samples);
    }

    /// Most recent PCM frame, if any has been pushed
    pub fn latest_pcm(&self) -> Option<Vec<f32>> {
        let tap = self.pcm_tap.lock();
        if tap.is_empty() {
            None
        } else {
            Some(tap.clone())
        }
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// The set of tracks a participant publishes
///
/// Streams are cheap to share; sessions attach each track to every
/// peer connection they open.
pub struct LocalStream {
    stream_id: String,
    tracks: Mutex<Vec<Arc<LocalTrack>>>,
}

impl LocalStream {
    /// Create an empty stream with a fresh identifier
    pub fn new() -> Self {
        Self {
            stream_id: format!("stream-{}", Uuid::new_v4()),
            tracks: Mutex::new(Vec::new()),
        }
    }

    /// Stream identifier shared by all tracks in this stream
    pub fn id(&self) -> &str {
        &self.stream_id
    }

    /// Add an audio track using the given codec parameters
    pub fn add_audio_track(&self, codec: &AudioCodec) -> Arc<LocalTrack> {
        let capability = RTCRtpCodecCapability {
            mime_type: codec.mime_type().to_string(),
            clock_rate: codec.clock_rate(),
            channels: codec.channels(),
            ..Default::default()
        };
        let track = Arc::new(LocalTrack::new(TrackKind::Audio, capability, &self.stream_id));
        self.tracks.lock().push(Arc::clone(&track));
        track
    }

    /// Add a video track using the given codec parameters
    pub fn add_video_track(&self, codec: &VideoCodec) -> Arc<LocalTrack> {
        let capability = RTCRtpCodecCapability {
            mime_type: codec.mime_type().to_string(),
            clock_rate: codec.clock_rate(),
            ..Default::default()
        };
        let track = Arc::new(LocalTrack::new(TrackKind::Video, capability, &self.stream_id));
        self.tracks.lock().push(Arc::clone(&track));
        track
    }

    /// All tracks currently in the stream
    pub fn tracks(&self) -> Vec<Arc<LocalTrack>> {
        self.tracks.lock().clone()
    }

    /// The first audio track, if the stream has one
    pub fn audio_track(&self) -> Option<Arc<LocalTrack>> {
        self.tracks
            .lock()
            .iter()
            .find(|t| t.kind() == TrackKind::Audio)
            .cloned()
    }
}

impl Default for LocalStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream")
            .field("stream_id", &self.stream_id)
            .field("tracks", &self.tracks.lock().len())
            .finish()
    }
}

/// An inbound track from a remote peer, bound to its stream
#[derive(Clone)]
pub struct RemoteMedia {
    stream_id: String,
    track_id: String,
    track: Arc<TrackRemote>,
}

impl RemoteMedia {
    /// Bind a remote track, capturing its stream and track identifiers
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self {
            stream_id: track.stream_id(),
            track_id: track.id(),
            track,
        }
    }

    /// Identifier of the remote stream this track belongs to
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Identifier of the track within its stream
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// The underlying remote track, for reading RTP media
    pub fn track(&self) -> Arc<TrackRemote> {
        Arc::clone(&self.track)
    }

    /// Whether the remote track carries audio
    pub fn is_audio(&self) -> bool {
        self.track.kind() == RTPCodecType::Audio
    }
}

impl std::fmt::Debug for RemoteMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMedia")
            .field("stream_id", &self.stream_id)
            .field("track_id", &self.track_id)
            .finish()
    }
}
