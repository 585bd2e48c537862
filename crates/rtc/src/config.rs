//! Configuration types for room RTC sessions

use serde::{Deserialize, Serialize};

/// Main configuration for a RoomSession
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtcConfig {
    /// STUN server URLs (stun:)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<IceServerConfig>,

    /// Maximum simultaneous peer connections (default: 8, max: 16)
    pub max_peers: u32,

    /// Audio codec for local tracks (default: Opus)
    pub audio_codec: AudioCodec,

    /// Video codec for local tracks (default: VP9)
    pub video_codec: VideoCodec,

    /// Seconds before an unfinished negotiation is logged as stalled (default: 30)
    pub negotiation_timeout_secs: u32,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Supported audio codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    /// Opus codec (default, required for WebRTC)
    Opus,
}

impl AudioCodec {
    /// MIME type registered with the media engine
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "audio/opus",
        }
    }

    /// Sample clock rate in Hz
    pub fn clock_rate(&self) -> u32 {
        match self {
            AudioCodec::Opus => 48000,
        }
    }

    /// Channel count
    pub fn channels(&self) -> u16 {
        match self {
            AudioCodec::Opus => 2,
        }
    }
}

/// Supported video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    /// VP8 codec (WebRTC standard, wide compatibility)
    VP8,
    /// VP9 codec (better compression, modern browsers)
    VP9,
    /// H.264 codec (universal compatibility)
    H264,
}

impl VideoCodec {
    /// MIME type registered with the media engine
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::VP8 => "video/VP8",
            VideoCodec::VP9 => "video/VP9",
            VideoCodec::H264 => "video/H264",
        }
    }

    /// Sample clock rate in Hz (90 kHz for all RTP video)
    pub fn clock_rate(&self) -> u32 {
        90000
    }
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            max_peers: 8,
            audio_codec: AudioCodec::Opus,
            video_codec: VideoCodec::VP9,
            negotiation_timeout_secs: 30,
        }
    }
}

impl RtcConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - any STUN URL does not start with `stun:`
    /// - any TURN URL does not start with `turn:` or `turns:`
    /// - a TURN entry has an empty username or credential
    /// - `max_peers` is not in range 1-16
    /// - `negotiation_timeout_secs` is not in range 1-120
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        for url in &self.stun_servers {
            if !url.starts_with("stun:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN URL must start with stun:, got {}",
                    url
                )));
            }
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN URL must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
            if turn.username.is_empty() || turn.credential.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "TURN server {} requires a username and credential",
                    turn.url
                )));
            }
        }

        if self.max_peers == 0 || self.max_peers > 16 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-16, got {}",
                self.max_peers
            )));
        }

        if self.negotiation_timeout_secs == 0 || self.negotiation_timeout_secs > 120 {
            return Err(Error::InvalidConfig(format!(
                "negotiation_timeout_secs must be in range 1-120, got {}",
                self.negotiation_timeout_secs
            )));
        }

        Ok(())
    }

    /// Create a configuration preset for LAN-only rooms
    ///
    /// Peers discover each other through host candidates alone, so no
    /// STUN or TURN servers are contacted.
    ///
    /// Settings:
    /// - ICE servers: none
    /// - Max peers: 16 (LAN bandwidth tolerates a full mesh)
    /// - Negotiation timeout: 10s (no relay round-trips to wait on)
    ///
    /// # Example
    ///
    /// ```
    /// use parlor_rtc::config::RtcConfig;
    ///
    /// let config = RtcConfig::lan();
    /// assert!(config.stun_servers.is_empty());
    /// assert_eq!(config.max_peers, 16);
    /// ```
    pub fn lan() -> Self {
        Self {
            stun_servers: Vec::new(),
            turn_servers: Vec::new(),
            max_peers: 16,
            audio_codec: AudioCodec::Opus,
            video_codec: VideoCodec::VP9,
            negotiation_timeout_secs: 10,
        }
    }

    /// Replace the STUN server list
    ///
    /// Useful for chaining with preset methods.
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    /// Add TURN servers to this configuration
    ///
    /// Useful for chaining with preset methods.
    ///
    /// # Example
    ///
    /// ```
    /// use parlor_rtc::config::{IceServerConfig, RtcConfig};
    ///
    /// let config = RtcConfig::default().with_turn_servers(vec![IceServerConfig {
    ///     url: "turn:turn.example.com:3478".to_string(),
    ///     username: "user".to_string(),
    ///     credential: "pass".to_string(),
    /// }]);
    /// assert_eq!(config.turn_servers.len(), 1);
    /// ```
    pub fn with_turn_servers(mut self, turn_servers: Vec<IceServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the maximum number of peers
    ///
    /// Useful for chaining with preset methods.
    pub fn with_max_peers(mut self, max_peers: u32) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Set the video codec
    ///
    /// Useful for chaining with preset methods.
    pub fn with_video_codec(mut self, video_codec: VideoCodec) -> Self {
        self.video_codec = video_codec;
        self
    }
}
