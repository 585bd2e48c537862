//! Stored signaling payload types
//!
//! These are the shapes at rest in a user's per-room signaling record:
//! one optional session description per sender plus an append-only
//! candidate list per sender, drained by the recipient.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// An ICE candidate as published by the sender, before the store
/// assigns it a sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePayload {
    /// Candidate attribute line
    pub candidate: String,

    /// SDP media stream identification tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// SDP media line index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl CandidatePayload {
    /// Build a payload from a gathered local candidate
    pub fn from_init(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }

    /// Convert back into the form `add_ice_candidate` accepts
    pub fn to_init(&self) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: self.candidate.clone(),
            sdp_mid: self.sdp_mid.clone(),
            sdp_mline_index: self.sdp_mline_index,
            username_fragment: self.username_fragment.clone(),
        }
    }
}

/// A candidate at rest in the addressee's record
///
/// `seq` is assigned by the store on append and is strictly increasing
/// per store, so a drain can tell fresh candidates from ones it has
/// already consumed when the same snapshot is delivered again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCandidate {
    /// Store-assigned monotonic sequence number
    pub seq: u64,

    /// The candidate itself
    pub payload: CandidatePayload,
}

/// Which half of the offer/answer exchange a description is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionKind {
    /// Initial offer from the negotiation initiator
    Offer,
    /// Answer from the callee
    Answer,
}

/// A session description at rest in the addressee's record
///
/// Point-set semantics: one description per sender, a later publish
/// replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDescription {
    /// Offer or answer
    pub kind: DescriptionKind,

    /// Raw SDP text
    pub sdp: String,
}

impl StoredDescription {
    /// Build a stored description from a freshly created local description
    pub fn from_session_description(desc: &RTCSessionDescription) -> crate::Result<Self> {
        let kind = match desc.sdp_type {
            RTCSdpType::Offer => DescriptionKind::Offer,
            RTCSdpType::Answer => DescriptionKind::Answer,
            other => {
                return Err(crate::Error::SdpError(format!(
                    "Unsupported SDP type for signaling: {}",
                    other
                )))
            }
        };
        Ok(Self {
            kind,
            sdp: desc.sdp.clone(),
        })
    }

    /// Parse into the form `set_remote_description` accepts
    pub fn to_session_description(&self) -> crate::Result<RTCSessionDescription> {
        let desc = match self.kind {
            DescriptionKind::Offer => RTCSessionDescription::offer(self.sdp.clone()),
            DescriptionKind::Answer => RTCSessionDescription::answer(self.sdp.clone()),
        };
        desc.map_err(|e| crate::Error::SdpError(format!("Failed to parse stored SDP: {}", e)))
    }
}

/// Full inbound state of one user's signaling record, keyed by sender id
///
/// Subscribers receive the complete snapshot on every record change,
/// never a diff. Consumers clear what they have consumed; the `seq`
/// watermark covers the window between applying and clearing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundSnapshot {
    /// One pending description per sender
    pub descriptions: HashMap<String, StoredDescription>,

    /// Pending candidates per sender, in append order
    pub candidates: HashMap<String, Vec<StoredCandidate>>,
}

impl InboundSnapshot {
    /// Candidates from one sender, empty when none are stored
    pub fn candidates_from(&self, from: &str) -> &[StoredCandidate] {
        self.candidates.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pending description from one sender
    pub fn description_from(&self, from: &str) -> Option<&StoredDescription> {
        self.descriptions.get(from)
    }

    /// True when the record holds nothing inbound
    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty() && self.candidates.values().all(Vec::is_empty)
    }
}
