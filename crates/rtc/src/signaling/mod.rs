//! Store-backed signaling
//!
//! Peers exchange descriptions and ICE candidates through per-user
//! records in a shared store instead of a dedicated signaling server.

pub mod channel;
pub mod protocol;
pub mod store;

pub use channel::{SignalingChannel, SnapshotHandler, Subscription};
pub use protocol::{
    CandidatePayload, DescriptionKind, InboundSnapshot, StoredCandidate, StoredDescription,
};
pub use store::{MemorySignalingStore, SignalingStore, WatchId};
