//! Peer connection lifecycle
//!
//! Connections are created and torn down by a [`RoomSession`], tracked
//! in a [`ConnectionRegistry`], and negotiated over the signaling
//! store.

pub mod connection;
pub mod registry;
pub mod session;

pub use connection::{ConnectionPhase, PeerConnection};
pub use registry::{ConnectionRegistry, TeardownFn};
pub use session::{RemoteTrackHandler, RoomSession};
