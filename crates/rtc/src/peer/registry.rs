//! Connection registry
//!
//! One live entry per peer id, with ordered teardown callbacks run on
//! release. The registry is an owned instance injected into the room
//! session, never process-global, so two sessions in one process can
//! reuse peer ids without interference.

use super::connection::PeerConnection;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cleanup callback invoked when an entry is released
pub type TeardownFn = Box<dyn FnOnce() + Send>;

struct Entry {
    connection: Arc<PeerConnection>,
    teardowns: Vec<TeardownFn>,
}

/// Registry of live peer connections for one room session
///
/// Mutation is guarded by a single registry-wide mutex with no await
/// inside the critical section. `release` detaches the entry under the
/// lock but runs its teardown callbacks after the lock is dropped, so
/// a re-entrant release from inside a callback observes an absent
/// entry and no-ops instead of deadlocking.
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    max_peers: u32,
}

impl ConnectionRegistry {
    /// Create a registry bounded to `max_peers` entries (1-16)
    pub fn new(max_peers: u32) -> Result<Self> {
        if max_peers == 0 || max_peers > 16 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-16, got {}",
                max_peers
            )));
        }

        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            max_peers,
        })
    }

    /// Look up the live connection for a peer; no side effects
    pub fn acquire(&self, peer_id: &str) -> Option<Arc<PeerConnection>> {
        self.entries.lock().get(peer_id).map(|e| e.connection.clone())
    }

    /// Insert an entry for a peer
    ///
    /// Returns `false` without touching existing state when the peer
    /// already has a live entry or the registry is full; callers check
    /// `acquire` first or accept idempotent reuse.
    pub fn register(
        &self,
        peer_id: &str,
        connection: Arc<PeerConnection>,
        teardowns: Vec<TeardownFn>,
    ) -> bool {
        let mut entries = self.entries.lock();

        if entries.contains_key(peer_id) {
            warn!("Peer {} already registered, keeping existing entry", peer_id);
            return false;
        }

        if entries.len() >= self.max_peers as usize {
            warn!(
                "Peer limit reached ({}), refusing to register {}",
                self.max_peers, peer_id
            );
            return false;
        }

        info!("Registering peer connection: {}", peer_id);
        entries.insert(
            peer_id.to_string(),
            Entry {
                connection,
                teardowns,
            },
        );
        true
    }

    /// Remove a peer's entry and run its teardown callbacks in
    /// registration order
    ///
    /// Safe to call when no entry exists (returns `None`).
    pub fn release(&self, peer_id: &str) -> Option<Arc<PeerConnection>> {
        let entry = self.entries.lock().remove(peer_id)?;

        debug!("Releasing peer connection: {}", peer_id);
        for teardown in entry.teardowns {
            teardown();
        }
        Some(entry.connection)
    }

    /// Remove every entry, running teardowns per entry, and return the
    /// detached connections for the caller to close
    pub fn release_all(&self) -> Vec<(String, Arc<PeerConnection>)> {
        let drained: Vec<(String, Entry)> = self.entries.lock().drain().collect();

        let mut connections = Vec::with_capacity(drained.len());
        for (peer_id, entry) in drained {
            debug!("Releasing peer connection: {}", peer_id);
            for teardown in entry.teardowns {
                teardown();
            }
            connections.push((peer_id, entry.connection));
        }
        connections
    }

    /// Ids of all peers with a live entry
    pub fn peer_ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no entries are live
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
