//! Registry of live sessions
//!
//! One registry is created by the [`Listener`](super::Listener) and shared by
//! reference with every session it spawns. Sessions add themselves on accept
//! and remove themselves on teardown; nothing else mutates the map.
//!
//! All operations take the same lock. [`SessionRegistry::broadcast_toggle`]
//! and [`SessionRegistry::stop_all`] work on a snapshot taken under the lock
//! and call into sessions after releasing it, so a session tearing down
//! concurrently never deadlocks against the broadcast.

use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Operations the registry and control surface invoke on a live session
pub trait SessionControl: Send + Sync {
    /// Remote address, the session's identity key
    fn peer(&self) -> SocketAddr;

    /// Flip the status flag and return the new value rendered for logs
    fn toggle(&self) -> String;

    /// Close the connection so the session's blocking call fails and it
    /// tears itself down
    fn stop(&self);
}

/// Thread-safe set of live sessions keyed by peer address
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<BTreeMap<SocketAddr, Arc<dyn SessionControl>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session
    ///
    /// Returns `false` (and leaves the registry unchanged) if a session with
    /// the same peer address is already registered.
    pub fn add(&self, session: Arc<dyn SessionControl>) -> bool {
        let peer = session.peer();
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&peer) {
            warn!("Session {} already registered", peer);
            return false;
        }
        sessions.insert(peer, session);
        true
    }

    /// Unregister a session; removing an unknown peer is a no-op
    pub fn remove(&self, peer: &SocketAddr) -> bool {
        let removed = self.sessions.lock().remove(peer).is_some();
        if !removed {
            debug!("Session {} not registered, nothing to remove", peer);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn contains(&self, peer: &SocketAddr) -> bool {
        self.sessions.lock().contains_key(peer)
    }

    /// Registered peers in address order
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.sessions.lock().keys().copied().collect()
    }

    /// Diagnostic line: `Total clients: 2 [10.0.0.5:40112] [10.0.0.7:51002]`
    pub fn describe(&self) -> String {
        let sessions = self.sessions.lock();
        let mut out = format!("Total clients: {}", sessions.len());
        for peer in sessions.keys() {
            out.push_str(&format!(" [{}]", peer));
        }
        out
    }

    /// Toggle the status of every live session; returns how many were toggled
    pub fn broadcast_toggle(&self) -> usize {
        let snapshot = self.snapshot();
        for session in &snapshot {
            session.toggle();
        }
        snapshot.len()
    }

    /// Ask every live session to stop; returns how many were asked
    pub fn stop_all(&self) -> usize {
        let snapshot = self.snapshot();
        for session in &snapshot {
            session.stop();
        }
        snapshot.len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn SessionControl>> {
        self.sessions.lock().values().cloned().collect()
    }
}
