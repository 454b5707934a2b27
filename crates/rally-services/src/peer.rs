//! Peer registry — the set of addresses currently discoverable through the relay.
//!
//! The registry is a plain owned structure. It is mutated only from the
//! gateway task, which serializes every event, so no locking happens here.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// How to reach the peer. The only identity key.
    pub address: String,
    /// Time of the most recent registration of this address.
    pub registered_at: SystemTime,
}

impl Peer {
    /// Registration time as seconds since the Unix epoch.
    pub fn registered_at_unix(&self) -> u64 {
        self.registered_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Outcome of [`PeerRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub peer: Peer,
    /// False when an existing entry was only refreshed.
    pub inserted: bool,
}

/// Address → peer map. Keys are unique and iteration is ordered by address,
/// so two snapshots of the same state list peers identically.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: BTreeMap<String, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `address`, or refresh its timestamp if already present.
    pub fn register(&mut self, address: &str) -> Registration {
        self.register_at(address, SystemTime::now())
    }

    pub fn register_at(&mut self, address: &str, at: SystemTime) -> Registration {
        let inserted = match self.peers.get_mut(address) {
            Some(existing) => {
                existing.registered_at = at;
                false
            }
            None => {
                self.peers.insert(
                    address.to_string(),
                    Peer {
                        address: address.to_string(),
                        registered_at: at,
                    },
                );
                true
            }
        };

        let peer = Peer {
            address: address.to_string(),
            registered_at: at,
        };
        Registration { peer, inserted }
    }

    /// Remove `address`. Returns whether anything was removed.
    pub fn deregister(&mut self, address: &str) -> bool {
        self.peers.remove(address).is_some()
    }

    /// Point-in-time copy of every registered peer.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.peers.values().cloned().collect()
    }

    /// Addresses only, in snapshot order.
    pub fn addresses(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
