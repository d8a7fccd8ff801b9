use super::{PeerExclusion, PeerSource};
#[cfg(test)]
use mock_instant::thread_local::Instant;
use rsban_core::utils::ContainerInfo;
#[cfg(not(test))]
use std::time::Instant;
use std::{net::SocketAddrV6, sync::Mutex};

/// Known bootstrap peers. Hands out the peer that waited longest since its last bootstrap attempt.
pub struct BootstrapPeers {
    peers: Mutex<Vec<PeerEntry>>,
    excluded: Mutex<PeerExclusion>,
}

struct PeerEntry {
    endpoint: SocketAddrV6,
    last_bootstrap_attempt: Option<Instant>,
}

impl BootstrapPeers {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            excluded: Mutex::new(PeerExclusion::new()),
        }
    }

    pub fn with_peers(endpoints: impl IntoIterator<Item = SocketAddrV6>) -> Self {
        let peers = Self::new();
        for endpoint in endpoints {
            peers.add_peer(endpoint);
        }
        peers
    }

    pub fn add_peer(&self, endpoint: SocketAddrV6) {
        let mut peers = self.peers.lock().unwrap();
        if !peers.iter().any(|p| p.endpoint == endpoint) {
            peers.push(PeerEntry {
                endpoint,
                last_bootstrap_attempt: None,
            });
        }
    }

    pub fn remove_peer(&self, endpoint: &SocketAddrV6) {
        self.peers
            .lock()
            .unwrap()
            .retain(|p| p.endpoint != *endpoint);
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the new misbehaviour score of the peer
    pub fn peer_misbehaved(&self, endpoint: &SocketAddrV6) -> u64 {
        self.excluded.lock().unwrap().peer_misbehaved(endpoint)
    }

    pub fn container_info(&self) -> ContainerInfo {
        ContainerInfo::builder()
            .leaf(
                "peers",
                self.len(),
                std::mem::size_of::<PeerEntry>(),
            )
            .node("excluded", self.excluded.lock().unwrap().container_info())
            .finish()
    }
}

impl Default for BootstrapPeers {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerSource for BootstrapPeers {
    fn bootstrap_peer(&self) -> Option<SocketAddrV6> {
        let mut peers = self.peers.lock().unwrap();
        let mut excluded = self.excluded.lock().unwrap();
        let peer = peers
            .iter_mut()
            .filter(|p| !excluded.is_excluded(&p.endpoint))
            .min_by_key(|p| p.last_bootstrap_attempt)?;
        peer.last_bootstrap_attempt = Some(Instant::now());
        Some(peer.endpoint)
    }

    fn is_excluded(&self, endpoint: &SocketAddrV6) -> bool {
        self.excluded.lock().unwrap().is_excluded(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_endpoint;
    use mock_instant::thread_local::MockClock;
    use std::time::Duration;

    #[test]
    fn no_peers() {
        let peers = BootstrapPeers::new();
        assert_eq!(peers.bootstrap_peer(), None);
    }

    #[test]
    fn rotates_through_peers() {
        let peers = BootstrapPeers::with_peers([test_endpoint(1), test_endpoint(2)]);
        let first = peers.bootstrap_peer().unwrap();
        MockClock::advance(Duration::from_millis(10));
        let second = peers.bootstrap_peer().unwrap();
        MockClock::advance(Duration::from_millis(10));
        let third = peers.bootstrap_peer().unwrap();
        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn skips_excluded_peers() {
        let peers = BootstrapPeers::with_peers([test_endpoint(1), test_endpoint(2)]);
        peers.peer_misbehaved(&test_endpoint(1));
        peers.peer_misbehaved(&test_endpoint(1));
        assert!(peers.is_excluded(&test_endpoint(1)));
        for _ in 0..3 {
            assert_eq!(peers.bootstrap_peer(), Some(test_endpoint(2)));
        }
    }

    #[test]
    fn duplicates_are_ignored() {
        let peers = BootstrapPeers::with_peers([test_endpoint(1), test_endpoint(1)]);
        assert_eq!(peers.len(), 1);
        peers.remove_peer(&test_endpoint(1));
        assert!(peers.is_empty());
    }
}
