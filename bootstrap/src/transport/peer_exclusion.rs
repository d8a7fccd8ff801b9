#[cfg(test)]
use mock_instant::thread_local::Instant;
use rsban_core::utils::ContainerInfo;
#[cfg(not(test))]
use std::time::Instant;
use std::{
    collections::{BTreeMap, HashMap},
    net::{Ipv6Addr, SocketAddrV6},
    time::Duration,
};

/// Peers that misbehaved during bootstrap are excluded for a while.
/// Repeated misbehaviour extends the exclusion.
pub struct PeerExclusion {
    ordered_by_date: PeersOrderedByExclusionDate,
    by_ip: HashMap<Ipv6Addr, ExcludedPeer>,
    max_size: usize,
}

impl PeerExclusion {
    pub const ELEMENT_SIZE: usize = std::mem::size_of::<ExcludedPeer>();

    pub fn new() -> Self {
        Self::with_max_size(5000)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            ordered_by_date: PeersOrderedByExclusionDate::new(),
            by_ip: HashMap::new(),
            max_size,
        }
    }

    /// Returns the new score of the peer
    pub fn peer_misbehaved(&mut self, endpoint: &SocketAddrV6) -> u64 {
        if let Some(peer) = self.by_ip.get_mut(endpoint.ip()) {
            let old_end = peer.exclude_until;
            peer.misbehaved();
            if peer.exclude_until != old_end {
                let (ip, new_end) = (*peer.address.ip(), peer.exclude_until);
                self.ordered_by_date.remove(&ip, old_end);
                self.ordered_by_date.insert(ip, new_end);
            }
            peer.score
        } else {
            self.clean_old_peers();
            let peer = ExcludedPeer::new(*endpoint);
            let score = peer.score;
            self.ordered_by_date
                .insert(*peer.address.ip(), peer.exclude_until);
            self.by_ip.insert(*peer.address.ip(), peer);
            score
        }
    }

    pub fn score(&self, endpoint: &SocketAddrV6) -> u64 {
        self.by_ip
            .get(endpoint.ip())
            .map(|peer| peer.score)
            .unwrap_or_default()
    }

    pub fn contains(&self, endpoint: &SocketAddrV6) -> bool {
        self.by_ip.contains_key(endpoint.ip())
    }

    /// Checks if an endpoint is currently excluded. Expired entries are forgotten.
    pub fn is_excluded(&mut self, endpoint: &SocketAddrV6) -> bool {
        let Some(peer) = self.by_ip.get(endpoint.ip()).cloned() else {
            return false;
        };
        if peer.has_expired() {
            self.remove(&peer.address);
        }
        peer.is_excluded()
    }

    pub fn remove(&mut self, endpoint: &SocketAddrV6) {
        if let Some(peer) = self.by_ip.remove(endpoint.ip()) {
            self.ordered_by_date
                .remove(peer.address.ip(), peer.exclude_until);
        }
    }

    pub fn size(&self) -> usize {
        self.by_ip.len()
    }

    fn clean_old_peers(&mut self) {
        while self.by_ip.len() > 1 && self.by_ip.len() >= self.max_size {
            match self.ordered_by_date.pop() {
                Some(ip) => {
                    self.by_ip.remove(&ip);
                }
                None => break,
            }
        }
    }

    pub fn container_info(&self) -> ContainerInfo {
        [("peers", self.size(), Self::ELEMENT_SIZE)].into()
    }
}

impl Default for PeerExclusion {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct ExcludedPeer {
    exclude_until: Instant,
    address: SocketAddrV6,
    /// gets increased for each bad behaviour
    score: u64,
}

impl ExcludedPeer {
    fn new(address: SocketAddrV6) -> Self {
        Self {
            address,
            exclude_until: Instant::now() + EXCLUDE_TIME,
            score: 1,
        }
    }

    fn misbehaved(&mut self) {
        self.score += 1;
        let factor = if self.score <= SCORE_LIMIT {
            1
        } else {
            self.score as u32 * 2
        };
        self.exclude_until = Instant::now() + EXCLUDE_TIME * factor;
    }

    fn is_excluded(&self) -> bool {
        self.score >= SCORE_LIMIT && self.exclude_until > Instant::now()
    }

    fn has_expired(&self) -> bool {
        (self.exclude_until + EXCLUDE_REMOVE_TIME * self.score as u32) < Instant::now()
    }
}

struct PeersOrderedByExclusionDate(BTreeMap<Instant, Vec<Ipv6Addr>>);

impl PeersOrderedByExclusionDate {
    fn new() -> Self {
        Self(BTreeMap::new())
    }

    fn pop(&mut self) -> Option<Ipv6Addr> {
        let mut entry = self.0.first_entry()?;
        let ip = entry.get_mut().pop();
        if entry.get().is_empty() {
            entry.remove();
        }
        ip
    }

    fn insert(&mut self, ip: Ipv6Addr, exclude_until: Instant) {
        self.0.entry(exclude_until).or_default().push(ip);
    }

    fn remove(&mut self, ip: &Ipv6Addr, exclude_until: Instant) {
        if let Some(entries) = self.0.get_mut(&exclude_until) {
            entries.retain(|x| x != ip);
            if entries.is_empty() {
                self.0.remove(&exclude_until);
            }
        }
    }
}

/// When `SCORE_LIMIT` is reached then a peer will be excluded
const SCORE_LIMIT: u64 = 2;
const EXCLUDE_TIME: Duration = Duration::from_secs(60 * 60);
const EXCLUDE_REMOVE_TIME: Duration = Duration::from_secs(60 * 60 * 24);
