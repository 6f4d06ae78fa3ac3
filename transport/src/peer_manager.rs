//! Connection bookkeeping for the UDP transport
//!
//! Tracks which socket address belongs to which peer id, when each peer was last
//! heard from, and how many peers the room can hold. The host uses it for every
//! guest; a guest uses it for its single link to the host.

use log::info;
use shared::PeerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::frame::HOST_PEER_ID;

/// How long a peer may stay silent before it is considered gone.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// A remote endpoint we exchange datagrams with
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
    /// Last time we received any frame from this peer
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(id: PeerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages every live link of one transport
///
/// Ids are handed out in join order starting right after the host id, and never
/// reused within a session, so a late frame from a departed peer cannot be
/// mistaken for a newcomer.
pub struct PeerManager {
    peers: HashMap<PeerId, Peer>,
    next_peer_id: PeerId,
    max_peers: usize,
}

impl PeerManager {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_id: HOST_PEER_ID + 1,
            max_peers,
        }
    }

    /// Admits a new peer, returning `None` when the room is full.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Option<PeerId> {
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;

        info!("Peer {} joined from {}", peer_id, addr);
        self.peers.insert(peer_id, Peer::new(peer_id, addr));

        Some(peer_id)
    }

    /// Registers a peer whose id was assigned elsewhere (a guest's host link).
    pub fn insert_peer(&mut self, peer_id: PeerId, addr: SocketAddr) {
        self.peers.insert(peer_id, Peer::new(peer_id, addr));
    }

    pub fn remove_peer(&mut self, peer_id: &PeerId) -> bool {
        if let Some(peer) = self.peers.remove(peer_id) {
            info!("Peer {} left", peer.id);
            true
        } else {
            false
        }
    }

    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<PeerId> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, peer_id: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer_id).map(|peer| peer.addr)
    }

    /// Marks the peer as alive. Returns false for unknown ids.
    pub fn touch(&mut self, peer_id: PeerId) -> bool {
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    /// Removes and returns every peer silent for longer than `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PeerId> {
        let mut timed_out: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();
        timed_out.sort_unstable();

        for peer_id in &timed_out {
            self.remove_peer(peer_id);
        }

        timed_out
    }

    /// All (id, address) pairs, optionally leaving one peer out.
    pub fn peer_addrs(&self, exclude: Option<PeerId>) -> Vec<(PeerId, SocketAddr)> {
        let mut addrs: Vec<(PeerId, SocketAddr)> = self
            .peers
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, peer)| (*id, peer.addr))
            .collect();
        addrs.sort_unstable_by_key(|(id, _)| *id);
        addrs
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
