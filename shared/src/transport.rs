//! Peer-to-peer channel contract consumed by the game.
//!
//! A transport delivers typed [`TransportEvent`]s into a queue that the game polls
//! once per tick, so all match state is mutated from a single thread of control.
//! Delivery is assumed reliable and in order per connection, nothing more.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use thiserror::Error;

use crate::protocol::{Message, PeerId};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Our own id is known; the transport is usable.
    Connected { self_id: PeerId },
    PeerJoined { peer_id: PeerId },
    /// A peer went away, or a connection attempt failed for good.
    PeerLeft { peer_id: PeerId },
    Data { from: PeerId, message: Message },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("no peer reachable at '{0}'")]
    UnknownTarget(String),

    #[error("failed to encode frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {size} bytes exceeds the {limit} byte datagram limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("only guests can connect to a host")]
    NotAGuest,

    #[error("transport has shut down")]
    Closed,
}

pub trait Transport {
    /// Opens a connection to `target`. Completion is reported through events.
    fn connect(&mut self, target: &str) -> Result<(), TransportError>;

    fn broadcast(&mut self, message: Message);

    fn send_to(&mut self, peer_id: PeerId, message: Message);

    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn local_id(&self) -> Option<PeerId>;
}

/// Transport for single-player sessions: never connects, drops everything sent.
#[derive(Debug, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn connect(&mut self, target: &str) -> Result<(), TransportError> {
        Err(TransportError::UnknownTarget(target.to_string()))
    }

    fn broadcast(&mut self, _message: Message) {}

    fn send_to(&mut self, _peer_id: PeerId, _message: Message) {}

    fn poll_event(&mut self) -> Option<TransportEvent> {
        None
    }

    fn local_id(&self) -> Option<PeerId> {
        None
    }
}

#[derive(Debug, Default)]
struct Endpoint {
    address: String,
    inbox: VecDeque<TransportEvent>,
    links: BTreeSet<PeerId>,
}

#[derive(Debug, Default)]
struct HubState {
    endpoints: HashMap<PeerId, Endpoint>,
    addresses: HashMap<String, PeerId>,
    next_id: PeerId,
}

impl HubState {
    fn push(&mut self, to: PeerId, event: TransportEvent) {
        if let Some(endpoint) = self.endpoints.get_mut(&to) {
            endpoint.inbox.push_back(event);
        }
    }

    fn link(&mut self, a: PeerId, b: PeerId) {
        let newly_linked = match self.endpoints.get_mut(&a) {
            Some(endpoint) => endpoint.links.insert(b),
            None => false,
        };
        if let Some(endpoint) = self.endpoints.get_mut(&b) {
            endpoint.links.insert(a);
        }
        if newly_linked {
            self.push(a, TransportEvent::PeerJoined { peer_id: b });
            self.push(b, TransportEvent::PeerJoined { peer_id: a });
        }
    }
}

/// In-process mesh network. Every endpoint created from the same hub can reach
/// the others by address; messages pass through the bincode codec on the way.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                next_id: 1,
                ..Default::default()
            })),
        }
    }

    /// Registers a new endpoint reachable at `address`.
    pub fn endpoint(&self, address: &str) -> MemoryTransport {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;

        let mut endpoint = Endpoint {
            address: address.to_string(),
            ..Default::default()
        };
        endpoint.inbox.push_back(TransportEvent::Connected { self_id: id });
        state.endpoints.insert(id, endpoint);
        state.addresses.insert(address.to_string(), id);

        MemoryTransport {
            id,
            state: Arc::clone(&self.state),
            closed: false,
        }
    }
}

fn lock(state: &Arc<Mutex<HubState>>) -> MutexGuard<'_, HubState> {
    // A panic while holding the lock cannot leave the queues half-written.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn through_codec(message: &Message) -> Option<Message> {
    match bincode::serialize(message).and_then(|bytes| bincode::deserialize(&bytes)) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Dropping {} that failed the codec: {}", message.kind(), e);
            None
        }
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    id: PeerId,
    state: Arc<Mutex<HubState>>,
    closed: bool,
}

impl MemoryTransport {
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Leaves the mesh; every linked peer sees a `PeerLeft`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut state = lock(&self.state);
        let links = match state.endpoints.get_mut(&self.id) {
            Some(endpoint) => std::mem::take(&mut endpoint.links),
            None => BTreeSet::new(),
        };
        for peer in links {
            if let Some(endpoint) = state.endpoints.get_mut(&peer) {
                endpoint.links.remove(&self.id);
            }
            state.push(peer, TransportEvent::PeerLeft { peer_id: self.id });
        }
        if let Some(endpoint) = state.endpoints.remove(&self.id) {
            state.addresses.remove(&endpoint.address);
        }
        info!("Memory endpoint {} closed", self.id);
    }
}

impl Transport for MemoryTransport {
    /// Joins `target` and everyone already linked to it, target first.
    fn connect(&mut self, target: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let mut state = lock(&self.state);
        let target_id = *state
            .addresses
            .get(target)
            .ok_or_else(|| TransportError::UnknownTarget(target.to_string()))?;

        let others: Vec<PeerId> = state
            .endpoints
            .get(&target_id)
            .map(|endpoint| endpoint.links.iter().copied().collect())
            .unwrap_or_default();

        state.link(self.id, target_id);
        for other in others {
            if other != self.id {
                state.link(self.id, other);
            }
        }
        Ok(())
    }

    fn broadcast(&mut self, message: Message) {
        if self.closed {
            return;
        }
        let Some(message) = through_codec(&message) else {
            return;
        };

        let mut state = lock(&self.state);
        let links: Vec<PeerId> = state
            .endpoints
            .get(&self.id)
            .map(|endpoint| endpoint.links.iter().copied().collect())
            .unwrap_or_default();
        for peer in links {
            state.push(
                peer,
                TransportEvent::Data {
                    from: self.id,
                    message: message.clone(),
                },
            );
        }
    }

    fn send_to(&mut self, peer_id: PeerId, message: Message) {
        if self.closed {
            return;
        }
        let mut state = lock(&self.state);
        let linked = state
            .endpoints
            .get(&self.id)
            .map_or(false, |endpoint| endpoint.links.contains(&peer_id));
        if !linked {
            debug!("Dropping {} for unlinked peer {}", message.kind(), peer_id);
            return;
        }
        if let Some(message) = through_codec(&message) {
            state.push(peer_id, TransportEvent::Data { from: self.id, message });
        }
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let mut state = lock(&self.state);
        state.endpoints.get_mut(&self.id)?.inbox.pop_front()
    }

    fn local_id(&self) -> Option<PeerId> {
        (!self.closed).then_some(self.id)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}
