//! UDP implementation of [`Transport`] with the host acting as relay
//!
//! The host binds a socket and admits guests; every guest only ever talks to the
//! host. Guest broadcasts are fanned out by the host, and guest-to-guest sends are
//! forwarded, so the game sees a full mesh. Three background tasks run per
//! transport: a receiver, a sender draining the outgoing queue, and a once-a-second
//! heartbeat that also detects silent peers and retries an unanswered `Hello`.

use crate::frame::{decode, encode, Frame, HOST_PEER_ID, MAX_DATAGRAM, MAX_ROOM_PEERS, PROTOCOL_VERSION};
use crate::peer_manager::{PeerManager, PEER_TIMEOUT};
use log::{debug, error, info, warn};
use shared::{Message, PeerId, Transport, TransportError, TransportEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Hello retries before a guest gives up on an unresponsive host.
pub const MAX_HELLO_ATTEMPTS: u32 = 5;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// Requests from the game thread to the sender task
#[derive(Debug)]
enum Outgoing {
    Broadcast(Message),
    SendTo(PeerId, Message),
    Hello(SocketAddr),
}

/// Work produced by the pure frame handlers, carried out by the tasks
#[derive(Debug, PartialEq)]
enum Action {
    Send(Frame, SocketAddr),
    Emit(TransportEvent),
}

/// Link state shared by the background tasks
struct LinkState {
    role: Role,
    local_id: Option<PeerId>,
    peers: PeerManager,
    host_id: Option<PeerId>,
    host_addr: Option<SocketAddr>,
    welcomed: bool,
    hello_attempts: u32,
}

impl LinkState {
    fn new(role: Role, max_peers: usize) -> Self {
        let (local_id, host_id) = match role {
            Role::Host => (Some(HOST_PEER_ID), Some(HOST_PEER_ID)),
            Role::Guest => (None, None),
        };
        Self {
            role,
            local_id,
            peers: PeerManager::new(max_peers),
            host_id,
            host_addr: None,
            welcomed: false,
            hello_attempts: 0,
        }
    }

    fn forget_host(&mut self) {
        self.welcomed = false;
        self.host_addr = None;
    }

    fn handle_frame(&mut self, frame: Frame, addr: SocketAddr) -> Vec<Action> {
        match self.role {
            Role::Host => self.handle_guest_frame(frame, addr),
            Role::Guest => self.handle_host_frame(frame, addr),
        }
    }

    /// Host side: a frame arrived from a guest (or a would-be guest)
    fn handle_guest_frame(&mut self, frame: Frame, addr: SocketAddr) -> Vec<Action> {
        match frame {
            Frame::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    warn!("Rejecting {} with protocol version {}", addr, version);
                    return vec![Action::Send(
                        Frame::Rejected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    )];
                }

                // Retried hello from someone already admitted
                if let Some(peer_id) = self.peers.find_peer_by_addr(addr) {
                    self.peers.touch(peer_id);
                    return vec![Action::Send(
                        Frame::Welcome {
                            peer_id,
                            host_id: HOST_PEER_ID,
                        },
                        addr,
                    )];
                }

                match self.peers.add_peer(addr) {
                    Some(peer_id) => vec![
                        Action::Send(
                            Frame::Welcome {
                                peer_id,
                                host_id: HOST_PEER_ID,
                            },
                            addr,
                        ),
                        Action::Emit(TransportEvent::PeerJoined { peer_id }),
                    ],
                    None => vec![Action::Send(
                        Frame::Rejected {
                            reason: "Room full".to_string(),
                        },
                        addr,
                    )],
                }
            }

            Frame::Relay { to, payload, .. } => {
                let Some(from) = self.peers.find_peer_by_addr(addr) else {
                    debug!("Ignoring relay from unknown address {}", addr);
                    return Vec::new();
                };
                self.peers.touch(from);

                match to {
                    None => {
                        let mut actions: Vec<Action> = self
                            .peers
                            .peer_addrs(Some(from))
                            .into_iter()
                            .map(|(_, peer_addr)| {
                                Action::Send(
                                    Frame::Relay {
                                        from,
                                        to: None,
                                        payload: payload.clone(),
                                    },
                                    peer_addr,
                                )
                            })
                            .collect();
                        actions.push(Action::Emit(TransportEvent::Data {
                            from,
                            message: payload,
                        }));
                        actions
                    }
                    Some(HOST_PEER_ID) => vec![Action::Emit(TransportEvent::Data {
                        from,
                        message: payload,
                    })],
                    Some(target) => match self.peers.addr_of(target) {
                        Some(target_addr) => vec![Action::Send(
                            Frame::Relay {
                                from,
                                to: Some(target),
                                payload,
                            },
                            target_addr,
                        )],
                        None => {
                            debug!("Dropping {} for departed peer {}", payload.kind(), target);
                            Vec::new()
                        }
                    },
                }
            }

            Frame::Heartbeat => {
                if let Some(peer_id) = self.peers.find_peer_by_addr(addr) {
                    self.peers.touch(peer_id);
                }
                Vec::new()
            }

            Frame::Goodbye => match self.peers.find_peer_by_addr(addr) {
                Some(peer_id) => {
                    self.peers.remove_peer(&peer_id);
                    self.departure(peer_id)
                }
                None => Vec::new(),
            },

            other => {
                warn!("Unexpected frame from guest at {}: {:?}", addr, other);
                Vec::new()
            }
        }
    }

    /// Guest side: a frame arrived, hopefully from our host
    fn handle_host_frame(&mut self, frame: Frame, addr: SocketAddr) -> Vec<Action> {
        let from_host = self.host_addr == Some(addr);
        if !from_host {
            debug!("Ignoring frame from {} which is not our host", addr);
            return Vec::new();
        }

        match frame {
            Frame::Welcome { peer_id, host_id } => {
                if self.welcomed {
                    return Vec::new();
                }
                info!("Joined room as peer {}", peer_id);
                self.welcomed = true;
                self.local_id = Some(peer_id);
                self.host_id = Some(host_id);
                self.peers.insert_peer(host_id, addr);
                vec![
                    Action::Emit(TransportEvent::Connected { self_id: peer_id }),
                    Action::Emit(TransportEvent::PeerJoined { peer_id: host_id }),
                ]
            }

            Frame::Rejected { reason } => {
                warn!("Host at {} rejected us: {}", addr, reason);
                self.forget_host();
                vec![Action::Emit(TransportEvent::PeerLeft {
                    peer_id: self.host_id.unwrap_or(HOST_PEER_ID),
                })]
            }

            Frame::Relay { from, payload, .. } => {
                if let Some(host_id) = self.host_id {
                    self.peers.touch(host_id);
                }
                vec![Action::Emit(TransportEvent::Data {
                    from,
                    message: payload,
                })]
            }

            Frame::Left { peer_id } => vec![Action::Emit(TransportEvent::PeerLeft { peer_id })],

            Frame::Heartbeat => {
                if let Some(host_id) = self.host_id {
                    self.peers.touch(host_id);
                }
                Vec::new()
            }

            Frame::Goodbye => {
                let host_id = self.host_id.unwrap_or(HOST_PEER_ID);
                self.peers.remove_peer(&host_id);
                self.forget_host();
                vec![Action::Emit(TransportEvent::PeerLeft { peer_id: host_id })]
            }

            other => {
                warn!("Unexpected frame from host: {:?}", other);
                Vec::new()
            }
        }
    }

    /// Host side: tells the room someone is gone and reports it locally
    fn departure(&self, peer_id: PeerId) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .peers
            .peer_addrs(Some(peer_id))
            .into_iter()
            .map(|(_, addr)| Action::Send(Frame::Left { peer_id }, addr))
            .collect();
        actions.push(Action::Emit(TransportEvent::PeerLeft { peer_id }));
        actions
    }

    fn route(&mut self, outgoing: Outgoing) -> Vec<Action> {
        match outgoing {
            Outgoing::Hello(addr) => {
                self.host_addr = Some(addr);
                self.hello_attempts = 1;
                vec![Action::Send(
                    Frame::Hello {
                        version: PROTOCOL_VERSION,
                    },
                    addr,
                )]
            }

            Outgoing::Broadcast(message) => match self.role {
                Role::Host => self
                    .peers
                    .peer_addrs(None)
                    .into_iter()
                    .map(|(_, addr)| {
                        Action::Send(
                            Frame::Relay {
                                from: HOST_PEER_ID,
                                to: None,
                                payload: message.clone(),
                            },
                            addr,
                        )
                    })
                    .collect(),
                Role::Guest => self.via_host(None, message),
            },

            Outgoing::SendTo(peer_id, message) => match self.role {
                Role::Host => match self.peers.addr_of(peer_id) {
                    Some(addr) => vec![Action::Send(
                        Frame::Relay {
                            from: HOST_PEER_ID,
                            to: Some(peer_id),
                            payload: message,
                        },
                        addr,
                    )],
                    None => {
                        debug!("Dropping {} for unknown peer {}", message.kind(), peer_id);
                        Vec::new()
                    }
                },
                Role::Guest => self.via_host(Some(peer_id), message),
            },
        }
    }

    fn via_host(&self, to: Option<PeerId>, message: Message) -> Vec<Action> {
        let host_addr = self.host_id.and_then(|id| self.peers.addr_of(id));
        match (self.welcomed, self.local_id, host_addr) {
            (true, Some(from), Some(addr)) => vec![Action::Send(
                Frame::Relay {
                    from,
                    to,
                    payload: message,
                },
                addr,
            )],
            _ => {
                debug!("Not connected yet, dropping {}", message.kind());
                Vec::new()
            }
        }
    }

    fn heartbeat(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        for peer_id in self.peers.check_timeouts(PEER_TIMEOUT) {
            warn!("Peer {} timed out", peer_id);
            match self.role {
                Role::Host => actions.extend(self.departure(peer_id)),
                Role::Guest => {
                    self.forget_host();
                    actions.push(Action::Emit(TransportEvent::PeerLeft { peer_id }));
                }
            }
        }

        if self.role == Role::Guest && !self.welcomed {
            if let Some(addr) = self.host_addr {
                if self.hello_attempts >= MAX_HELLO_ATTEMPTS {
                    warn!("No answer from host at {}, giving up", addr);
                    self.forget_host();
                    actions.push(Action::Emit(TransportEvent::PeerLeft {
                        peer_id: HOST_PEER_ID,
                    }));
                } else {
                    self.hello_attempts += 1;
                    actions.push(Action::Send(
                        Frame::Hello {
                            version: PROTOCOL_VERSION,
                        },
                        addr,
                    ));
                }
            }
        }

        for (_, addr) in self.peers.peer_addrs(None) {
            actions.push(Action::Send(Frame::Heartbeat, addr));
        }

        actions
    }
}

/// Caps a requested room size so a full roster still fits one datagram.
fn room_size(requested: usize) -> usize {
    if requested > MAX_ROOM_PEERS {
        warn!("Room of {} guests requested, capping at {}", requested, MAX_ROOM_PEERS);
    }
    requested.clamp(1, MAX_ROOM_PEERS)
}

async fn execute(
    socket: &UdpSocket,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
    actions: Vec<Action>,
) {
    for action in actions {
        match action {
            Action::Send(frame, addr) => match encode(&frame) {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, addr).await {
                        error!("Failed to send frame to {}: {}", addr, e);
                    }
                }
                Err(e) => error!("Failed to encode frame: {}", e),
            },
            Action::Emit(event) => {
                if event_tx.send(event).is_err() {
                    debug!("Transport handle dropped, discarding event");
                }
            }
        }
    }
}

/// Host-relayed UDP transport
pub struct UdpTransport {
    role: Role,
    local_id: Option<PeerId>,
    local_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    state: Arc<RwLock<LinkState>>,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpTransport {
    /// Opens a room on `bind`. Must be called from within a tokio runtime.
    pub async fn host(bind: &str, max_peers: usize) -> Result<Self, TransportError> {
        Self::start(bind, Role::Host, room_size(max_peers)).await
    }

    /// Binds a guest socket; call [`Transport::connect`] with the host address next.
    pub async fn guest(bind: &str) -> Result<Self, TransportError> {
        Self::start(bind, Role::Guest, 1).await
    }

    async fn start(bind: &str, role: Role, max_peers: usize) -> Result<Self, TransportError> {
        let socket = Arc::new(UdpSocket::bind(bind).await?);
        let local_addr = socket.local_addr()?;
        info!("{:?} transport listening on {}", role, local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(LinkState::new(role, max_peers)));

        if role == Role::Host {
            let _ = event_tx.send(TransportEvent::Connected {
                self_id: HOST_PEER_ID,
            });
        }

        let tasks = vec![
            Self::spawn_receiver(Arc::clone(&socket), Arc::clone(&state), event_tx.clone()),
            Self::spawn_sender(Arc::clone(&socket), Arc::clone(&state), event_tx.clone(), outgoing_rx),
            Self::spawn_heartbeat(Arc::clone(&socket), Arc::clone(&state), event_tx),
        ];

        Ok(Self {
            role,
            local_id: None,
            local_addr,
            socket,
            state,
            event_rx,
            outgoing_tx,
            tasks,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that continuously listens for incoming frames
    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        state: Arc<RwLock<LinkState>>,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(frame) => {
                            let actions = state.write().await.handle_frame(frame, addr);
                            execute(&socket, &event_tx, actions).await;
                        }
                        Err(e) => warn!("Dropping malformed frame from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving frame: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that processes the outgoing queue
    fn spawn_sender(
        socket: Arc<UdpSocket>,
        state: Arc<RwLock<LinkState>>,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
        mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(outgoing) = outgoing_rx.recv().await {
                let actions = state.write().await.route(outgoing);
                execute(&socket, &event_tx, actions).await;
            }
        })
    }

    /// Spawns task that keeps links alive and drops silent peers
    fn spawn_heartbeat(
        socket: Arc<UdpSocket>,
        state: Arc<RwLock<LinkState>>,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);

            loop {
                interval.tick().await;
                let actions = state.write().await.heartbeat();
                execute(&socket, &event_tx, actions).await;
            }
        })
    }

    /// Says goodbye to every linked peer and stops the background tasks.
    pub async fn shutdown(mut self) {
        let addrs = self.state.read().await.peers.peer_addrs(None);
        for (peer_id, addr) in addrs {
            if let Ok(bytes) = encode(&Frame::Goodbye) {
                if let Err(e) = self.socket.send_to(&bytes, addr).await {
                    warn!("Failed to say goodbye to peer {}: {}", peer_id, e);
                }
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn queue(&self, outgoing: Outgoing) {
        if self.outgoing_tx.send(outgoing).is_err() {
            error!("Transport sender task has stopped");
        }
    }
}

impl Transport for UdpTransport {
    fn connect(&mut self, target: &str) -> Result<(), TransportError> {
        if self.role != Role::Guest {
            return Err(TransportError::NotAGuest);
        }
        let addr: SocketAddr = target
            .parse()
            .map_err(|_| TransportError::InvalidAddress(target.to_string()))?;

        info!("Connecting to host at {}", addr);
        self.outgoing_tx
            .send(Outgoing::Hello(addr))
            .map_err(|_| TransportError::Closed)
    }

    fn broadcast(&mut self, message: Message) {
        self.queue(Outgoing::Broadcast(message));
    }

    fn send_to(&mut self, peer_id: PeerId, message: Message) {
        self.queue(Outgoing::SendTo(peer_id, message));
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let event = self.event_rx.try_recv().ok()?;
        if let TransportEvent::Connected { self_id } = event {
            self.local_id = Some(self_id);
        }
        Some(event)
    }

    fn local_id(&self) -> Option<PeerId> {
        self.local_id
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
