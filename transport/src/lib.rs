//! # UDP Room Transport
//!
//! Implements the `shared::Transport` contract over plain UDP so a kite match can
//! run across machines without any dedicated server. One participant hosts the
//! room and every guest links to it; the host relays guest traffic so each
//! participant observes the same mesh of peers the game expects.
//!
//! ## Topology
//!
//! The host binds a known address and always owns peer id 1. Guests send `Hello`,
//! receive `Welcome` with their assigned id, and from then on wrap every protocol
//! message in a `Relay` frame. A broadcast from a guest is delivered to the host
//! and forwarded to all other guests; a directed send is forwarded to its target.
//!
//! ## Liveness
//!
//! Every link exchanges a `Heartbeat` once per second. A peer that stays silent for
//! five seconds is dropped and reported as `PeerLeft`, exactly like an orderly
//! `Goodbye`. Guests retry an unanswered `Hello` a few times before reporting the
//! host as gone.
//!
//! ## Module Organization
//!
//! - `frame`: datagram layout and the bincode codec
//! - `peer_manager`: address and id bookkeeping, timeouts
//! - `udp`: the socket tasks and the `Transport` implementation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use shared::Transport;
//! use transport::UdpTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut guest = UdpTransport::guest("0.0.0.0:0").await?;
//!     guest.connect("192.168.1.20:7777")?;
//!
//!     // Drained by the game once per tick
//!     while let Some(event) = guest.poll_event() {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod frame;
pub mod peer_manager;
pub mod udp;

pub use frame::HOST_PEER_ID;
pub use udp::{Role, UdpTransport};
