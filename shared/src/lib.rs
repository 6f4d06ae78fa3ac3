//! Simulation model and wire contract shared by every participant of a kite match.
//!
//! Everything here is deterministic given its inputs: the per-tick kite and bird
//! rules, the cut test between two kites, and the typed messages peers exchange.
//! The `transport` module defines the channel abstraction the game drains once per
//! tick, plus an in-memory implementation used for local play and tests.

use serde::{Deserialize, Serialize};

pub mod collision;
pub mod kite;
pub mod protocol;
pub mod transport;

pub use collision::{body_crosses_string, resolve_cut, CutOutcome};
pub use kite::{AmbientKite, Bird, Controls, Environment, Kite, PlayerKite, Tail};
pub use protocol::{
    is_hex_color, KiteUpdate, Message, PeerId, PlayerProfile, ResultEntry, RosterEntry, MAX_NAME_BYTES,
    MAX_SECRET_BYTES,
};
pub use transport::{MemoryHub, MemoryTransport, OfflineTransport, Transport, TransportError, TransportEvent};

pub const FIELD_WIDTH: f32 = 240.0;
pub const FIELD_HEIGHT: f32 = 135.0;

pub const TAIL_LENGTH: usize = 5;
pub const TAIL_SPACING: f32 = 2.0;
/// Distance below the kite body where the string attaches.
pub const TAIL_ATTACH_OFFSET: f32 = 4.0;

/// 8 pixel cutting radius, squared.
pub const CUT_RADIUS_SQUARED: f32 = 64.0;

pub const MAX_LIVES: u8 = 3;

pub const TIME_STEP: f32 = 0.05;
pub const BASE_WIND_X: f32 = 0.5;
pub const BASE_WIND_Y: f32 = -0.2;
pub const WIND_GUST: f32 = 0.3;

pub const AMBIENT_WIND_FACTOR: f32 = 0.05;
pub const AMBIENT_DRAG: f32 = 0.95;
pub const AMBIENT_SWAY: f32 = 0.3;
pub const AMBIENT_TAIL_FOLLOW: f32 = 0.2;
pub const AMBIENT_DEATH_Y: f32 = -50.0;

pub const PLAYER_THRUST: f32 = 0.15;
pub const PLAYER_REEL: f32 = 0.1;
pub const PLAYER_STEER: f32 = 0.15;
pub const PLAYER_DAMPING: f32 = 0.96;
pub const PLAYER_WIND_FACTOR: f32 = 0.02;
pub const PLAYER_GRAVITY: f32 = 0.02;
pub const PLAYER_TAIL_FOLLOW: f32 = 0.4;
pub const PLAYER_MARGIN: f32 = 10.0;
pub const PLAYER_FLOOR_MARGIN: f32 = 20.0;

/// Vertical velocity given to a kite that has just been cut.
pub const CUT_KICK_VY: f32 = 2.0;

/// A point or direction in field space. Positive y points down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Moves this point a fraction of the way towards `target`.
    pub fn approach(&mut self, target: Vec2, factor: f32) {
        self.x += (target.x - self.x) * factor;
        self.y += (target.y - self.y) * factor;
    }
}

/// Size of the play field. The origin is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(FIELD_WIDTH, FIELD_HEIGHT)
    }
}
