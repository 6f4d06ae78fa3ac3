//! Per-tick update rules for kites and birds.
//!
//! Every kite shares the same body plus tail-chain component ([`Kite`]). What
//! differs is the behaviour driving the body: [`AmbientKite`] drifts with the wind
//! on its own, while [`PlayerKite`] is steered by [`Controls`] when it is ours, or
//! placed by network snapshots when it belongs to a peer.

use rand::Rng;

use crate::protocol::{PeerId, PlayerProfile};
use crate::{
    Bounds, Vec2, AMBIENT_DEATH_Y, AMBIENT_DRAG, AMBIENT_SWAY, AMBIENT_TAIL_FOLLOW,
    AMBIENT_WIND_FACTOR, BASE_WIND_X, BASE_WIND_Y, MAX_LIVES, PLAYER_DAMPING,
    PLAYER_FLOOR_MARGIN, PLAYER_GRAVITY, PLAYER_MARGIN, PLAYER_REEL, PLAYER_STEER,
    PLAYER_TAIL_FOLLOW, PLAYER_THRUST, PLAYER_WIND_FACTOR, TAIL_ATTACH_OFFSET, TAIL_LENGTH,
    TAIL_SPACING, TIME_STEP, WIND_GUST,
};

const AMBIENT_TAIL_DRAG: f32 = 0.5;
const AMBIENT_TAIL_DRAG_STEP: f32 = 0.1;
const PLAYER_TAIL_DRAG: f32 = 0.2;
const PLAYER_TAIL_DRAG_STEP: f32 = 0.05;

/// How far past the bottom edge a falling kite travels before it is dropped.
const OFF_FIELD_MARGIN: f32 = 50.0;

pub const REMOTE_KITE_COLOR: &str = "#ffffff";

/// Global simulation context every entity update reads from.
#[derive(Debug, Clone)]
pub struct Environment {
    pub wind: Vec2,
    /// Monotonic simulation clock, advanced once per tick.
    pub time: f32,
    pub bounds: Bounds,
}

impl Environment {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            wind: Vec2::new(BASE_WIND_X, BASE_WIND_Y),
            time: 0.0,
            bounds,
        }
    }

    /// Steps the clock and the gusting wind.
    pub fn advance(&mut self) {
        self.time += TIME_STEP;
        self.wind.x = BASE_WIND_X + (self.time * 0.1).sin() * WIND_GUST;
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Bounds::default())
    }
}

/// Fixed-length string of nodes trailing a kite body.
///
/// Each node relaxes towards the node in front of it (the first one towards the
/// attachment point under the body), then gets pushed back by the wind. The result
/// is a cheap inverse-kinematics chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Tail {
    nodes: [Vec2; TAIL_LENGTH],
}

impl Tail {
    /// A string hanging straight down from `body`.
    pub fn new(body: Vec2) -> Self {
        let mut nodes = [body; TAIL_LENGTH];
        for (i, node) in nodes.iter_mut().enumerate() {
            node.y = body.y + i as f32 * TAIL_SPACING;
        }
        Self { nodes }
    }

    /// One relaxation pass. `factor` is how far each node closes on its target
    /// per tick; wind drag grows by `drag_step` with every node down the string.
    pub fn follow(&mut self, body: Vec2, factor: f32, wind_x: f32, drag: f32, drag_step: f32) {
        let mut target = Vec2::new(body.x, body.y + TAIL_ATTACH_OFFSET);
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.approach(target, factor);
            node.x -= wind_x * (drag + i as f32 * drag_step);
            target = *node;
        }
    }

    pub fn nodes(&self) -> &[Vec2] {
        &self.nodes
    }

    /// Nodes that can be cut. The final node is the anchor held by the flyer.
    pub fn cuttable_nodes(&self) -> &[Vec2] {
        &self.nodes[..TAIL_LENGTH - 1]
    }

    /// Where the flyer holds the string.
    pub fn anchor(&self) -> Vec2 {
        self.nodes[TAIL_LENGTH - 1]
    }
}

/// Body and string shared by every kite variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Kite {
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: String,
    pub tail: Tail,
    /// True while the kite is out of play.
    pub dead: bool,
    /// Locally simulated background kite, as opposed to a player's kite.
    pub is_ai: bool,
}

impl Kite {
    /// A player kite at rest with its string hanging below it.
    pub fn new(position: Vec2, color: impl Into<String>) -> Self {
        Self {
            position,
            velocity: Vec2::default(),
            color: color.into(),
            tail: Tail::new(position),
            dead: false,
            is_ai: false,
        }
    }
}

/// Background kite drifting up through the field.
#[derive(Debug, Clone)]
pub struct AmbientKite {
    pub kite: Kite,
    pub sway_offset: f32,
}

impl AmbientKite {
    pub fn new(position: Vec2, velocity: Vec2, color: impl Into<String>, sway_offset: f32) -> Self {
        let mut kite = Kite::new(position, color);
        kite.velocity = velocity;
        kite.is_ai = true;
        Self { kite, sway_offset }
    }

    /// Spawns a kite somewhere along the bottom band of the field.
    pub fn spawn<R: Rng>(rng: &mut R, bounds: Bounds, color: &str) -> Self {
        let position = Vec2::new(rng.gen::<f32>() * bounds.width, 100.0 + rng.gen::<f32>() * 50.0);
        let velocity = Vec2::new((rng.gen::<f32>() - 0.5) * 0.5, -0.5 - rng.gen::<f32>() * 0.5);
        Self::new(position, velocity, color, rng.gen::<f32>() * 100.0)
    }

    /// Drifts on its own velocity and the wind. Past the top of the field it
    /// counts as dead.
    pub fn update(&mut self, env: &Environment) {
        let kite = &mut self.kite;

        kite.velocity.x += env.wind.x * AMBIENT_WIND_FACTOR;
        kite.velocity.x *= AMBIENT_DRAG;

        kite.position.x += kite.velocity.x;
        kite.position.y += kite.velocity.y;
        kite.position.x += (env.time * 0.2 + self.sway_offset).sin() * AMBIENT_SWAY;

        kite.tail.follow(
            kite.position,
            AMBIENT_TAIL_FOLLOW,
            env.wind.x,
            AMBIENT_TAIL_DRAG,
            AMBIENT_TAIL_DRAG_STEP,
        );

        if kite.position.y < AMBIENT_DEATH_Y {
            kite.dead = true;
        }
    }

    /// True once the kite has left the field for good and can be dropped.
    pub fn is_off_bounds(&self, bounds: Bounds) -> bool {
        let y = self.kite.position.y;
        y < AMBIENT_DEATH_Y || y > bounds.height + OFF_FIELD_MARGIN
    }
}

/// Four binary steering inputs for a player kite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub thrust: bool,
    pub reel: bool,
    pub left: bool,
    pub right: bool,
}

/// A participant's kite: either ours, or a peer's as last reported over the network.
#[derive(Debug, Clone)]
pub struct PlayerKite {
    pub kite: Kite,
    pub name: String,
    /// Revealed to everyone when this player is eliminated.
    pub secret: String,
    pub score: u32,
    pub lives: u8,
    /// Frames of spawn protection left.
    pub invulnerable: u32,
    /// Owning connection, `None` for our own kite.
    pub peer_id: Option<PeerId>,
}

impl PlayerKite {
    /// Our own kite with full lives, launched climbing.
    pub fn new_local(position: Vec2, profile: &PlayerProfile, invulnerable: u32) -> Self {
        let mut kite = Kite::new(position, profile.color.clone());
        kite.velocity = Vec2::new(0.0, -1.0);
        Self {
            kite,
            name: profile.name.clone(),
            secret: profile.secret.clone(),
            score: 0,
            lives: MAX_LIVES,
            invulnerable,
            peer_id: None,
        }
    }

    /// A peer's kite on first contact. Without a roster profile yet it is drawn
    /// in the neutral remote color and unnamed until `reconcile` fills it in.
    pub fn new_remote(peer_id: PeerId, position: Vec2, profile: Option<&PlayerProfile>) -> Self {
        let color = profile.map_or(REMOTE_KITE_COLOR, |p| p.color.as_str());
        Self {
            kite: Kite::new(position, color),
            name: profile.map(|p| p.name.clone()).unwrap_or_default(),
            secret: profile.map(|p| p.secret.clone()).unwrap_or_default(),
            score: 0,
            lives: MAX_LIVES,
            invulnerable: 0,
            peer_id: Some(peer_id),
        }
    }

    /// Local cut detection skips a kite that is still spawn protected.
    pub fn is_invulnerable(&self) -> bool {
        self.invulnerable > 0
    }

    pub fn is_eliminated(&self) -> bool {
        self.lives == 0
    }

    /// Advances our own kite by one tick of steering and physics.
    pub fn update(&mut self, env: &Environment, controls: Controls) {
        self.invulnerable = self.invulnerable.saturating_sub(1);

        let kite = &mut self.kite;
        if controls.thrust {
            kite.velocity.y -= PLAYER_THRUST;
        }
        if controls.reel {
            kite.velocity.y += PLAYER_REEL;
        }
        if controls.left {
            kite.velocity.x -= PLAYER_STEER;
        }
        if controls.right {
            kite.velocity.x += PLAYER_STEER;
        }

        kite.velocity.x *= PLAYER_DAMPING;
        kite.velocity.y *= PLAYER_DAMPING;

        kite.velocity.x += env.wind.x * PLAYER_WIND_FACTOR;
        kite.velocity.y += PLAYER_GRAVITY;

        kite.position.x += kite.velocity.x;
        kite.position.y += kite.velocity.y;

        let bounds = env.bounds;
        if kite.position.x < PLAYER_MARGIN {
            kite.position.x = PLAYER_MARGIN;
            kite.velocity.x *= -0.5;
        }
        if kite.position.x > bounds.width - PLAYER_MARGIN {
            kite.position.x = bounds.width - PLAYER_MARGIN;
            kite.velocity.x *= -0.5;
        }
        if kite.position.y > bounds.height - PLAYER_FLOOR_MARGIN {
            kite.position.y = bounds.height - PLAYER_FLOOR_MARGIN;
            kite.velocity.y = -1.0;
        }
        if kite.position.y < PLAYER_MARGIN {
            kite.position.y = PLAYER_MARGIN;
            kite.velocity.y = 0.5;
        }

        self.follow_tail(env);
    }

    /// Relaxes the string towards the body without moving the body itself.
    ///
    /// Used for peers, whose body position only ever comes from their snapshots.
    pub fn follow_tail(&mut self, env: &Environment) {
        self.kite.tail.follow(
            self.kite.position,
            PLAYER_TAIL_FOLLOW,
            env.wind.x,
            PLAYER_TAIL_DRAG,
            PLAYER_TAIL_DRAG_STEP,
        );
    }

    /// Puts the kite back in play at `position` with a fresh string, climbing.
    /// Lives and score are left alone.
    pub fn respawn_at(&mut self, position: Vec2, invulnerable: u32) {
        self.kite.position = position;
        self.kite.velocity = Vec2::new(0.0, -1.0);
        self.kite.tail = Tail::new(position);
        self.kite.dead = false;
        self.invulnerable = invulnerable;
    }
}

/// Non-colliding background flyer.
#[derive(Debug, Clone)]
pub struct Bird {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Wing animation frame, 0 or 1.
    pub frame: u8,
}

impl Bird {
    pub fn spawn<R: Rng>(rng: &mut R) -> Self {
        Self {
            position: Vec2::new(-10.0, 20.0 + rng.gen::<f32>() * 60.0),
            velocity: Vec2::new(0.5 + rng.gen::<f32>(), (rng.gen::<f32>() - 0.5) * 0.2),
            frame: 0,
        }
    }

    pub fn update(&mut self, env: &Environment) {
        self.position.x += self.velocity.x;
        self.position.y += self.velocity.y + (env.time * 0.2).sin() * 0.1;

        if self.position.x > env.bounds.width {
            self.position.x = -10.0;
        }

        if (env.time * 2.0).floor() as i64 % 4 == 0 {
            self.frame = (self.frame + 1) % 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn profile() -> PlayerProfile {
        PlayerProfile {
            name: "Asha".to_string(),
            color: "#ff9900".to_string(),
            secret: "likes rain".to_string(),
        }
    }

    #[test]
    fn test_tail_starts_below_body() {
        let tail = Tail::new(Vec2::new(50.0, 40.0));
        assert_eq!(tail.nodes().len(), TAIL_LENGTH);
        for (i, node) in tail.nodes().iter().enumerate() {
            assert_eq!(node.x, 50.0);
            assert_eq!(node.y, 40.0 + i as f32 * TAIL_SPACING);
        }
        assert_eq!(tail.cuttable_nodes().len(), TAIL_LENGTH - 1);
        assert_eq!(tail.anchor(), tail.nodes()[TAIL_LENGTH - 1]);
    }

    #[test]
    fn test_environment_wind_gusts_around_base() {
        let mut env = Environment::default();
        for _ in 0..500 {
            env.advance();
            assert!(env.wind.x >= BASE_WIND_X - WIND_GUST - 0.0001);
            assert!(env.wind.x <= BASE_WIND_X + WIND_GUST + 0.0001);
        }
        assert_approx_eq!(env.time, 500.0 * TIME_STEP, 0.01);
    }

    #[test]
    fn test_ambient_kite_rises_and_dies_above_field() {
        let env = Environment::default();
        let mut kite = AmbientKite::new(Vec2::new(100.0, 0.0), Vec2::new(0.0, -1.0), "#76c61d", 0.0);
        assert!(kite.kite.is_ai);

        let start_y = kite.kite.position.y;
        kite.update(&env);
        assert!(kite.kite.position.y < start_y);
        assert!(!kite.kite.dead);

        for _ in 0..60 {
            kite.update(&env);
        }
        assert!(kite.kite.dead);
        assert!(kite.is_off_bounds(env.bounds));
    }

    #[test]
    fn test_falling_kite_leaves_through_bottom() {
        let env = Environment::default();
        let mut kite = AmbientKite::new(Vec2::new(100.0, 120.0), Vec2::new(0.0, 2.0), "#d41c6c", 0.0);
        kite.kite.dead = true;
        assert!(!kite.is_off_bounds(env.bounds));
        for _ in 0..40 {
            kite.update(&env);
        }
        assert!(kite.is_off_bounds(env.bounds));
    }

    #[test]
    fn test_spawned_ambient_kite_is_in_bottom_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let bounds = Bounds::default();
        for _ in 0..50 {
            let kite = AmbientKite::spawn(&mut rng, bounds, "#008b8b");
            assert!(kite.kite.position.x >= 0.0 && kite.kite.position.x <= bounds.width);
            assert!(kite.kite.position.y >= 100.0 && kite.kite.position.y < 150.0);
            assert!(kite.kite.velocity.y < -0.49);
        }
    }

    #[test]
    fn test_player_thrust_and_reel() {
        let env = Environment::default();
        let mut up = PlayerKite::new_local(Vec2::new(120.0, 60.0), &profile(), 0);
        let mut down = up.clone();

        up.update(&env, Controls { thrust: true, ..Default::default() });
        down.update(&env, Controls { reel: true, ..Default::default() });

        assert!(up.kite.velocity.y < down.kite.velocity.y);
        assert!(up.kite.position.y < down.kite.position.y);
    }

    #[test]
    fn test_player_steering() {
        let env = Environment::default();
        let mut left = PlayerKite::new_local(Vec2::new(120.0, 60.0), &profile(), 0);
        let mut right = left.clone();

        left.update(&env, Controls { left: true, ..Default::default() });
        right.update(&env, Controls { right: true, ..Default::default() });

        assert!(left.kite.velocity.x < 0.0);
        assert!(right.kite.velocity.x > 0.0);
    }

    #[test]
    fn test_player_bounces_off_side_walls() {
        let env = Environment::default();
        let mut kite = PlayerKite::new_local(Vec2::new(229.9, 60.0), &profile(), 0);
        kite.kite.velocity = Vec2::new(5.0, 0.0);

        kite.update(&env, Controls::default());

        assert_eq!(kite.kite.position.x, env.bounds.width - PLAYER_MARGIN);
        assert_approx_eq!(kite.kite.velocity.x, -(5.0 * PLAYER_DAMPING + 0.5 * PLAYER_WIND_FACTOR) * 0.5, 0.0001);

        let mut kite = PlayerKite::new_local(Vec2::new(10.5, 60.0), &profile(), 0);
        kite.kite.velocity = Vec2::new(-5.0, 0.0);
        kite.update(&env, Controls::default());
        assert_eq!(kite.kite.position.x, PLAYER_MARGIN);
        assert!(kite.kite.velocity.x > 0.0);
    }

    #[test]
    fn test_player_floor_and_ceiling_reset() {
        let env = Environment::default();
        let mut kite = PlayerKite::new_local(Vec2::new(120.0, 200.0), &profile(), 0);
        kite.update(&env, Controls::default());
        assert_eq!(kite.kite.position.y, env.bounds.height - PLAYER_FLOOR_MARGIN);
        assert_eq!(kite.kite.velocity.y, -1.0);

        let mut kite = PlayerKite::new_local(Vec2::new(120.0, 0.0), &profile(), 0);
        kite.update(&env, Controls::default());
        assert_eq!(kite.kite.position.y, PLAYER_MARGIN);
        assert_eq!(kite.kite.velocity.y, 0.5);
    }

    #[test]
    fn test_invulnerability_counts_down_without_input() {
        let env = Environment::default();
        let mut kite = PlayerKite::new_local(Vec2::new(120.0, 60.0), &profile(), 3);
        assert!(kite.is_invulnerable());
        for _ in 0..3 {
            kite.update(&env, Controls::default());
        }
        assert_eq!(kite.invulnerable, 0);
        kite.update(&env, Controls::default());
        assert_eq!(kite.invulnerable, 0);
    }

    #[test]
    fn test_player_tail_tracks_tighter_than_ambient() {
        let env = Environment::default();
        let start = Vec2::new(120.0, 60.0);
        let mut player_tail = Tail::new(start);
        let mut ambient_tail = Tail::new(start);
        let moved = Vec2::new(140.0, 60.0);

        for _ in 0..3 {
            player_tail.follow(moved, PLAYER_TAIL_FOLLOW, env.wind.x, PLAYER_TAIL_DRAG, PLAYER_TAIL_DRAG_STEP);
            ambient_tail.follow(moved, AMBIENT_TAIL_FOLLOW, env.wind.x, AMBIENT_TAIL_DRAG, AMBIENT_TAIL_DRAG_STEP);
        }

        let player_gap = player_tail.nodes()[0].distance_squared(moved);
        let ambient_gap = ambient_tail.nodes()[0].distance_squared(moved);
        assert!(player_gap < ambient_gap);
    }

    #[test]
    fn test_remote_kite_only_moves_its_tail() {
        let env = Environment::default();
        let mut peer = PlayerKite::new_remote(4, Vec2::new(80.0, 50.0), None);
        assert_eq!(peer.kite.color, REMOTE_KITE_COLOR);
        assert_eq!(peer.peer_id, Some(4));

        peer.kite.position = Vec2::new(90.0, 50.0);
        let before = peer.kite.tail.clone();
        peer.follow_tail(&env);

        assert_eq!(peer.kite.position, Vec2::new(90.0, 50.0));
        assert_ne!(peer.kite.tail, before);
    }

    #[test]
    fn test_respawn_restores_play() {
        let mut kite = PlayerKite::new_local(Vec2::new(120.0, 60.0), &profile(), 0);
        kite.kite.dead = true;
        kite.respawn_at(Vec2::new(30.0, 40.0), 90);
        assert!(!kite.kite.dead);
        assert_eq!(kite.kite.position, Vec2::new(30.0, 40.0));
        assert_eq!(kite.kite.tail, Tail::new(Vec2::new(30.0, 40.0)));
        assert_eq!(kite.invulnerable, 90);
    }

    #[test]
    fn test_bird_wraps_around() {
        let env = Environment::default();
        let mut bird = Bird {
            position: Vec2::new(env.bounds.width - 0.1, 40.0),
            velocity: Vec2::new(1.0, 0.0),
            frame: 0,
        };
        bird.update(&env);
        assert_eq!(bird.position.x, -10.0);
    }
}
