//! Match tunables.

use shared::{is_hex_color, Bounds, PlayerProfile};

/// Palette AI kites are drawn from.
pub const AI_KITE_COLORS: [&str; 4] = ["#ff9900", "#d41c6c", "#76c61d", "#008b8b"];

/// Color a player gets when none was chosen.
pub const DEFAULT_KITE_COLOR: &str = "#ff9900";

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub bounds: Bounds,
    /// Fixed simulation step.
    pub tick_ms: u64,
    /// Hidden time between losing a life and reappearing.
    pub respawn_delay_ms: u64,
    /// Delay between detecting a last survivor and publishing results.
    pub grace_period_ms: u64,
    pub game_over_delay_ms: u64,
    pub notice_lifetime_ms: u64,
    pub bird_spawn_interval_ms: u64,
    pub bird_cap: usize,
    pub ai_spawn_interval_ms: u64,
    /// Most AI kites alive at once. Zero disables AI spawning.
    pub ai_cap: usize,
    /// Frames of protection on match start.
    pub spawn_invulnerability: u32,
    /// Frames of protection after a respawn.
    pub respawn_invulnerability: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            tick_ms: 16,
            respawn_delay_ms: 1500,
            grace_period_ms: 2000,
            game_over_delay_ms: 1500,
            notice_lifetime_ms: 4000,
            bird_spawn_interval_ms: 1000,
            bird_cap: 30,
            ai_spawn_interval_ms: 2000,
            ai_cap: 5,
            spawn_invulnerability: 60,
            respawn_invulnerability: 90,
        }
    }
}

/// Builds a profile from command line values, filling the blanks. Overlong
/// text is cut down and a malformed color falls back to the default.
pub fn profile_from_args(name: Option<String>, color: Option<String>, secret: Option<String>) -> PlayerProfile {
    PlayerProfile {
        name: name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| "PILOT".to_string()),
        color: color
            .filter(|c| is_hex_color(c))
            .unwrap_or_else(|| DEFAULT_KITE_COLOR.to_string()),
        secret: secret.unwrap_or_default(),
    }
    .clamped()
}
