//! Control sources: the keyboard for windowed play, an autopilot for headless runs

use macroquad::prelude::*;
use shared::Controls;

use crate::session::{GameMode, GameState, Session};

/// One-shot requests, as opposed to the held steering keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start a single-player run, or the room's match when hosting.
    Start,
    /// Play again after a match: host rematch, or a fresh single-player run.
    Rematch,
    Quit,
}

/// Samples the keyboard once per frame
pub struct InputManager {
    // Previous frame key states for edge detection
    prev_key_enter: bool,
    prev_key_r: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev_key_enter: false,
            prev_key_r: false,
        }
    }

    /// Returns the held controls and at most one command pressed this frame
    pub fn update(&mut self) -> (Controls, Option<Command>) {
        // Sample steering keys (support both WASD and arrow keys)
        let controls = Controls {
            thrust: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up) || is_key_down(KeyCode::Space),
            reel: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
        };

        let key_enter = is_key_down(KeyCode::Enter);
        let key_r = is_key_down(KeyCode::R);

        let command = if is_key_pressed(KeyCode::Escape) {
            Some(Command::Quit)
        } else {
            edge_command(key_enter, self.prev_key_enter, key_r, self.prev_key_r)
        };

        self.prev_key_enter = key_enter;
        self.prev_key_r = key_r;

        (controls, command)
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects key press events (current && !previous)
fn edge_command(enter: bool, prev_enter: bool, r: bool, prev_r: bool) -> Option<Command> {
    if enter && !prev_enter {
        Some(Command::Start)
    } else if r && !prev_r {
        Some(Command::Rematch)
    } else {
        None
    }
}

/// Flies our kite without a human: keeps it in a band of the sky and sweeps it
/// towards a target column that moves every couple of seconds.
#[derive(Debug, Clone)]
pub struct AutoPilot {
    ticks: u64,
    target_x: f32,
    seed: u64,
    /// Guests the host waits for before starting on its own.
    start_with_guests: usize,
    rematch_after_ticks: u64,
    finished_at: Option<u64>,
}

const RETARGET_TICKS: u64 = 120;

impl AutoPilot {
    pub fn new(seed: u64, start_with_guests: usize) -> Self {
        Self {
            ticks: 0,
            target_x: 120.0,
            seed,
            start_with_guests,
            rematch_after_ticks: 300,
            finished_at: None,
        }
    }

    pub fn controls(&mut self, session: &Session) -> Controls {
        self.ticks += 1;

        let width = session.config.bounds.width;
        let height = session.config.bounds.height;
        if self.ticks % RETARGET_TICKS == 0 {
            // Cheap deterministic hop between columns
            let step = (self.ticks / RETARGET_TICKS).wrapping_mul(2_654_435_761).wrapping_add(self.seed);
            self.target_x = 20.0 + (step % 200) as f32 / 200.0 * (width - 40.0);
        }

        let Some(me) = &session.me else {
            return Controls::default();
        };
        let position = me.kite.position;
        Controls {
            thrust: position.y > height * 0.6,
            reel: position.y < height * 0.25,
            left: position.x > self.target_x + 5.0,
            right: position.x < self.target_x - 5.0,
        }
    }

    /// Presses start and rematch on its own so matches keep cycling.
    pub fn command(&mut self, session: &Session) -> Option<Command> {
        let finished = matches!(session.state, GameState::GameOver | GameState::Winner);
        if !finished {
            self.finished_at = None;
        }

        match (session.mode, session.state) {
            (GameMode::Single, GameState::Menu) => Some(Command::Start),
            (GameMode::Host, GameState::Waiting)
                if session.roster.len() > self.start_with_guests =>
            {
                Some(Command::Start)
            }
            (GameMode::Single | GameMode::Host, _) if finished => {
                let finished_at = *self.finished_at.get_or_insert(self.ticks);
                (self.ticks - finished_at >= self.rematch_after_ticks).then_some(Command::Rematch)
            }
            _ => None,
        }
    }
}
