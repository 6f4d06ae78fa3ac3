//! # Sankranti Game Library
//!
//! Everything a kite-fighting peer runs, apart from the wire transport and the
//! shared entity physics. One peer owns one [`simulation::SimulationLoop`],
//! which ticks a [`session::Session`] forward a fixed step at a time.
//!
//! ## Architecture Overview
//!
//! Kites are simulated locally and their positions broadcast every tick. There
//! is no authoritative server: each peer detects cuts against its own kite
//! and tells the victim, and the room host alone decides when a match ends.
//!
//! ### Session (`session`)
//! The single owner of match state: game state, mode, local and remote kites,
//! roster, timers, and the queues of outgoing messages and presentation effects.
//!
//! ### Match Controller (`controller`)
//! State transitions of a match:
//! - Starting single-player runs and hosted matches
//! - Cut detection results, life loss and respawn
//! - Win and timeout checks, result ranking, rematches
//!
//! ### Sync (`sync`)
//! Applies transport events and protocol messages to the session and
//! publishes the local kite snapshot.
//!
//! ### Scheduler (`scheduler`)
//! Deferred tasks keyed by match generation, so a timer armed in one match
//! never fires into the next.
//!
//! ### Simulation (`simulation`)
//! The tick pipeline, ambient spawning, and the glue between session,
//! transport and presenter.
//!
//! ### Presentation (`presenter`, `rendering`)
//! The [`presenter::Presenter`] trait with a logging and a recording
//! implementation, plus the macroquad renderer used by the windowed build.
//!
//! ### Input (`input`)
//! Keyboard sampling for windowed play and an autopilot for headless peers.
//!
//! ## Usage Example
//!
//! ```no_run
//! use game::best_score::BestScoreStore;
//! use game::config::GameConfig;
//! use game::controller::MatchController;
//! use game::input::Command;
//! use game::presenter::LogPresenter;
//! use game::session::{GameMode, Session};
//! use game::simulation::SimulationLoop;
//! use shared::{Controls, OfflineTransport, PlayerProfile};
//!
//! let session = Session::new(GameMode::Single, PlayerProfile::default(), GameConfig::default());
//! let mut sim = SimulationLoop::new(
//!     session,
//!     MatchController::new(None),
//!     Box::new(OfflineTransport),
//!     LogPresenter::new(),
//!     BestScoreStore::in_memory(),
//! );
//!
//! sim.handle_command(Command::Start);
//! for tick in 1..=60 {
//!     sim.tick(tick * 16, Controls::default());
//! }
//! ```

pub mod best_score;
pub mod config;
pub mod controller;
pub mod input;
pub mod presenter;
pub mod rendering;
pub mod scheduler;
pub mod session;
pub mod simulation;
pub mod sync;

pub use controller::MatchController;
pub use session::{GameMode, GameState, Session};
pub use simulation::SimulationLoop;
