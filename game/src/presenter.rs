//! Output side of the game: drawing, sound and on-screen text.
//!
//! Match logic never talks to a presenter directly. It queues [`Effect`]s on the
//! session, and the simulation loop hands them over once per tick, so the same
//! logic runs behind a window, a log, or a test recorder.

use log::info;
use shared::{AmbientKite, Bird, PlayerKite, ResultEntry};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sfx {
    Start,
    Cut,
    Die,
    Win,
}

/// End-of-match card for single-player and for guests without results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOverSummary {
    pub score: u32,
    pub elapsed_secs: u64,
    pub best_score: u32,
    pub new_record: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Sfx(Sfx),
    Notice(String),
    DismissNotice,
    Scoreboard { name: String, score: u32, lives: u8 },
    Results(Vec<ResultEntry>),
    GameOver(GameOverSummary),
}

/// Something the presenter can draw this frame.
#[derive(Debug, Clone, Copy)]
pub enum Drawable<'a> {
    Bird(&'a Bird),
    Ambient(&'a AmbientKite),
    Player { kite: &'a PlayerKite, local: bool },
}

pub trait Presenter {
    fn begin_frame(&mut self, _session: &Session) {}

    fn draw_entity(&mut self, entity: Drawable<'_>);

    fn end_frame(&mut self, _session: &Session) {}

    fn play_sfx(&mut self, sfx: Sfx);

    fn update_scoreboard(&mut self, name: &str, score: u32, lives: u8);

    fn show_transient_notice(&mut self, text: &str);

    fn dismiss_notice(&mut self) {}

    fn show_results(&mut self, results: &[ResultEntry]);

    fn show_game_over(&mut self, summary: &GameOverSummary);

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Sfx(sfx) => self.play_sfx(sfx),
            Effect::Notice(text) => self.show_transient_notice(&text),
            Effect::DismissNotice => self.dismiss_notice(),
            Effect::Scoreboard { name, score, lives } => self.update_scoreboard(&name, score, lives),
            Effect::Results(results) => self.show_results(&results),
            Effect::GameOver(summary) => self.show_game_over(&summary),
        }
    }
}

/// Presenter for headless runs: everything worth seeing goes to the log.
#[derive(Debug, Default)]
pub struct LogPresenter {
    last_scoreboard: Option<(u32, u8)>,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for LogPresenter {
    fn draw_entity(&mut self, _entity: Drawable<'_>) {}

    fn play_sfx(&mut self, _sfx: Sfx) {}

    fn update_scoreboard(&mut self, name: &str, score: u32, lives: u8) {
        if self.last_scoreboard != Some((score, lives)) {
            self.last_scoreboard = Some((score, lives));
            info!("{}: score {} lives {}", name, score, lives);
        }
    }

    fn show_transient_notice(&mut self, text: &str) {
        info!("Notice: {}", text);
    }

    fn show_results(&mut self, results: &[ResultEntry]) {
        for (rank, entry) in results.iter().enumerate() {
            info!(
                "#{} {} - {} cuts - \"{}\"{}",
                rank + 1,
                entry.name,
                entry.score,
                entry.secret,
                if entry.dead { " (out)" } else { "" }
            );
        }
    }

    fn show_game_over(&mut self, summary: &GameOverSummary) {
        if summary.new_record {
            info!("Game over: {} cuts in {}s (NEW RECORD!)", summary.score, summary.elapsed_secs);
        } else {
            info!(
                "Game over: {} cuts in {}s (BEST: {})",
                summary.score, summary.elapsed_secs, summary.best_score
            );
        }
    }
}

/// Keeps every effect it is handed, for assertions.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub effects: Vec<Effect>,
    pub drawn: usize,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<&str> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Notice(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Option<&[ResultEntry]> {
        self.effects.iter().rev().find_map(|effect| match effect {
            Effect::Results(results) => Some(results.as_slice()),
            _ => None,
        })
    }

    pub fn game_over(&self) -> Option<&GameOverSummary> {
        self.effects.iter().rev().find_map(|effect| match effect {
            Effect::GameOver(summary) => Some(summary),
            _ => None,
        })
    }

    pub fn played(&self, sfx: Sfx) -> bool {
        self.effects.contains(&Effect::Sfx(sfx))
    }
}

impl Presenter for RecordingPresenter {
    fn draw_entity(&mut self, _entity: Drawable<'_>) {
        self.drawn += 1;
    }

    fn play_sfx(&mut self, sfx: Sfx) {
        self.effects.push(Effect::Sfx(sfx));
    }

    fn update_scoreboard(&mut self, name: &str, score: u32, lives: u8) {
        self.effects.push(Effect::Scoreboard {
            name: name.to_string(),
            score,
            lives,
        });
    }

    fn show_transient_notice(&mut self, text: &str) {
        self.effects.push(Effect::Notice(text.to_string()));
    }

    fn dismiss_notice(&mut self) {
        self.effects.push(Effect::DismissNotice);
    }

    fn show_results(&mut self, results: &[ResultEntry]) {
        self.effects.push(Effect::Results(results.to_vec()));
    }

    fn show_game_over(&mut self, summary: &GameOverSummary) {
        self.effects.push(Effect::GameOver(summary.clone()));
    }
}
