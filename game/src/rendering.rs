use macroquad::prelude::*;
use shared::{Bounds, Kite, ResultEntry, Vec2 as FieldPoint};

use crate::presenter::{Drawable, GameOverSummary, Presenter, Sfx};
use crate::session::{GameMode, GameState, Session};

const SKY: Color = Color::from_rgba(255, 179, 102, 255);
const HUD_TEXT: Color = Color::from_rgba(255, 255, 255, 255);
const STRING_COLOR: Color = Color::from_rgba(40, 40, 40, 255);
const BIRD_COLOR: Color = Color::from_rgba(51, 34, 34, 255);

const SHAKE_FRAMES: f32 = 10.0;
/// Field units of jitter per remaining shake frame.
const SHAKE_AMPLITUDE: f32 = 0.3;

/// Parses `#rrggbb`, falling back to white.
pub fn parse_hex_color(hex: &str) -> Color {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 {
        return WHITE;
    }
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
    };
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) => Color::from_rgba(r, g, b, 255),
        _ => WHITE,
    }
}

#[derive(Debug, Clone)]
struct Scoreboard {
    name: String,
    score: u32,
    lives: u8,
}

/// Draws the field scaled to the window, plus HUD and overlays.
pub struct MacroquadPresenter {
    bounds: Bounds,
    scale: f32,
    scoreboard: Option<Scoreboard>,
    notice: Option<String>,
    results: Option<Vec<ResultEntry>>,
    game_over: Option<GameOverSummary>,
    /// Frames of screen shake left.
    shake: f32,
    /// Field-space offset applied to everything drawn this frame.
    shake_offset: FieldPoint,
}

impl MacroquadPresenter {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            scale: 1.0,
            scoreboard: None,
            notice: None,
            results: None,
            game_over: None,
            shake: 0.0,
            shake_offset: FieldPoint::default(),
        }
    }

    fn to_screen(&self, point: FieldPoint) -> (f32, f32) {
        (
            (point.x + self.shake_offset.x) * self.scale,
            (point.y + self.shake_offset.y) * self.scale,
        )
    }

    /// Decays the shake by a frame and picks this frame's jitter, which shrinks
    /// with it.
    fn advance_shake(&mut self) {
        self.shake = (self.shake - 1.0).max(0.0);
        let amplitude = self.shake * SHAKE_AMPLITUDE;
        self.shake_offset = FieldPoint::new(
            (self.shake * 2.7).sin() * amplitude,
            (self.shake * 3.1).cos() * amplitude,
        );
    }

    fn draw_kite(&self, kite: &Kite, color: Color, outline: Option<Color>) {
        let mut previous = self.to_screen(kite.position);
        for node in kite.tail.nodes() {
            let next = self.to_screen(*node);
            draw_line(previous.0, previous.1, next.0, next.1, self.scale * 0.5, STRING_COLOR);
            previous = next;
        }

        let (x, y) = self.to_screen(kite.position);
        let size = 3.0 * self.scale;
        let top = macroquad::math::Vec2::new(x, y - size);
        let right = macroquad::math::Vec2::new(x + size, y);
        let bottom = macroquad::math::Vec2::new(x, y + size);
        let left = macroquad::math::Vec2::new(x - size, y);
        draw_triangle(top, right, bottom, color);
        draw_triangle(top, left, bottom, color);

        if let Some(outline) = outline {
            draw_line(top.x, top.y, right.x, right.y, 1.0, outline);
            draw_line(right.x, right.y, bottom.x, bottom.y, 1.0, outline);
            draw_line(bottom.x, bottom.y, left.x, left.y, 1.0, outline);
            draw_line(left.x, left.y, top.x, top.y, 1.0, outline);
        }
    }

    fn draw_hud(&self, session: &Session) {
        if let Some(board) = &self.scoreboard {
            let hearts = "*".repeat(board.lives as usize);
            let text = format!("{}  SCORE {}  {}", board.name, board.score, hearts);
            draw_text(&text, 8.0, 20.0, 20.0, HUD_TEXT);
        }

        if let (GameState::Playing, Some(limit)) = (session.state, session.duration_secs) {
            let remaining = u64::from(limit).saturating_sub(session.elapsed_secs());
            draw_text(&format!("TIME: {}", remaining), screen_width() - 110.0, 20.0, 20.0, HUD_TEXT);
        }

        if let Some(code) = &session.room_code {
            draw_text(&format!("ROOM {}", code), 8.0, screen_height() - 10.0, 18.0, HUD_TEXT);
        }

        let prompt = match (session.mode, session.state) {
            (GameMode::Single, GameState::Menu) => Some("PRESS ENTER TO FLY"),
            (GameMode::Host, GameState::Waiting) => Some("PRESS ENTER TO START THE MATCH"),
            (GameMode::Guest, GameState::Menu | GameState::Waiting) => Some("WAITING FOR HOST..."),
            (GameMode::Single, GameState::GameOver) => Some("PRESS R TO RETRY"),
            (GameMode::Host, GameState::Winner | GameState::GameOver) => Some("PRESS R FOR A REMATCH"),
            _ => None,
        };
        if let Some(prompt) = prompt {
            let width = measure_text(prompt, None, 20, 1.0).width;
            draw_text(prompt, (screen_width() - width) / 2.0, screen_height() - 30.0, 20.0, HUD_TEXT);
        }

        if let Some(notice) = &self.notice {
            let width = measure_text(notice, None, 22, 1.0).width;
            draw_rectangle(0.0, 34.0, screen_width(), 28.0, Color::from_rgba(0, 0, 0, 160));
            draw_text(notice, (screen_width() - width) / 2.0, 54.0, 22.0, YELLOW);
        }
    }

    fn draw_overlays(&self, session: &Session) {
        if session.state == GameState::Winner {
            if let Some(results) = &self.results {
                self.draw_results(results);
            }
        } else if session.state == GameState::GameOver {
            if let Some(summary) = &self.game_over {
                self.draw_game_over(summary);
            }
        }
    }

    fn draw_results(&self, results: &[ResultEntry]) {
        let Some((winner, losers)) = results.split_first() else {
            return;
        };
        draw_rectangle(0.0, 0.0, screen_width(), screen_height(), Color::from_rgba(0, 0, 0, 180));

        let center = screen_width() / 2.0;
        let title = format!("{} WINS!", winner.name);
        let width = measure_text(&title, None, 36, 1.0).width;
        draw_text(&title, center - width / 2.0, 90.0, 36.0, GOLD);

        let secret = format!("\"{}\"", winner.secret);
        let width = measure_text(&secret, None, 22, 1.0).width;
        draw_text(&secret, center - width / 2.0, 124.0, 22.0, HUD_TEXT);

        for (i, entry) in losers.iter().enumerate() {
            let line = format!("{} Kills - \"{}\"", entry.score, entry.secret);
            draw_text(&line, center - 140.0, 170.0 + i as f32 * 24.0, 20.0, LIGHTGRAY);
        }
    }

    fn draw_game_over(&self, summary: &GameOverSummary) {
        draw_rectangle(0.0, 0.0, screen_width(), screen_height(), Color::from_rgba(0, 0, 0, 180));
        let center = screen_width() / 2.0;

        let title = "GAME OVER";
        let width = measure_text(title, None, 40, 1.0).width;
        draw_text(title, center - width / 2.0, 100.0, 40.0, RED);

        let score = if summary.new_record {
            format!("SCORE {} (NEW RECORD!)", summary.score)
        } else {
            format!("SCORE {} (BEST: {})", summary.score, summary.best_score)
        };
        let time = format!("TIME {}s", summary.elapsed_secs);
        for (i, line) in [score, time].iter().enumerate() {
            let width = measure_text(line, None, 24, 1.0).width;
            draw_text(line, center - width / 2.0, 150.0 + i as f32 * 30.0, 24.0, HUD_TEXT);
        }
    }
}

impl Presenter for MacroquadPresenter {
    fn begin_frame(&mut self, _session: &Session) {
        self.scale = (screen_width() / self.bounds.width).min(screen_height() / self.bounds.height);
        clear_background(SKY);
        self.advance_shake();
    }

    fn draw_entity(&mut self, entity: Drawable<'_>) {
        match entity {
            Drawable::Bird(bird) => {
                let (x, y) = self.to_screen(bird.position);
                let wing = if bird.frame == 0 { -1.5 } else { 1.5 } * self.scale;
                draw_line(x - 2.0 * self.scale, y + wing, x, y, 1.5, BIRD_COLOR);
                draw_line(x, y, x + 2.0 * self.scale, y + wing, 1.5, BIRD_COLOR);
            }
            Drawable::Ambient(ambient) => {
                self.draw_kite(&ambient.kite, parse_hex_color(&ambient.kite.color), None);
            }
            Drawable::Player { kite, local } => {
                let blink = local && kite.is_invulnerable() && (kite.invulnerable / 6) % 2 == 0;
                if blink {
                    return;
                }
                let outline = if local { Some(WHITE) } else { None };
                self.draw_kite(&kite.kite, parse_hex_color(&kite.kite.color), outline);

                if !kite.name.is_empty() {
                    let (x, y) = self.to_screen(kite.kite.position);
                    draw_text(&kite.name, x - 12.0, y - 4.0 * self.scale, 14.0, HUD_TEXT);
                }
            }
        }
    }

    fn end_frame(&mut self, session: &Session) {
        self.draw_hud(session);
        self.draw_overlays(session);
    }

    fn play_sfx(&mut self, sfx: Sfx) {
        // No audio backend; only the screen reacts
        if matches!(sfx, Sfx::Cut | Sfx::Die) {
            self.shake = SHAKE_FRAMES;
        }
    }

    fn update_scoreboard(&mut self, name: &str, score: u32, lives: u8) {
        self.scoreboard = Some(Scoreboard {
            name: name.to_string(),
            score,
            lives,
        });
    }

    fn show_transient_notice(&mut self, text: &str) {
        self.notice = Some(text.to_string());
    }

    fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    fn show_results(&mut self, results: &[ResultEntry]) {
        self.results = Some(results.to_vec());
    }

    fn show_game_over(&mut self, summary: &GameOverSummary) {
        self.game_over = Some(summary.clone());
    }
}
