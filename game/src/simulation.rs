//! Fixed-step driver tying the transport, the session and the presenter together.
//!
//! Each tick drains the transport's event queue, advances the environment and
//! every entity, evaluates our collisions, runs due timers, then flushes queued
//! messages to the transport and queued effects to the presenter. Nothing else
//! ever touches the session, so no locking is involved.

use log::{debug, info};
use rand::Rng;
use shared::{AmbientKite, Bird, Controls, Transport, TransportError};
use std::time::{Duration, Instant};

use crate::best_score::BestScoreStore;
use crate::config::AI_KITE_COLORS;
use crate::controller::MatchController;
use crate::input::{AutoPilot, Command};
use crate::presenter::{Drawable, Effect, Presenter};
use crate::session::{GameMode, GameState, Outgoing, Session};
use crate::sync;

/// Most ticks replayed in one catch-up before the clock skips ahead.
const MAX_CATCH_UP_TICKS: u64 = 5;

/// Interval timers for ambient entities.
#[derive(Debug, Clone, Default)]
pub struct Spawner {
    next_bird_ms: u64,
    next_ai_ms: u64,
}

pub struct SimulationLoop<P: Presenter> {
    session: Session,
    controller: MatchController,
    transport: Box<dyn Transport>,
    presenter: P,
    spawner: Spawner,
    best_store: BestScoreStore,
    /// Time limit the host applies when it starts a match.
    match_duration: Option<u32>,
    clock_ms: u64,
}

impl<P: Presenter> SimulationLoop<P> {
    pub fn new(
        mut session: Session,
        controller: MatchController,
        transport: Box<dyn Transport>,
        presenter: P,
        best_store: BestScoreStore,
    ) -> Self {
        session.best_score = best_store.load();
        let spawner = Spawner {
            next_bird_ms: session.config.bird_spawn_interval_ms,
            next_ai_ms: session.config.ai_spawn_interval_ms,
        };

        Self {
            session,
            controller,
            transport,
            presenter,
            spawner,
            best_store,
            match_duration: None,
            clock_ms: 0,
        }
    }

    pub fn with_match_duration(mut self, duration: Option<u32>) -> Self {
        self.match_duration = duration.filter(|secs| *secs > 0);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Direct access for scripted play, such as tests forcing a life loss.
    pub fn parts_mut(&mut self) -> (&mut Session, &mut MatchController) {
        (&mut self.session, &mut self.controller)
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn connect(&mut self, target: &str) -> Result<(), TransportError> {
        self.transport.connect(target)
    }

    pub fn handle_command(&mut self, command: Command) {
        let session = &mut self.session;
        match (command, session.mode) {
            (Command::Start, GameMode::Single)
                if matches!(session.state, GameState::Menu | GameState::GameOver) =>
            {
                self.controller.start_single(session)
            }
            (Command::Start, GameMode::Host) => self.controller.host_start(session, self.match_duration),
            (Command::Rematch, GameMode::Single) if session.state == GameState::GameOver => {
                self.controller.start_single(session)
            }
            (Command::Rematch, GameMode::Host) => self.controller.rematch(session),
            (command, mode) => debug!("{:?} has no effect for {:?} in {:?}", command, mode, session.state),
        }
        self.flush();
    }

    /// Drains every pending transport event into the session.
    pub fn pump_network(&mut self) {
        while let Some(event) = self.transport.poll_event() {
            sync::handle_event(&mut self.session, &mut self.controller, event);
        }
    }

    /// Runs one simulation step at `now_ms`.
    pub fn tick(&mut self, now_ms: u64, controls: Controls) {
        self.clock_ms = now_ms;
        self.session.now_ms = now_ms;

        self.pump_network();

        self.session.env.advance();
        self.update_birds();

        self.controller.check_timeout(&mut self.session);

        if self.session.state == GameState::Playing {
            if let Some(me) = self.session.me.as_mut() {
                if !me.kite.dead {
                    me.update(&self.session.env, controls);
                }
            }
            sync::publish_snapshot(&mut self.session);

            self.update_ambient();
            self.session.peers.follow_tails(&self.session.env);
            self.controller.resolve_collisions(&mut self.session);
        }

        self.controller.run_due_tasks(&mut self.session);
        self.flush();
    }

    /// Ticks as many fixed steps as fit before `now_ms`.
    pub fn advance_to(&mut self, now_ms: u64, controls: Controls) {
        let step = self.session.config.tick_ms.max(1);
        if now_ms > self.clock_ms + step * MAX_CATCH_UP_TICKS {
            debug!("Fell behind by {}ms, skipping ahead", now_ms - self.clock_ms);
            self.clock_ms = now_ms - step * MAX_CATCH_UP_TICKS;
        }
        while self.clock_ms + step <= now_ms {
            let next = self.clock_ms + step;
            self.tick(next, controls);
        }
    }

    fn update_birds(&mut self) {
        let now = self.session.now_ms;
        let config = &self.session.config;
        if now >= self.spawner.next_bird_ms {
            self.spawner.next_bird_ms = now + config.bird_spawn_interval_ms;
            if self.session.birds.len() < config.bird_cap {
                let bird = Bird::spawn(self.controller.rng());
                self.session.birds.push(bird);
            }
        }

        for bird in &mut self.session.birds {
            bird.update(&self.session.env);
        }
    }

    fn update_ambient(&mut self) {
        let now = self.session.now_ms;
        let config = &self.session.config;
        if now >= self.spawner.next_ai_ms {
            self.spawner.next_ai_ms = now + config.ai_spawn_interval_ms;

            let alive = self.session.ambient.iter().filter(|k| !k.kite.dead).count();
            if self.session.mode == GameMode::Single && alive < config.ai_cap {
                let bounds = config.bounds;
                let rng = self.controller.rng();
                let color = AI_KITE_COLORS[rng.gen_range(0..AI_KITE_COLORS.len())];
                let kite = AmbientKite::spawn(rng, bounds, color);
                self.session.ambient.push(kite);
            }
        }

        for kite in &mut self.session.ambient {
            kite.update(&self.session.env);
        }
        let bounds = self.session.config.bounds;
        self.session.ambient.retain(|kite| !kite.is_off_bounds(bounds));
    }

    fn flush(&mut self) {
        for outgoing in self.session.take_outbox() {
            match outgoing {
                Outgoing::Broadcast(message) => self.transport.broadcast(message),
                Outgoing::SendTo(peer_id, message) => self.transport.send_to(peer_id, message),
            }
        }

        for effect in self.session.take_effects() {
            if let Effect::GameOver(summary) = &effect {
                if summary.new_record {
                    self.best_store.save(summary.best_score);
                }
            }
            self.presenter.apply(effect);
        }
    }

    /// Draws the current frame back to front.
    pub fn render(&mut self) {
        let session = &self.session;
        self.presenter.begin_frame(session);

        for bird in &session.birds {
            self.presenter.draw_entity(Drawable::Bird(bird));
        }
        for kite in &session.ambient {
            self.presenter.draw_entity(Drawable::Ambient(kite));
        }
        for peer in session.peers.iter().filter(|peer| !peer.kite.dead) {
            self.presenter.draw_entity(Drawable::Player { kite: peer, local: false });
        }
        if let Some(me) = session.me.as_ref().filter(|me| !me.kite.dead) {
            self.presenter.draw_entity(Drawable::Player { kite: me, local: true });
        }

        self.presenter.end_frame(session);
    }

    /// Runs without a window until Ctrl-C, flown by `autopilot`.
    pub async fn run_headless(mut self, mut autopilot: AutoPilot) -> Result<(), Box<dyn std::error::Error>> {
        let tick = Duration::from_millis(self.session.config.tick_ms.max(1));
        let mut interval = tokio::time::interval(tick);
        let started = Instant::now();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!("Running headless at {}ms per tick", tick.as_millis());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(command) = autopilot.command(&self.session) {
                        self.handle_command(command);
                    }
                    let controls = autopilot.controls(&self.session);
                    let now_ms = started.elapsed().as_millis() as u64;
                    self.advance_to(now_ms, controls);
                },

                result = &mut shutdown => {
                    result?;
                    info!("Shutting down");
                    break;
                },
            }
        }

        Ok(())
    }
}
