//! Match lifecycle: start, cuts, lives, respawn, win and timeout checks, results
//! and rematch.
//!
//! The controller owns no match state itself; it drives the [`Session`] through
//! its transitions. Only the host computes results. Every deferred step is armed
//! through the session scheduler with the current generation, and every step
//! re-checks the game state when it finally runs.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    resolve_cut, CutOutcome, KiteUpdate, Message, PeerId, PlayerKite, ResultEntry, Vec2,
    CUT_KICK_VY,
};

use crate::presenter::{Effect, GameOverSummary, Sfx};
use crate::scheduler::Deferred;
use crate::session::{GameMode, GameState, Session};

/// Characters the room code is drawn from; lookalikes such as 0/O and 1/I are left out.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LENGTH: usize = 6;

/// Guest spawn columns as fractions of the field width, picked by peer id.
const GUEST_SPAWN_COLUMNS: [f32; 4] = [0.2, 0.8, 0.35, 0.65];
const SPAWN_ROW_FROM_BOTTOM: f32 = 50.0;

/// Something our kite just touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opponent {
    Ambient(usize),
    Peer(PeerId),
}

pub struct MatchController {
    rng: StdRng,
}

impl MatchController {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn room_code(&mut self) -> String {
        (0..ROOM_CODE_LENGTH)
            .map(|_| {
                let index = self.rng.gen_range(0..ROOM_CODE_ALPHABET.len());
                char::from(ROOM_CODE_ALPHABET[index])
            })
            .collect()
    }

    pub fn spawn_point(session: &Session) -> Vec2 {
        let bounds = session.config.bounds;
        let y = bounds.height - SPAWN_ROW_FROM_BOTTOM;
        match (session.mode, session.my_id) {
            (GameMode::Guest, Some(id)) => {
                let column = GUEST_SPAWN_COLUMNS[id as usize % GUEST_SPAWN_COLUMNS.len()];
                Vec2::new(bounds.width * column, y)
            }
            _ => Vec2::new(bounds.width / 2.0, y),
        }
    }

    /// Puts our kite on the field and enters play.
    pub fn start_game(&mut self, session: &mut Session) {
        session.next_generation();
        session.state = GameState::Playing;
        session.started_at_ms = session.now_ms;
        session.best_at_start = session.best_score;
        session.last_results.clear();
        session.ambient.clear();

        let spawn = Self::spawn_point(session);
        session.me = Some(PlayerKite::new_local(
            spawn,
            &session.profile,
            session.config.spawn_invulnerability,
        ));

        match session.duration_secs {
            Some(secs) => info!("Match started ({:?}, {}s limit)", session.mode, secs),
            None => info!("Match started ({:?}, no time limit)", session.mode),
        }
        session.effect(Effect::Sfx(Sfx::Start));
        session.refresh_scoreboard();
    }

    pub fn start_single(&mut self, session: &mut Session) {
        session.duration_secs = None;
        self.start_game(session);
    }

    /// Host starts the room's match and tells every guest.
    pub fn host_start(&mut self, session: &mut Session, duration: Option<u32>) {
        if !session.is_host() || !matches!(session.state, GameState::Menu | GameState::Waiting) {
            debug!("Ignoring start request in {:?}", session.state);
            return;
        }

        let duration = duration.filter(|secs| *secs > 0);
        session.duration_secs = duration;
        session.broadcast(Message::Start { duration });
        self.start_game(session);
    }

    /// Checks our kite against every live opponent and applies the outcomes.
    pub fn resolve_collisions(&mut self, session: &mut Session) {
        let Some(me) = session.me.as_ref() else {
            return;
        };

        let mut hits: Vec<(Opponent, CutOutcome)> = Vec::new();
        for (index, ambient) in session.ambient.iter().enumerate() {
            if let Some(outcome) = resolve_cut(me, &ambient.kite) {
                hits.push((Opponent::Ambient(index), outcome));
            }
        }
        for peer in session.peers.iter() {
            let Some(peer_id) = peer.peer_id else { continue };
            if let Some(outcome) = resolve_cut(me, &peer.kite) {
                hits.push((Opponent::Peer(peer_id), outcome));
            }
        }

        for (opponent, outcome) in hits {
            let still_flying = session.state == GameState::Playing
                && session.me.as_ref().map_or(false, |me| !me.kite.dead);
            if !still_flying {
                break;
            }

            match outcome {
                CutOutcome::ICutThem => self.cut_opponent(session, opponent),
                CutOutcome::TheyCutMe => self.lose_life(session),
            }
        }
    }

    fn cut_opponent(&mut self, session: &mut Session, opponent: Opponent) {
        let secret = match opponent {
            Opponent::Ambient(index) => {
                if let Some(ambient) = session.ambient.get_mut(index) {
                    ambient.kite.dead = true;
                    ambient.kite.velocity.y = CUT_KICK_VY;
                }
                None
            }
            Opponent::Peer(peer_id) => {
                session.peers.flag_cut(peer_id);
                session.send_to(peer_id, Message::Kill { target_id: peer_id });
                session.peers.get(peer_id).map(|peer| peer.secret.clone())
            }
        };

        if let Some(me) = session.me.as_mut() {
            me.score += 1;
            debug!("Cut landed, score {}", me.score);
        }
        session.effect(Effect::Sfx(Sfx::Cut));
        session.refresh_scoreboard();

        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            session.notice(format!("CUT! SECRET: \"{}\"", secret));
        }
    }

    /// Our kite was cut, locally or by a peer's `KILL`.
    pub fn lose_life(&mut self, session: &mut Session) {
        if session.state != GameState::Playing {
            debug!("Ignoring life loss in {:?}", session.state);
            return;
        }
        let Some(me) = session.me.as_mut() else {
            return;
        };
        if me.kite.dead || me.lives == 0 {
            return;
        }

        me.lives -= 1;
        me.kite.dead = true;
        let lives = me.lives;
        let secret = me.secret.clone();

        session.effect(Effect::Sfx(Sfx::Die));
        session.refresh_scoreboard();

        if lives > 0 {
            info!("Lost a life, {} left", lives);
            let due = session.now_ms + session.config.respawn_delay_ms;
            session.scheduler.schedule(Deferred::Respawn, due, session.generation);

            if let (Some(id), Some(me)) = (session.my_id, session.me.as_ref()) {
                let update = KiteUpdate::snapshot(id, me);
                session.broadcast(Message::Update(update));
            }
        } else {
            info!("Out of lives");
            if let Some(id) = session.my_id {
                session.broadcast(Message::Died { id, secret });
            }

            if session.mode == GameMode::Single {
                self.end_single(session);
                return;
            }
            session.notice("ELIMINATED");
        }

        self.check_win_condition(session);
    }

    fn respawn(&mut self, session: &mut Session) {
        if session.state != GameState::Playing {
            return;
        }

        let bounds = session.config.bounds;
        let x = self.rng.gen_range(10.0..(bounds.width - 10.0).max(11.0));
        let y = self.rng.gen_range(10.0..(bounds.height - 20.0).max(11.0));
        let invulnerable = session.config.respawn_invulnerability;

        let Some(me) = session.me.as_mut() else {
            return;
        };
        if me.lives == 0 {
            return;
        }
        me.respawn_at(Vec2::new(x, y), invulnerable);
        debug!("Respawned at ({:.0}, {:.0})", x, y);
        session.refresh_scoreboard();
    }

    /// Host only: arms the grace timer once at most one participant has lives left.
    pub fn check_win_condition(&mut self, session: &mut Session) {
        if !session.is_host()
            || session.state != GameState::Playing
            || session.peers.is_empty()
            || session.finalize_armed
        {
            return;
        }

        if session.survivors() <= 1 {
            info!(
                "{} survivor(s) left, publishing results in {}ms",
                session.survivors(),
                session.config.grace_period_ms
            );
            session.finalize_armed = true;
            let due = session.now_ms + session.config.grace_period_ms;
            session
                .scheduler
                .schedule(Deferred::FinalizeResults, due, session.generation);
        }
    }

    pub fn check_timeout(&mut self, session: &mut Session) {
        if session.state != GameState::Playing {
            return;
        }
        let Some(secs) = session.duration_secs else {
            return;
        };
        if session.now_ms.saturating_sub(session.started_at_ms) < u64::from(secs) * 1000 {
            return;
        }

        info!("Time up after {}s", secs);
        match session.mode {
            GameMode::Host => self.finalize_results(session),
            GameMode::Guest => {
                self.end_match(session);
                session.notice("TIME UP");
            }
            GameMode::Single => self.end_single(session),
        }
    }

    /// Host only: ranks everyone, broadcasts the standings and shows them.
    pub fn finalize_results(&mut self, session: &mut Session) {
        if !session.is_host() || session.state != GameState::Playing {
            debug!("Not finalizing results in {:?}", session.state);
            return;
        }

        let results = Self::rank_results(session);
        session.broadcast(Message::MatchResults {
            results: results.clone(),
        });
        self.show_results(session, results);
    }

    /// Our own standing first, then peers in the order they were first seen.
    ///
    /// A sole survivor leads whatever the scores; otherwise a stable sort by
    /// descending score keeps that enumeration order among equal scores.
    pub fn rank_results(session: &Session) -> Vec<ResultEntry> {
        let mut results: Vec<ResultEntry> = Vec::with_capacity(session.peers.len() + 1);

        if let Some(me) = &session.me {
            results.push(ResultEntry {
                name: me.name.clone(),
                secret: me.secret.clone(),
                score: me.score,
                dead: me.is_eliminated(),
            });
        }
        for peer in session.peers.iter() {
            results.push(ResultEntry {
                name: if peer.name.is_empty() { "Guest".to_string() } else { peer.name.clone() },
                secret: if peer.secret.is_empty() { "???".to_string() } else { peer.secret.clone() },
                score: peer.score,
                dead: peer.is_eliminated(),
            });
        }

        results.sort_by(|a, b| b.score.cmp(&a.score));

        let survivors: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.dead)
            .map(|(index, _)| index)
            .collect();
        if let [winner] = survivors.as_slice() {
            let entry = results.remove(*winner);
            results.insert(0, entry);
        }

        results
    }

    pub fn show_results(&mut self, session: &mut Session, results: Vec<ResultEntry>) {
        let Some(winner) = results.first() else {
            debug!("Ignoring empty results");
            return;
        };

        info!("Match over, {} wins with {} cuts", winner.name, winner.score);
        session.next_generation();
        session.state = GameState::Winner;
        session.last_results = results.clone();
        session.effect(Effect::Results(results));
        session.effect(Effect::Sfx(Sfx::Win));
    }

    /// Leaves play and arms the summary screen.
    fn end_match(&mut self, session: &mut Session) {
        session.next_generation();
        session.state = GameState::GameOver;
        let due = session.now_ms + session.config.game_over_delay_ms;
        session
            .scheduler
            .schedule(Deferred::ShowGameOver, due, session.generation);
    }

    pub fn end_single(&mut self, session: &mut Session) {
        info!("Game over");
        self.end_match(session);
    }

    fn show_game_over(&mut self, session: &mut Session) {
        if session.state != GameState::GameOver {
            return;
        }

        let score = session.me.as_ref().map_or(0, |me| me.score);
        let new_record = session.mode == GameMode::Single && score > session.best_at_start;
        if new_record {
            session.best_score = session.best_score.max(score);
        }

        session.effect(Effect::GameOver(GameOverSummary {
            score,
            elapsed_secs: session.elapsed_secs(),
            best_score: session.best_score,
            new_record,
        }));
    }

    /// Host only: sends everyone back to the lobby for another round.
    pub fn rematch(&mut self, session: &mut Session) {
        if !session.is_host() || !matches!(session.state, GameState::Winner | GameState::GameOver) {
            debug!("Ignoring rematch in {:?}", session.state);
            return;
        }

        session.broadcast(Message::Rematch);
        self.reset_for_rematch(session);
    }

    /// Clears the finished match while keeping the roster and connections.
    pub fn reset_for_rematch(&mut self, session: &mut Session) {
        session.next_generation();
        session.clear_match_entities();
        session.last_results.clear();
        session.state = GameState::Waiting;
        info!("Rematch: back to the lobby with {} player(s)", session.roster.len());
    }

    /// Runs every deferred task that has come due.
    pub fn run_due_tasks(&mut self, session: &mut Session) {
        for task in session.scheduler.take_due(session.now_ms, session.generation) {
            match task {
                Deferred::Respawn => self.respawn(session),
                Deferred::FinalizeResults => {
                    session.finalize_armed = false;
                    self.finalize_results(session);
                }
                Deferred::ShowGameOver => self.show_game_over(session),
                Deferred::DismissNotice(seq) => {
                    if seq == session.current_notice() {
                        session.effect(Effect::DismissNotice);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::session::Outgoing;
    use assert_approx_eq::assert_approx_eq;
    use shared::{AmbientKite, PlayerProfile, TransportEvent};

    fn profile(name: &str) -> PlayerProfile {
        PlayerProfile {
            name: name.to_string(),
            color: "#ff9900".to_string(),
            secret: format!("{}'s secret", name),
        }
    }

    fn session(mode: GameMode) -> Session {
        let mut session = Session::new(mode, profile("me"), GameConfig::default());
        session.my_id = Some(1);
        session
    }

    fn playing(mode: GameMode) -> (Session, MatchController) {
        let mut session = session(mode);
        let mut controller = MatchController::new(Some(7));
        controller.start_game(&mut session);
        session.take_effects();
        (session, controller)
    }

    fn add_peer(session: &mut Session, id: PeerId, score: u32, lives: u8) {
        let mut update = KiteUpdate::empty(id);
        update.x = Some(200.0);
        update.y = Some(20.0);
        update.score = Some(score);
        update.lives = Some(lives);
        session.peers.apply_update(&update, &session.roster);
        if let Some(peer) = session.peers.get_mut(id) {
            peer.name = format!("peer{}", id);
        }
    }

    fn me(session: &Session) -> &PlayerKite {
        session.me.as_ref().unwrap()
    }

    #[test]
    fn test_room_code_alphabet() {
        let mut controller = MatchController::new(Some(1));
        let code = controller.room_code();
        assert_eq!(code.len(), ROOM_CODE_LENGTH);
        assert!(code.bytes().all(|c| ROOM_CODE_ALPHABET.contains(&c)));
    }

    #[test]
    fn test_spawn_points() {
        let single = session(GameMode::Single);
        assert_eq!(MatchController::spawn_point(&single), Vec2::new(120.0, 85.0));

        let mut guest = session(GameMode::Guest);
        guest.my_id = Some(2);
        let spawn = MatchController::spawn_point(&guest);
        assert_approx_eq!(spawn.x, 84.0, 0.001);
        assert_approx_eq!(spawn.y, 85.0, 0.001);
    }

    #[test]
    fn test_start_game_resets_player() {
        let (session, _) = playing(GameMode::Single);
        assert_eq!(session.state, GameState::Playing);
        let me = me(&session);
        assert_eq!(me.lives, 3);
        assert_eq!(me.score, 0);
        assert_eq!(me.invulnerable, 60);
    }

    #[test]
    fn test_host_start_broadcasts_duration() {
        let mut session = session(GameMode::Host);
        session.state = GameState::Waiting;
        let mut controller = MatchController::new(Some(3));

        controller.host_start(&mut session, Some(60));
        assert_eq!(session.state, GameState::Playing);
        assert_eq!(session.duration_secs, Some(60));
        assert_eq!(
            session.take_outbox(),
            vec![Outgoing::Broadcast(Message::Start { duration: Some(60) })]
        );

        // A second press mid-match does nothing
        controller.host_start(&mut session, Some(30));
        assert!(session.take_outbox().is_empty());
    }

    #[test]
    fn test_cutting_ambient_kite_scores() {
        let (mut session, mut controller) = playing(GameMode::Single);
        let body = me(&session).kite.position;
        // Our body sits on the ambient string
        session.ambient.push(AmbientKite::new(
            Vec2::new(body.x, body.y - 4.0),
            Vec2::default(),
            "#008b8b",
            0.0,
        ));
        session.me.as_mut().unwrap().invulnerable = 0;

        controller.resolve_collisions(&mut session);

        assert_eq!(me(&session).score, 1);
        assert!(session.ambient[0].kite.dead);
        assert_eq!(session.ambient[0].kite.velocity.y, CUT_KICK_VY);
        assert!(session.take_effects().contains(&Effect::Sfx(Sfx::Cut)));
    }

    #[test]
    fn test_invulnerable_player_is_skipped() {
        let (mut session, mut controller) = playing(GameMode::Single);
        let body = me(&session).kite.position;
        session
            .ambient
            .push(AmbientKite::new(body, Vec2::default(), "#008b8b", 0.0));

        controller.resolve_collisions(&mut session);
        assert_eq!(me(&session).score, 0);
        assert_eq!(me(&session).lives, 3);
    }

    #[test]
    fn test_cutting_a_peer_sends_kill() {
        let (mut session, mut controller) = playing(GameMode::Host);
        session.take_outbox();
        let body = me(&session).kite.position;
        session.me.as_mut().unwrap().invulnerable = 0;

        add_peer(&mut session, 2, 0, 3);
        if let Some(peer) = session.peers.get_mut(2) {
            peer.kite.position = Vec2::new(body.x, body.y - 4.0);
            peer.kite.tail = shared::Tail::new(peer.kite.position);
            peer.secret = "hates kites".to_string();
        }

        controller.resolve_collisions(&mut session);

        let peer = session.peers.get(2).unwrap();
        assert!(peer.kite.dead);
        assert_eq!(peer.lives, 3);
        assert_eq!(
            session.take_outbox(),
            vec![Outgoing::SendTo(2, Message::Kill { target_id: 2 })]
        );
        assert!(session
            .take_effects()
            .contains(&Effect::Notice("CUT! SECRET: \"hates kites\"".to_string())));
    }

    #[test]
    fn test_stale_update_cannot_replay_a_cut() {
        let (mut session, mut controller) = playing(GameMode::Host);
        session.take_outbox();
        let body = me(&session).kite.position;
        session.me.as_mut().unwrap().invulnerable = 0;

        add_peer(&mut session, 2, 0, 3);
        let place = |session: &mut Session| {
            if let Some(peer) = session.peers.get_mut(2) {
                peer.kite.position = Vec2::new(body.x, body.y - 4.0);
                peer.kite.tail = shared::Tail::new(peer.kite.position);
            }
        };
        place(&mut session);
        controller.resolve_collisions(&mut session);
        assert_eq!(me(&session).score, 1);

        // the peer's snapshot from before it received our KILL
        let mut stale = KiteUpdate::snapshot(2, session.peers.get(2).unwrap());
        stale.dead = Some(false);
        stale.lives = Some(3);
        crate::sync::handle_event(
            &mut session,
            &mut controller,
            TransportEvent::Data { from: 2, message: Message::Update(stale) },
        );
        place(&mut session);
        controller.resolve_collisions(&mut session);

        assert!(session.peers.get(2).unwrap().kite.dead);
        assert_eq!(me(&session).score, 1);
        assert_eq!(
            session.take_outbox(),
            vec![Outgoing::SendTo(2, Message::Kill { target_id: 2 })]
        );
    }

    #[test]
    fn test_life_loss_schedules_respawn() {
        let (mut session, mut controller) = playing(GameMode::Guest);
        session.now_ms = 1000;
        controller.lose_life(&mut session);

        assert_eq!(me(&session).lives, 2);
        assert!(me(&session).kite.dead);
        assert!(session.scheduler.is_pending(&Deferred::Respawn));

        // Hidden until the delay is over
        session.now_ms = 2499;
        controller.run_due_tasks(&mut session);
        assert!(me(&session).kite.dead);

        session.now_ms = 2500;
        controller.run_due_tasks(&mut session);
        let me = me(&session);
        assert!(!me.kite.dead);
        assert_eq!(me.invulnerable, 90);
        assert!(me.kite.position.x >= 10.0 && me.kite.position.x <= 230.0);
        assert!(me.kite.position.y >= 10.0 && me.kite.position.y <= 115.0);
    }

    #[test]
    fn test_last_life_is_permanent() {
        let (mut session, mut controller) = playing(GameMode::Guest);
        session.me.as_mut().unwrap().lives = 1;
        session.take_outbox();

        controller.lose_life(&mut session);

        assert_eq!(me(&session).lives, 0);
        assert!(me(&session).kite.dead);
        assert!(!session.scheduler.is_pending(&Deferred::Respawn));
        let outbox = session.take_outbox();
        assert_eq!(
            outbox,
            vec![Outgoing::Broadcast(Message::Died {
                id: 1,
                secret: "me's secret".to_string()
            })]
        );

        // Nothing more to lose
        controller.lose_life(&mut session);
        assert_eq!(me(&session).lives, 0);
        assert_eq!(session.state, GameState::Playing);
    }

    #[test]
    fn test_single_player_death_ends_game() {
        let (mut session, mut controller) = playing(GameMode::Single);
        session.me.as_mut().unwrap().score = 4;
        session.refresh_scoreboard();
        session.me.as_mut().unwrap().lives = 1;
        session.now_ms = 10_000;

        controller.lose_life(&mut session);
        assert_eq!(session.state, GameState::GameOver);
        session.take_effects();

        session.now_ms = 11_500;
        controller.run_due_tasks(&mut session);
        let effects = session.take_effects();
        assert_eq!(
            effects,
            vec![Effect::GameOver(GameOverSummary {
                score: 4,
                elapsed_secs: 11,
                best_score: 4,
                new_record: true,
            })]
        );
    }

    #[test]
    fn test_stale_respawn_is_dropped() {
        let (mut session, mut controller) = playing(GameMode::Host);
        controller.lose_life(&mut session);
        controller.reset_for_rematch(&mut session);
        controller.start_game(&mut session);
        session.me.as_mut().unwrap().kite.dead = true;

        session.now_ms = 10_000;
        controller.run_due_tasks(&mut session);
        assert!(me(&session).kite.dead);
    }

    #[test]
    fn test_win_check_needs_peers_and_arms_once() {
        let (mut session, mut controller) = playing(GameMode::Host);
        controller.check_win_condition(&mut session);
        assert!(!session.finalize_armed);

        add_peer(&mut session, 2, 0, 0);
        add_peer(&mut session, 3, 0, 3);
        controller.check_win_condition(&mut session);
        assert!(!session.finalize_armed);

        session.peers.mark_eliminated(3, "");
        controller.check_win_condition(&mut session);
        assert!(session.finalize_armed);
        controller.check_win_condition(&mut session);
        assert_eq!(session.scheduler.len(), 1);
    }

    #[test]
    fn test_sole_survivor_ranks_first() {
        let (mut session, mut controller) = playing(GameMode::Host);
        add_peer(&mut session, 2, 5, 0);
        add_peer(&mut session, 3, 1, 0);
        session.now_ms = 1000;
        controller.check_win_condition(&mut session);
        session.take_outbox();

        session.now_ms = 3000;
        controller.run_due_tasks(&mut session);

        assert_eq!(session.state, GameState::Winner);
        let names: Vec<&str> = session.last_results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["me", "peer2", "peer3"]);
        assert!(matches!(
            session.take_outbox()[..],
            [Outgoing::Broadcast(Message::MatchResults { .. })]
        ));
    }

    #[test]
    fn test_ranking_by_score_keeps_join_order_on_ties() {
        let (mut session, _) = playing(GameMode::Host);
        add_peer(&mut session, 2, 3, 2);
        add_peer(&mut session, 3, 0, 1);
        add_peer(&mut session, 4, 3, 1);

        let names: Vec<String> = MatchController::rank_results(&session)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["peer2", "peer4", "me", "peer3"]);
    }

    #[test]
    fn test_timeout_per_mode() {
        let (mut host, mut controller) = playing(GameMode::Host);
        host.duration_secs = Some(60);
        host.now_ms = 59_999;
        controller.check_timeout(&mut host);
        assert_eq!(host.state, GameState::Playing);
        host.now_ms = 60_000;
        controller.check_timeout(&mut host);
        assert_eq!(host.state, GameState::Winner);

        let (mut guest, mut controller) = playing(GameMode::Guest);
        guest.duration_secs = Some(1);
        guest.now_ms = 1000;
        controller.check_timeout(&mut guest);
        assert_eq!(guest.state, GameState::GameOver);
        assert!(guest.outbox().is_empty());

        let (mut single, mut controller) = playing(GameMode::Single);
        single.now_ms = 1_000_000;
        controller.check_timeout(&mut single);
        assert_eq!(single.state, GameState::Playing);
    }

    #[test]
    fn test_rematch_keeps_roster() {
        let (mut session, mut controller) = playing(GameMode::Host);
        session.roster.merge(1, profile("me"));
        session.roster.merge(2, profile("guest"));
        add_peer(&mut session, 2, 0, 0);
        controller.finalize_results(&mut session);
        session.take_outbox();

        controller.rematch(&mut session);

        assert_eq!(session.state, GameState::Waiting);
        assert!(session.me.is_none());
        assert!(session.peers.is_empty());
        assert_eq!(session.roster.len(), 2);
        assert_eq!(session.take_outbox(), vec![Outgoing::Broadcast(Message::Rematch)]);
    }
}
