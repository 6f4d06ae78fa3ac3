//! Integration tests for complete matches
//!
//! These tests run several peers, each with its own simulation loop, over the
//! in-memory transport, and one room over real UDP sockets.

use game::best_score::BestScoreStore;
use game::config::GameConfig;
use game::controller::MatchController;
use game::input::Command;
use game::presenter::RecordingPresenter;
use game::scheduler::Deferred;
use game::session::{GameMode, GameState, Outgoing, Session};
use game::simulation::SimulationLoop;
use shared::{
    AmbientKite, Controls, KiteUpdate, MemoryHub, MemoryTransport, Message, PeerId, PlayerProfile,
    Transport, TransportEvent, Vec2,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};

type Peer = SimulationLoop<RecordingPresenter>;

const STEP_MS: u64 = 16;
const HOST_ID: PeerId = 1;

const GUEST_NAMES: [&str; 3] = ["Kiran", "Meera", "Tara"];

/// No AI kites, so nothing but the players can cut anyone.
fn quiet_config() -> GameConfig {
    GameConfig {
        ai_cap: 0,
        ..GameConfig::default()
    }
}

fn profile(name: &str) -> PlayerProfile {
    PlayerProfile {
        name: name.to_string(),
        color: "#ff9900".to_string(),
        secret: format!("{} was here", name),
    }
}

fn peer(mode: GameMode, name: &str, transport: Box<dyn Transport>, seed: u64) -> Peer {
    let session = Session::new(mode, profile(name), quiet_config());
    SimulationLoop::new(
        session,
        MatchController::new(Some(seed)),
        transport,
        RecordingPresenter::new(),
        BestScoreStore::in_memory(),
    )
}

fn steer(right: bool) -> Controls {
    Controls {
        right,
        left: !right,
        ..Controls::default()
    }
}

/// One host and its guests on a shared hub, with a silent observer that sees
/// every broadcast.
struct Room {
    hub: MemoryHub,
    peers: Vec<Peer>,
    observer: MemoryTransport,
    now_ms: u64,
}

impl Room {
    fn new(guests: usize, duration: Option<u32>) -> Self {
        let hub = MemoryHub::new();
        let host = peer(GameMode::Host, "Host", Box::new(hub.endpoint("host")), 1)
            .with_match_duration(duration);
        let mut peers = vec![host];

        for (i, name) in GUEST_NAMES.iter().take(guests).enumerate() {
            let mut transport = hub.endpoint(&format!("guest-{}", i));
            transport.connect("host").unwrap();
            peers.push(peer(GameMode::Guest, name, Box::new(transport), 10 + i as u64));
        }

        let mut observer = hub.endpoint("observer");
        observer.connect("host").unwrap();

        let mut room = Self {
            hub,
            peers,
            observer,
            now_ms: 0,
        };
        // Handshake and roster exchange
        room.run_for(5 * STEP_MS, |_| Controls::default());
        room.drain();
        room
    }

    fn host(&self) -> &Peer {
        &self.peers[0]
    }

    fn step(&mut self, controls: impl Fn(usize) -> Controls) {
        self.now_ms += STEP_MS;
        for (i, peer) in self.peers.iter_mut().enumerate() {
            peer.tick(self.now_ms, controls(i));
        }
    }

    fn run_for(&mut self, ms: u64, controls: impl Fn(usize) -> Controls) {
        let until = self.now_ms + ms;
        while self.now_ms < until {
            self.step(&controls);
        }
    }

    fn start(&mut self) {
        self.peers[0].handle_command(Command::Start);
        self.run_for(2 * STEP_MS, |_| Controls::default());
    }

    /// Everything broadcast since the last drain, with its sender.
    fn drain(&mut self) -> Vec<(PeerId, Message)> {
        std::iter::from_fn(|| self.observer.poll_event())
            .filter_map(|event| match event {
                TransportEvent::Data { from, message } => Some((from, message)),
                _ => None,
            })
            .collect()
    }

    fn guest_id(&self, index: usize) -> PeerId {
        self.peers[index].session().my_id.unwrap()
    }
}

fn kinds_from(messages: &[(PeerId, Message)], sender: PeerId) -> Vec<&'static str> {
    messages
        .iter()
        .filter(|(from, _)| *from == sender)
        .map(|(_, message)| message.kind())
        .collect()
}

/// SINGLE-PLAYER TESTS
mod single_player_tests {
    use super::*;
    use shared::OfflineTransport;

    /// Cutting three ambient kites scores three, and a run without a time limit
    /// keeps going until the player dies
    #[test]
    fn three_cuts_score_three_and_no_timeout() {
        let mut sim = peer(GameMode::Single, "Solo", Box::new(OfflineTransport), 7);
        sim.handle_command(Command::Start);
        sim.tick(STEP_MS, Controls::default());

        let (session, controller) = sim.parts_mut();
        let me = session.me.as_mut().unwrap();
        me.invulnerable = 0;
        let body = me.kite.position;

        // Each kite's string hangs straight through our body
        for dx in [-1.0, 0.0, 1.0] {
            let mut kite = AmbientKite::new(Vec2::new(body.x + dx, body.y - 6.0), Vec2::default(), "#d41c6c", 0.0);
            kite.kite.is_ai = true;
            session.ambient.push(kite);
        }
        controller.resolve_collisions(session);

        assert_eq!(session.me.as_ref().unwrap().score, 3);
        assert!(session.ambient.iter().all(|kite| kite.kite.dead));

        // Two minutes of flying with nothing around
        for i in 2..=7_500 {
            sim.tick(i * STEP_MS, Controls::default());
        }
        assert_eq!(sim.session().state, GameState::Playing);
        assert_eq!(sim.session().me.as_ref().unwrap().score, 3);
        assert!(sim.presenter().game_over().is_none());
    }

    /// Losing the last life ends the run and reports a new best
    #[test]
    fn last_life_ends_the_run_with_a_record() {
        let mut sim = peer(GameMode::Single, "Solo", Box::new(OfflineTransport), 7);
        sim.handle_command(Command::Start);
        sim.tick(STEP_MS, Controls::default());

        let (session, controller) = sim.parts_mut();
        let me = session.me.as_mut().unwrap();
        me.score = 4;
        me.lives = 1;
        controller.lose_life(session);
        assert_eq!(session.state, GameState::GameOver);

        for i in 2..=200 {
            sim.tick(i * STEP_MS, Controls::default());
        }
        let summary = sim.presenter().game_over().unwrap();
        assert_eq!(summary.score, 4);
        assert!(summary.new_record);
        assert_eq!(sim.session().best_score, 4);
    }
}

/// MULTIPLAYER MATCH TESTS
mod match_tests {
    use super::*;

    /// A timed two-peer match without cuts publishes results exactly once,
    /// tied scores keeping the host first
    #[test]
    fn timed_match_publishes_results_once() {
        let mut room = Room::new(1, Some(60));
        room.start();
        assert_eq!(room.peers[1].session().state, GameState::Playing);
        assert_eq!(room.peers[1].session().duration_secs, Some(60));

        // Fly apart so the strings never meet
        let apart = |i: usize| steer(i == 0);
        room.run_for(55_000, apart);
        assert_eq!(room.host().session().state, GameState::Playing);

        room.run_for(6_000, apart);
        assert_eq!(room.host().session().state, GameState::Winner);
        room.run_for(3_000, apart);

        let messages = room.drain();
        let published: Vec<&Message> = messages
            .iter()
            .filter(|(from, message)| *from == HOST_ID && message.kind() == "MATCH_RESULTS")
            .map(|(_, message)| message)
            .collect();
        assert_eq!(published.len(), 1);

        let Message::MatchResults { results } = published[0] else {
            panic!("expected match results");
        };
        let names: Vec<&str> = results.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Host", "Kiran"]);
        assert!(results.iter().all(|entry| entry.score == 0 && !entry.dead));

        let guest = &room.peers[1];
        assert_eq!(guest.session().state, GameState::Winner);
        assert_eq!(guest.presenter().results(), Some(results.as_slice()));
    }

    /// Once only the host has lives left, results follow after the grace
    /// period with the survivor first despite a lower score
    #[test]
    fn sole_survivor_ranks_first() {
        let mut room = Room::new(2, None);
        room.start();

        room.peers[1].parts_mut().0.me.as_mut().unwrap().score = 5;
        room.run_for(3 * STEP_MS, |_| Controls::default());

        for index in [1, 2] {
            let (session, controller) = room.peers[index].parts_mut();
            session.me.as_mut().unwrap().lives = 1;
            controller.lose_life(session);
        }
        room.run_for(2 * STEP_MS, |_| Controls::default());

        let host = room.host().session();
        assert_eq!(host.survivors(), 1);
        assert!(host.finalize_armed);

        room.run_for(1_000, |_| Controls::default());
        assert_eq!(room.host().session().state, GameState::Playing);

        room.run_for(1_500, |_| Controls::default());
        assert_eq!(room.host().session().state, GameState::Winner);

        let results = room.host().presenter().results().unwrap();
        let names: Vec<&str> = results.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Host", "Kiran", "Meera"]);
        assert_eq!(results[1].score, 5);
        assert!(results[1].dead && results[2].dead);

        for guest in &room.peers[1..] {
            assert_eq!(guest.session().state, GameState::Winner);
            assert_eq!(guest.presenter().results(), Some(results));
        }
    }

    /// A guest joining a running match goes straight into play with no limit
    #[test]
    fn late_joiner_starts_immediately() {
        let mut room = Room::new(1, Some(60));
        room.start();

        let mut transport = room.hub.endpoint("late");
        transport.connect("host").unwrap();
        room.peers
            .push(peer(GameMode::Guest, "Tara", Box::new(transport), 99));
        room.run_for(5 * STEP_MS, |_| Controls::default());

        let late = &room.peers[2];
        assert_eq!(late.session().state, GameState::Playing);
        assert_eq!(late.session().duration_secs, None);
        assert!(late.session().me.is_some());
        assert!(!late.presenter().notices().contains(&"WAITING FOR HOST..."));

        // The running guest sees the late joiner's kite
        let late_id = room.guest_id(2);
        assert!(room.peers[1].session().peers.contains(late_id));
    }

    /// Losing the final life broadcasts DIED once and never a fresh snapshot
    #[test]
    fn final_life_loss_is_permanent() {
        let mut room = Room::new(1, None);
        room.start();
        room.run_for(5 * STEP_MS, |_| Controls::default());
        room.drain();

        let guest_id = room.guest_id(1);
        {
            let (session, controller) = room.peers[1].parts_mut();
            session.me.as_mut().unwrap().lives = 1;
            controller.lose_life(session);

            let me = session.me.as_ref().unwrap();
            assert!(me.kite.dead);
            assert_eq!(me.lives, 0);
            assert!(!session.scheduler.is_pending(&Deferred::Respawn));
            assert!(session
                .outbox()
                .iter()
                .all(|outgoing| !matches!(outgoing, Outgoing::Broadcast(Message::Update(_)))));
        }

        room.run_for(3_000, |_| Controls::default());

        let messages = room.drain();
        assert_eq!(kinds_from(&messages, guest_id), vec!["DIED"]);

        let guest = room.peers[1].session();
        assert!(guest.me.as_ref().unwrap().kite.dead);
        assert_eq!(guest.state, GameState::Winner);

        let seen_by_host = room.host().session().peers.get(guest_id).unwrap();
        assert_eq!(seen_by_host.lives, 0);
        assert!(seen_by_host.kite.dead);
    }

    /// A rematch returns everyone to the lobby with the roster intact
    #[test]
    fn rematch_keeps_the_room() {
        let mut room = Room::new(1, Some(1));
        room.start();
        room.run_for(1_500, |i| steer(i == 0));
        assert_eq!(room.host().session().state, GameState::Winner);

        room.peers[0].handle_command(Command::Rematch);
        room.run_for(2 * STEP_MS, |_| Controls::default());

        for peer in &room.peers {
            assert_eq!(peer.session().state, GameState::Waiting);
            assert_eq!(peer.session().roster.len(), 2);
            assert!(peer.session().peers.is_empty());
        }

        room.start();
        assert!(room.peers.iter().all(|peer| peer.session().state == GameState::Playing));
    }
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use game::sync;

    /// The host's roster reaches every guest unchanged
    #[test]
    fn roster_round_trip() {
        let room = Room::new(2, None);

        let host_roster = room.host().session().roster.to_vec();
        let names: Vec<&str> = host_roster.iter().map(|entry| entry.profile.name.as_str()).collect();
        assert_eq!(names, vec!["Host", "Kiran", "Meera"]);

        for guest in &room.peers[1..] {
            assert_eq!(guest.session().roster.to_vec(), host_roster);
            assert_eq!(guest.session().state, GameState::Waiting);
        }
    }

    /// Applying the same snapshot twice leaves the peer table unchanged
    #[test]
    fn update_is_idempotent() {
        let mut session = Session::new(GameMode::Guest, profile("Meera"), quiet_config());
        let mut controller = MatchController::new(Some(3));
        session.my_id = Some(3);
        session.host_id = Some(HOST_ID);
        session.state = GameState::Playing;

        let update = KiteUpdate {
            id: 2,
            x: Some(50.0),
            y: Some(60.0),
            dead: Some(false),
            score: Some(2),
            secret: Some("kite runner".to_string()),
            lives: Some(2),
        };

        for _ in 0..2 {
            sync::handle_event(
                &mut session,
                &mut controller,
                TransportEvent::Data {
                    from: 2,
                    message: Message::Update(update.clone()),
                },
            );
        }

        assert_eq!(session.peers.len(), 1);
        let peer = session.peers.get(2).unwrap();
        assert_eq!(peer.kite.position, Vec2::new(50.0, 60.0));
        assert_eq!(peer.score, 2);
        assert_eq!(peer.lives, 2);

        // Lives never climb back
        let mut revived = update.clone();
        revived.lives = Some(3);
        sync::handle_event(
            &mut session,
            &mut controller,
            TransportEvent::Data {
                from: 2,
                message: Message::Update(revived),
            },
        );
        assert_eq!(session.peers.get(2).unwrap().lives, 2);
    }
}

/// UDP TESTS
mod udp_tests {
    use super::*;
    use transport::UdpTransport;

    async fn tick_until(peers: &mut [Peer], now_ms: &mut u64, done: impl Fn(&[Peer]) -> bool) -> bool {
        let waited = timeout(Duration::from_secs(3), async {
            while !done(&*peers) {
                *now_ms += STEP_MS;
                for peer in peers.iter_mut() {
                    peer.tick(*now_ms, Controls::default());
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        waited.is_ok()
    }

    /// A guest joins a hosted room over loopback and follows the host into play
    #[tokio::test]
    async fn room_over_loopback() {
        let host_transport = UdpTransport::host("127.0.0.1:0", 3).await.unwrap();
        let host_addr = host_transport.local_addr().to_string();
        let mut guest_transport = UdpTransport::guest("127.0.0.1:0").await.unwrap();
        tokio_test::assert_ok!(guest_transport.connect(&host_addr));

        let mut peers = vec![
            peer(GameMode::Host, "Host", Box::new(host_transport), 1),
            peer(GameMode::Guest, "Kiran", Box::new(guest_transport), 2),
        ];
        let mut now_ms = 0;

        let joined = tick_until(&mut peers, &mut now_ms, |peers| {
            peers[1].session().state == GameState::Waiting && peers[0].session().roster.len() == 2
        })
        .await;
        assert!(joined, "guest never reached the lobby");
        assert_eq!(peers[1].session().host_id, Some(HOST_ID));

        peers[0].handle_command(Command::Start);
        let started = tick_until(&mut peers, &mut now_ms, |peers| {
            peers[1].session().state == GameState::Playing && peers[0].session().peers.len() == 1
        })
        .await;
        assert!(started, "guest never started");
        assert!(peers[1].session().peers.contains(HOST_ID));
    }
}
