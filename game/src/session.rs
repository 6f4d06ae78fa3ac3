//! The session context: everything one participant knows about the current match.
//!
//! A single [`Session`] is threaded through the controller, the protocol reducer
//! and the simulation loop. Outbound messages and presenter effects are queued on
//! it and flushed by the loop, which keeps every state change on one thread.

use log::debug;
use std::collections::BTreeSet;
use shared::{
    AmbientKite, Bird, Environment, KiteUpdate, Message, PeerId, PlayerKite, PlayerProfile,
    ResultEntry, RosterEntry, Vec2, MAX_LIVES,
};

use crate::config::GameConfig;
use crate::presenter::Effect;
use crate::scheduler::{Deferred, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Menu,
    /// Lobby before a multiplayer match, and the target of a rematch.
    Waiting,
    Playing,
    GameOver,
    Winner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Single,
    Host,
    Guest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Broadcast(Message),
    SendTo(PeerId, Message),
}

/// Lobby roster, kept in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a profile. Returns true for a newcomer.
    pub fn merge(&mut self, id: PeerId, profile: PlayerProfile) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.profile = profile;
                entry.ready = true;
                false
            }
            None => {
                self.entries.push(RosterEntry {
                    id,
                    profile,
                    ready: true,
                });
                true
            }
        }
    }

    /// Replaces the whole roster with the host's copy.
    pub fn adopt(&mut self, players: Vec<RosterEntry>) {
        self.entries = players;
    }

    /// Roster line of a participant, if it has registered.
    pub fn get(&self, id: PeerId) -> Option<&RosterEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn profile(&self, id: PeerId) -> Option<&PlayerProfile> {
        self.get(id).map(|entry| &entry.profile)
    }

    /// Drops a departed participant. Returns whether it was listed.
    pub fn remove(&mut self, id: PeerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Owned copy for a `PLAYER_LIST` broadcast.
    pub fn to_vec(&self) -> Vec<RosterEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What applying a snapshot changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub created: bool,
    pub lives_lost: bool,
}

/// Live kites of the other participants, in the order they were first seen.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    kites: Vec<PlayerKite>,
    /// Peers we cut whose owner has not yet acknowledged the lost life.
    cut_pending: BTreeSet<PeerId>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a peer's kite by its transport id.
    pub fn get(&self, id: PeerId) -> Option<&PlayerKite> {
        self.kites.iter().find(|kite| kite.peer_id == Some(id))
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut PlayerKite> {
        self.kites.iter_mut().find(|kite| kite.peer_id == Some(id))
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.get(id).is_some()
    }

    /// Peers in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerKite> {
        self.kites.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerKite> {
        self.kites.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.kites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kites.is_empty()
    }

    /// Forgets every peer, as on a rematch.
    pub fn clear(&mut self) {
        self.kites.clear();
        self.cut_pending.clear();
    }

    /// Forgets a departed peer, returning its last known kite.
    pub fn remove(&mut self, id: PeerId) -> Option<PlayerKite> {
        self.cut_pending.remove(&id);
        let index = self.kites.iter().position(|kite| kite.peer_id == Some(id))?;
        Some(self.kites.remove(index))
    }

    /// Participants that still have lives left.
    pub fn alive_count(&self) -> usize {
        self.kites.iter().filter(|kite| kite.lives > 0).count()
    }

    /// Applies a sparse snapshot, creating the peer's kite on first contact.
    ///
    /// Absent fields keep their value and lives never go up. A peer out of lives
    /// stays dead whatever the snapshot claims. So does a peer we cut, until a
    /// snapshot shows it lost the life or reports it dead.
    pub fn apply_update(&mut self, update: &KiteUpdate, roster: &Roster) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        let index = match self.kites.iter().position(|kite| kite.peer_id == Some(update.id)) {
            Some(index) => index,
            None => {
                let position = Vec2::new(update.x.unwrap_or_default(), update.y.unwrap_or_default());
                debug!("First snapshot from peer {}", update.id);
                self.kites
                    .push(PlayerKite::new_remote(update.id, position, roster.profile(update.id)));
                outcome.created = true;
                self.kites.len() - 1
            }
        };
        let peer = &mut self.kites[index];

        if let Some(x) = update.x {
            peer.kite.position.x = x;
        }
        if let Some(y) = update.y {
            peer.kite.position.y = y;
        }
        if let Some(score) = update.score {
            peer.score = score;
        }
        if let Some(secret) = &update.secret {
            peer.secret = secret.clone();
        }
        if let Some(lives) = update.lives {
            let lives = peer.lives.min(lives.min(MAX_LIVES));
            outcome.lives_lost = lives < peer.lives;
            peer.lives = lives;
        }
        if outcome.lives_lost || peer.lives == 0 || update.dead == Some(true) {
            self.cut_pending.remove(&update.id);
        }
        if peer.lives == 0 || self.cut_pending.contains(&update.id) {
            peer.kite.dead = true;
        } else if let Some(dead) = update.dead {
            peer.kite.dead = dead;
        }

        outcome
    }

    /// Records a peer's permanent elimination. Returns false for unknown ids.
    pub fn mark_eliminated(&mut self, id: PeerId, secret: &str) -> bool {
        self.cut_pending.remove(&id);
        match self.get_mut(id) {
            Some(peer) => {
                let lost = peer.lives > 0;
                peer.lives = 0;
                peer.kite.dead = true;
                if !secret.is_empty() {
                    peer.secret = secret.to_string();
                }
                lost
            }
            None => false,
        }
    }

    /// Hides a peer kite we just cut. Its owner decides what happens next, and
    /// snapshots sent before it heard of the cut cannot revive it.
    pub fn flag_cut(&mut self, id: PeerId) {
        if let Some(peer) = self.get_mut(id) {
            peer.kite.dead = true;
            self.cut_pending.insert(id);
        }
    }

    /// Whether a cut of this peer still awaits its owner's acknowledgement.
    pub fn is_cut_pending(&self, id: PeerId) -> bool {
        self.cut_pending.contains(&id)
    }

    /// Brings display fields in line with the roster.
    pub fn reconcile(&mut self, roster: &Roster) {
        for peer in &mut self.kites {
            let Some(id) = peer.peer_id else { continue };
            if let Some(profile) = roster.profile(id) {
                peer.name = profile.name.clone();
                peer.kite.color = profile.color.clone();
                if peer.secret.is_empty() {
                    peer.secret = profile.secret.clone();
                }
            }
        }
    }

    /// Peer strings are simulated locally from their reported body positions.
    pub fn follow_tails(&mut self, env: &Environment) {
        for peer in &mut self.kites {
            peer.follow_tail(env);
        }
    }
}

pub struct Session {
    pub config: GameConfig,
    pub state: GameState,
    pub mode: GameMode,
    pub my_id: Option<PeerId>,
    pub host_id: Option<PeerId>,
    pub profile: PlayerProfile,

    /// Bumped on every match boundary; timers from older generations are dropped.
    pub generation: u64,
    /// Set while the results grace timer is pending.
    pub finalize_armed: bool,
    /// Match length in seconds, `None` for no limit.
    pub duration_secs: Option<u32>,
    pub started_at_ms: u64,
    /// Clock of the current tick or event batch.
    pub now_ms: u64,

    pub me: Option<PlayerKite>,
    pub peers: PeerTable,
    pub roster: Roster,
    pub ambient: Vec<AmbientKite>,
    pub birds: Vec<Bird>,
    pub env: Environment,

    pub best_score: u32,
    /// Best score as it was when the match began.
    pub best_at_start: u32,
    pub room_code: Option<String>,
    pub last_results: Vec<ResultEntry>,

    pub scheduler: Scheduler,
    notice_seq: u64,
    outbox: Vec<Outgoing>,
    effects: Vec<Effect>,
}

impl Session {
    pub fn new(mode: GameMode, profile: PlayerProfile, config: GameConfig) -> Self {
        let env = Environment::new(config.bounds);
        Self {
            config,
            state: GameState::Menu,
            mode,
            my_id: None,
            host_id: None,
            profile,
            generation: 0,
            finalize_armed: false,
            duration_secs: None,
            started_at_ms: 0,
            now_ms: 0,
            me: None,
            peers: PeerTable::new(),
            roster: Roster::new(),
            ambient: Vec::new(),
            birds: Vec::new(),
            env,
            best_score: 0,
            best_at_start: 0,
            room_code: None,
            last_results: Vec::new(),
            scheduler: Scheduler::new(),
            notice_seq: 0,
            outbox: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn is_multiplayer(&self) -> bool {
        self.mode != GameMode::Single
    }

    pub fn is_host(&self) -> bool {
        self.mode == GameMode::Host
    }

    /// Queues a message for every peer. Single-player sessions send nothing.
    pub fn broadcast(&mut self, message: Message) {
        if self.is_multiplayer() {
            self.outbox.push(Outgoing::Broadcast(message));
        }
    }

    pub fn send_to(&mut self, peer_id: PeerId, message: Message) {
        if self.is_multiplayer() {
            self.outbox.push(Outgoing::SendTo(peer_id, message));
        }
    }

    pub fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Shows a notice and arms its dismissal.
    pub fn notice(&mut self, text: impl Into<String>) {
        self.notice_seq += 1;
        self.effects.push(Effect::Notice(text.into()));
        let due = self.now_ms + self.config.notice_lifetime_ms;
        self.scheduler
            .schedule_detached(Deferred::DismissNotice(self.notice_seq), due);
    }

    pub fn current_notice(&self) -> u64 {
        self.notice_seq
    }

    /// Pushes our score and lives to the scoreboard, tracking the best score.
    pub fn refresh_scoreboard(&mut self) {
        let Some(me) = &self.me else { return };
        let effect = Effect::Scoreboard {
            name: me.name.clone(),
            score: me.score,
            lives: me.lives,
        };
        if self.mode == GameMode::Single && me.score > self.best_score {
            self.best_score = me.score;
        }
        self.effects.push(effect);
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn outbox(&self) -> &[Outgoing] {
        &self.outbox
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.now_ms.saturating_sub(self.started_at_ms) / 1000
    }

    /// Participants with lives left, ourselves included.
    pub fn survivors(&self) -> usize {
        let me = self.me.as_ref().map_or(0, |me| usize::from(me.lives > 0));
        me + self.peers.alive_count()
    }

    /// Ends the current generation so pending match timers are dropped.
    pub fn next_generation(&mut self) {
        self.generation += 1;
        self.finalize_armed = false;
    }

    /// Drops in-match entities, keeping roster and connections.
    pub fn clear_match_entities(&mut self) {
        self.me = None;
        self.peers.clear();
        self.ambient.clear();
    }
}
