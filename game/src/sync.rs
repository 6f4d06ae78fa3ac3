//! Protocol reducer: turns transport events into session changes, and our own
//! kite into outbound snapshots.
//!
//! The host is the roster authority. It merges every `PLAYER_INFO` and
//! rebroadcasts the full list; guests adopt that list verbatim. Snapshots are
//! applied idempotently, and anything addressed to someone else, or arriving in a
//! state where it makes no sense, is dropped with a debug line.

use log::{debug, info, warn};
use shared::{KiteUpdate, Message, PeerId, PlayerProfile, RosterEntry, TransportEvent};

use crate::controller::MatchController;
use crate::session::{GameMode, GameState, Session};

pub fn handle_event(session: &mut Session, controller: &mut MatchController, event: TransportEvent) {
    match event {
        TransportEvent::Connected { self_id } => on_connected(session, controller, self_id),
        TransportEvent::PeerJoined { peer_id } => on_peer_joined(session, peer_id),
        TransportEvent::PeerLeft { peer_id } => on_peer_left(session, controller, peer_id),
        TransportEvent::Data { from, message } => handle_message(session, controller, from, message),
    }
}

fn on_connected(session: &mut Session, controller: &mut MatchController, self_id: PeerId) {
    info!("Transport ready, we are peer {}", self_id);
    session.my_id = Some(self_id);

    if session.mode == GameMode::Host {
        session.host_id = Some(self_id);
        session.roster.merge(self_id, session.profile.clone());

        let code = controller.room_code();
        info!("Room code {}", code);
        session.notice(format!("ROOM CODE: {}", code));
        session.room_code = Some(code);

        if session.state == GameState::Menu {
            session.state = GameState::Waiting;
        }
    }
}

fn on_peer_joined(session: &mut Session, peer_id: PeerId) {
    match session.mode {
        GameMode::Host => {
            info!("Peer {} joined the room", peer_id);
            let players = session.roster.to_vec();
            let game_started = session.state == GameState::Playing;
            session.send_to(peer_id, Message::PlayerList { players, game_started });
        }
        GameMode::Guest if session.host_id.is_none() => {
            info!("Linked to host {}", peer_id);
            session.host_id = Some(peer_id);
            let profile = session.profile.clone();
            session.send_to(peer_id, Message::PlayerInfo(profile));
        }
        _ => debug!("Peer {} linked", peer_id),
    }
}

fn on_peer_left(session: &mut Session, controller: &mut MatchController, peer_id: PeerId) {
    let lost_host =
        session.mode == GameMode::Guest && session.host_id.map_or(true, |host| host == peer_id);

    session.peers.remove(peer_id);
    session.roster.remove(peer_id);

    if lost_host {
        warn!("Lost the host (peer {})", peer_id);
        session.notice("HOST DISCONNECTED");
        return;
    }

    info!("Peer {} left", peer_id);
    session.notice("PEER DISCONNECTED");

    if session.is_host() {
        broadcast_roster(session);
        controller.check_win_condition(session);
    }
}

fn handle_message(
    session: &mut Session,
    controller: &mut MatchController,
    from: PeerId,
    message: Message,
) {
    debug!("{} from peer {}", message.kind(), from);

    match message {
        Message::Update(update) => on_update(session, controller, update),
        Message::Kill { target_id } => on_kill(session, controller, target_id),
        Message::Died { id, secret } => on_died(session, controller, id, secret),
        Message::PlayerInfo(profile) => on_player_info(session, from, profile),
        Message::PlayerList { players, game_started } => {
            on_player_list(session, controller, from, players, game_started)
        }
        Message::Start { duration } => on_start(session, controller, from, duration),
        Message::MatchResults { results } => {
            if session.is_host() || !matches!(session.state, GameState::Playing | GameState::GameOver) {
                debug!("Ignoring results in {:?}", session.state);
                return;
            }
            controller.show_results(session, results);
        }
        Message::Rematch => {
            if session.mode != GameMode::Guest || !from_host(session, from) || session.state == GameState::Menu {
                debug!("Ignoring rematch from peer {}", from);
                return;
            }
            controller.reset_for_rematch(session);
        }
    }
}

fn from_host(session: &Session, from: PeerId) -> bool {
    session.host_id == Some(from)
}

fn on_update(session: &mut Session, controller: &mut MatchController, update: KiteUpdate) {
    if session.state != GameState::Playing || session.my_id == Some(update.id) {
        return;
    }

    let outcome = session.peers.apply_update(&update, &session.roster);
    if outcome.created {
        info!("Peer {} is flying", update.id);
    }
    if outcome.lives_lost && session.is_host() {
        controller.check_win_condition(session);
    }
}

fn on_kill(session: &mut Session, controller: &mut MatchController, target_id: PeerId) {
    if session.my_id != Some(target_id) {
        debug!("KILL for peer {} is not for us", target_id);
        return;
    }
    controller.lose_life(session);
}

fn on_died(session: &mut Session, controller: &mut MatchController, id: PeerId, secret: String) {
    if session.my_id == Some(id) {
        return;
    }

    info!("Peer {} is out", id);
    session.notice(format!("PLAYER DIED! SECRET: \"{}\"", secret));
    if session.peers.mark_eliminated(id, &secret) && session.is_host() {
        controller.check_win_condition(session);
    }
}

fn on_player_info(session: &mut Session, from: PeerId, profile: PlayerProfile) {
    if !session.is_host() {
        debug!("Only the host keeps the roster");
        return;
    }

    if session.roster.merge(from, profile.clamped()) {
        info!("Registered peer {} ({} in room)", from, session.roster.len());
    }
    session.peers.reconcile(&session.roster);
    broadcast_roster(session);
}

fn on_player_list(
    session: &mut Session,
    controller: &mut MatchController,
    from: PeerId,
    players: Vec<RosterEntry>,
    game_started: bool,
) {
    if session.mode != GameMode::Guest || !from_host(session, from) {
        debug!("Ignoring roster from peer {}", from);
        return;
    }

    session.roster.adopt(players);
    session.peers.reconcile(&session.roster);

    if !matches!(session.state, GameState::Menu | GameState::Waiting) {
        return;
    }
    if game_started {
        info!("Match already running, joining late");
        session.duration_secs = None;
        controller.start_game(session);
    } else if session.state == GameState::Menu {
        session.state = GameState::Waiting;
        session.notice("WAITING FOR HOST...");
    }
}

fn on_start(session: &mut Session, controller: &mut MatchController, from: PeerId, duration: Option<u32>) {
    if session.mode != GameMode::Guest
        || !from_host(session, from)
        || !matches!(session.state, GameState::Menu | GameState::Waiting)
    {
        debug!("Ignoring START in {:?}", session.state);
        return;
    }

    session.duration_secs = duration.filter(|secs| *secs > 0);
    controller.start_game(session);
}

fn broadcast_roster(session: &mut Session) {
    let players = session.roster.to_vec();
    let game_started = session.state == GameState::Playing;
    session.broadcast(Message::PlayerList { players, game_started });
}

/// Broadcasts our kite while it is flying.
pub fn publish_snapshot(session: &mut Session) {
    if session.state != GameState::Playing {
        return;
    }
    let (Some(id), Some(me)) = (session.my_id, session.me.as_ref()) else {
        return;
    };
    if me.kite.dead {
        return;
    }

    let update = KiteUpdate::snapshot(id, me);
    session.broadcast(Message::Update(update));
}
