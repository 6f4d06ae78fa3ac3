//! Message contract exchanged between match participants.

use serde::{Deserialize, Serialize};

use crate::kite::PlayerKite;

/// Identifier a transport assigns to each participant.
pub type PeerId = u32;

/// Longest display name a profile keeps, in bytes.
pub const MAX_NAME_BYTES: usize = 24;
/// Longest secret a profile keeps, in bytes.
pub const MAX_SECRET_BYTES: usize = 96;

/// What a player chose before joining: shown to everyone except the secret,
/// which is only revealed when the player is eliminated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub color: String,
    pub secret: String,
}

impl PlayerProfile {
    /// Cuts name and secret down to their limits on a char boundary. A color
    /// that is not `#rrggbb` is dropped.
    pub fn clamped(mut self) -> Self {
        truncate_at_boundary(&mut self.name, MAX_NAME_BYTES);
        truncate_at_boundary(&mut self.secret, MAX_SECRET_BYTES);
        if !is_hex_color(&self.color) {
            self.color.clear();
        }
        self
    }
}

pub fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn truncate_at_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

/// One lobby roster line, as kept by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: PeerId,
    pub profile: PlayerProfile,
    pub ready: bool,
}

/// Snapshot of the sender's kite. Absent fields leave the receiver's copy as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KiteUpdate {
    pub id: PeerId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub dead: Option<bool>,
    pub score: Option<u32>,
    pub secret: Option<String>,
    pub lives: Option<u8>,
}

impl KiteUpdate {
    /// Update carrying only the sender id.
    pub fn empty(id: PeerId) -> Self {
        Self {
            id,
            x: None,
            y: None,
            dead: None,
            score: None,
            secret: None,
            lives: None,
        }
    }

    /// Full snapshot of our own kite.
    pub fn snapshot(id: PeerId, kite: &PlayerKite) -> Self {
        Self {
            id,
            x: Some(kite.kite.position.x),
            y: Some(kite.kite.position.y),
            dead: Some(kite.kite.dead),
            score: Some(kite.score),
            secret: Some(kite.secret.clone()),
            lives: Some(kite.lives),
        }
    }
}

/// Final standing of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub name: String,
    pub secret: String,
    pub score: u32,
    pub dead: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Update(KiteUpdate),
    /// Tells the target it lost a life to the sender.
    Kill { target_id: PeerId },
    /// The sender is out of lives.
    Died { id: PeerId, secret: String },
    /// Guest to host profile registration.
    PlayerInfo(PlayerProfile),
    /// Host to guest roster, with a late-join hint.
    PlayerList {
        players: Vec<RosterEntry>,
        game_started: bool,
    },
    /// Host to guest match start. `None` means no time limit.
    Start { duration: Option<u32> },
    MatchResults { results: Vec<ResultEntry> },
    Rematch,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Update(_) => "UPDATE",
            Message::Kill { .. } => "KILL",
            Message::Died { .. } => "DIED",
            Message::PlayerInfo(_) => "PLAYER_INFO",
            Message::PlayerList { .. } => "PLAYER_LIST",
            Message::Start { .. } => "START",
            Message::MatchResults { .. } => "MATCH_RESULTS",
            Message::Rematch => "REMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec2;

    #[test]
    fn test_profile_is_clamped_on_char_boundary() {
        let profile = PlayerProfile {
            name: "é".repeat(MAX_NAME_BYTES),
            color: "orange".to_string(),
            secret: "s".repeat(MAX_SECRET_BYTES * 10),
        }
        .clamped();

        assert_eq!(profile.name.len(), MAX_NAME_BYTES);
        assert_eq!(profile.name.chars().count(), MAX_NAME_BYTES / 2);
        assert_eq!(profile.secret.len(), MAX_SECRET_BYTES);
        assert!(profile.color.is_empty());

        assert!(is_hex_color("#D41c6c"));
        assert!(!is_hex_color("#d41c6"));
        assert!(!is_hex_color("#d41c6g"));
    }

    #[test]
    fn test_snapshot_carries_every_field() {
        let profile = PlayerProfile {
            name: "Ravi".to_string(),
            color: "#76c61d".to_string(),
            secret: "afraid of pigeons".to_string(),
        };
        let mut kite = PlayerKite::new_local(Vec2::new(12.0, 34.0), &profile, 0);
        kite.score = 4;
        kite.lives = 2;

        let update = KiteUpdate::snapshot(9, &kite);
        assert_eq!(update.id, 9);
        assert_eq!(update.x, Some(12.0));
        assert_eq!(update.y, Some(34.0));
        assert_eq!(update.dead, Some(false));
        assert_eq!(update.score, Some(4));
        assert_eq!(update.secret.as_deref(), Some("afraid of pigeons"));
        assert_eq!(update.lives, Some(2));
    }

    #[test]
    fn test_empty_update_is_sparse() {
        let update = KiteUpdate::empty(3);
        assert_eq!(update.x, None);
        assert_eq!(update.lives, None);
        assert_eq!(update.secret, None);
    }

    #[test]
    fn test_player_list_survives_bincode() {
        let message = Message::PlayerList {
            players: vec![RosterEntry {
                id: 1,
                profile: PlayerProfile {
                    name: "Host".to_string(),
                    color: "#008b8b".to_string(),
                    secret: "s".to_string(),
                },
                ready: true,
            }],
            game_started: true,
        };

        let bytes = bincode::serialize(&message).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.kind(), "PLAYER_LIST");
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let result: Result<Message, _> = bincode::deserialize(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }
}
