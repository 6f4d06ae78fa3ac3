//! Cut detection between our kite and an opposing kite.
//!
//! A body cuts a string when it comes within the cutting radius of any cuttable
//! node of that string. Evaluation is local-player-centric: each client only judges
//! outcomes involving its own kite and broadcasts its verdict.

use crate::kite::{Kite, PlayerKite, Tail};
use crate::{Vec2, CUT_RADIUS_SQUARED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutOutcome {
    /// Our body crossed their string.
    ICutThem,
    /// Their body crossed our string.
    TheyCutMe,
}

pub fn body_crosses_string(body: Vec2, string: &Tail) -> bool {
    string
        .cuttable_nodes()
        .iter()
        .any(|node| body.distance_squared(*node) < CUT_RADIUS_SQUARED)
}

/// Resolves one pairing of our kite against an opponent.
///
/// The attacker test runs first, so when both bodies sit on each other's strings
/// the outcome is always [`CutOutcome::ICutThem`].
pub fn resolve_cut(me: &PlayerKite, opponent: &Kite) -> Option<CutOutcome> {
    if me.is_invulnerable() || me.kite.dead || opponent.dead {
        return None;
    }

    if body_crosses_string(me.kite.position, &opponent.tail) {
        return Some(CutOutcome::ICutThem);
    }

    if body_crosses_string(opponent.position, &me.kite.tail) {
        return Some(CutOutcome::TheyCutMe);
    }

    None
}
