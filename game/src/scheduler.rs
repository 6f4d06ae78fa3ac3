//! Deferred tasks bound to a match generation.
//!
//! Every match-scoped timer records the generation it was armed in. When the
//! session moves on (new match, results, rematch) the generation is bumped and any
//! older timer is discarded the moment it comes due instead of firing.

use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// Bring our kite back after a lost life.
    Respawn,
    /// Publish the ranked results once the grace period is over.
    FinalizeResults,
    /// Present the end-of-match summary.
    ShowGameOver,
    /// Hide the notice with this sequence number, unless a newer one replaced it.
    DismissNotice(u64),
}

#[derive(Debug, Clone)]
struct Scheduled {
    due_ms: u64,
    /// `None` for timers that outlive a match.
    generation: Option<u64>,
    task: Deferred,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<Scheduled>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer that only fires while `generation` is still current.
    pub fn schedule(&mut self, task: Deferred, due_ms: u64, generation: u64) {
        self.pending.push(Scheduled {
            due_ms,
            generation: Some(generation),
            task,
        });
    }

    /// Arms a timer that fires regardless of match transitions.
    pub fn schedule_detached(&mut self, task: Deferred, due_ms: u64) {
        self.pending.push(Scheduled {
            due_ms,
            generation: None,
            task,
        });
    }

    /// Removes every timer due at `now_ms` and returns the live ones in due order.
    pub fn take_due(&mut self, now_ms: u64, generation: u64) -> Vec<Deferred> {
        let (mut due, pending): (Vec<Scheduled>, Vec<Scheduled>) =
            self.pending.drain(..).partition(|s| s.due_ms <= now_ms);
        self.pending = pending;

        due.sort_by_key(|s| s.due_ms);
        due.into_iter()
            .filter(|s| match s.generation {
                Some(armed) if armed != generation => {
                    debug!("Dropping stale {:?} from generation {}", s.task, armed);
                    false
                }
                _ => true,
            })
            .map(|s| s.task)
            .collect()
    }

    pub fn is_pending(&self, task: &Deferred) -> bool {
        self.pending.iter().any(|s| &s.task == task)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
