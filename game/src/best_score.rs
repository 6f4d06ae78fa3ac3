//! Single-player best score, persisted as a small JSON file.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestScore {
    pub best: u32,
}

/// Where the best score lives. A store without a path keeps nothing.
#[derive(Debug, Clone, Default)]
pub struct BestScoreStore {
    path: Option<PathBuf>,
}

impl BestScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }

    /// Reads the stored best, treating a missing or unreadable file as zero.
    pub fn load(&self) -> u32 {
        let Some(path) = &self.path else {
            return 0;
        };

        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(_) => {
                info!("No best score at {}, starting fresh", path.display());
                return 0;
            }
        };

        match serde_json::from_str::<BestScore>(&json) {
            Ok(score) => {
                info!("Loaded best score {}", score.best);
                score.best
            }
            Err(e) => {
                warn!("Ignoring corrupt best score file {}: {}", path.display(), e);
                0
            }
        }
    }

    pub fn save(&self, best: u32) {
        let Some(path) = &self.path else {
            return;
        };

        let json = match serde_json::to_string_pretty(&BestScore { best }) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode best score: {}", e);
                return;
            }
        };

        match fs::write(path, json) {
            Ok(()) => info!("Best score {} saved", best),
            Err(e) => warn!("Failed to save best score to {}: {}", path.display(), e),
        }
    }
}
