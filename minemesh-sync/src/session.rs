//! Session state store: the shared game config and the (possibly absent)
//! running session.
//!
//! ```text
//!            start / session-start / session-sync
//!   ┌──────────┐ ────────────────────────────► ┌──────────┐
//!   │  absent  │                               │  active  │ ◄── update (LWW)
//!   │ (config) │ ◄──────────────────────────── │          │
//!   └──────────┘      end / session-end        └──────────┘
//! ```
//!
//! Local operations (`update_config`, `start`, `update_board`, `end`) are
//! atomic: they validate first and mutate only on success. Remote
//! applications (`apply_*`) never fail; they report what happened so the
//! dispatcher can log and notify.

use std::time::Duration;

use minemesh_board::Board;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const MIN_SIZE: u32 = 5;
pub const MAX_SIZE: u32 = 50;
pub const MIN_BOMBS: u32 = 2;
/// At most 35% of cells may be bombs
pub const MAX_BOMB_RATIO: f64 = 0.35;

/// Which preset produced a config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Beginner,
    Intermediate,
    Expert,
    Custom,
}

impl Preset {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "expert" => Some(Self::Expert),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub enabled: bool,
    pub minutes: u32,
    pub seconds: u32,
}

impl TimerConfig {
    pub fn minutes(minutes: u32) -> Self {
        Self {
            enabled: true,
            minutes,
            seconds: 0,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// Board dimensions, bomb count and timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(rename = "selectedPreset")]
    pub preset: Preset,
    pub width: u32,
    pub height: u32,
    pub bombs: u32,
    pub timer: TimerConfig,
}

impl SessionConfig {
    /// Config for a named preset. `Custom` starts from the beginner values.
    pub fn preset(preset: Preset) -> Self {
        let (width, height, bombs, minutes) = match preset {
            Preset::Beginner | Preset::Custom => (9, 9, 10, 5),
            Preset::Intermediate => (16, 16, 40, 10),
            Preset::Expert => (30, 16, 99, 15),
        };
        Self {
            preset,
            width,
            height,
            bombs,
            timer: TimerConfig::minutes(minutes),
        }
    }

    /// Custom board with the given dimensions.
    pub fn custom(width: u32, height: u32, bombs: u32, timer: TimerConfig) -> Self {
        Self {
            preset: Preset::Custom,
            width,
            height,
            bombs,
            timer,
        }
    }

    pub fn max_bombs(&self) -> u32 {
        ((self.width * self.height) as f64 * MAX_BOMB_RATIO).floor() as u32
    }

    /// Time limit, if the timer is enabled.
    pub fn time_limit(&self) -> Option<Duration> {
        self.timer
            .enabled
            .then(|| Duration::from_secs(self.timer.minutes as u64 * 60 + self.timer.seconds as u64))
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let invalid = |msg: String| Err(SyncError::InvalidConfig(msg));
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.width) {
            return invalid(format!("width must be between {MIN_SIZE} and {MAX_SIZE}"));
        }
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.height) {
            return invalid(format!("height must be between {MIN_SIZE} and {MAX_SIZE}"));
        }
        let max_bombs = self.max_bombs();
        if !(MIN_BOMBS..=max_bombs).contains(&self.bombs) {
            return invalid(format!("bombs must be between {MIN_BOMBS} and {max_bombs}"));
        }
        if self.timer.enabled {
            if self.timer.minutes > 99 {
                return invalid("minutes must be between 0 and 99".into());
            }
            if self.timer.seconds > 59 {
                return invalid("seconds must be between 0 and 59".into());
            }
            if self.timer.minutes == 0 && self.timer.seconds == 0 {
                return invalid("timer must have a value".into());
            }
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::preset(Preset::Beginner)
    }
}

/// A running game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub config: SessionConfig,
    pub board: Board,
    pub started: bool,
    /// Starter's clock when the session began, in milliseconds
    #[serde(default)]
    pub started_at: u64,
    /// Millisecond timestamp of the board currently held
    pub last_update: u64,
}

/// Result of applying a remote config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigApply {
    Applied,
    Unchanged,
    /// A session is active; the config was ignored
    Conflict,
}

/// Result of applying a remote board update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardApply {
    Applied,
    /// Timestamp older than the stored board
    Stale { stored: u64 },
    NoSession,
}

/// Result of adopting a bootstrap snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncApply {
    /// No session was active
    Started,
    /// A session with another start time replaced ours
    Restarted,
    /// Same session, newer or equally stamped board
    Updated,
    /// Identical to the session we hold
    Unchanged,
    Stale { stored: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    config: SessionConfig,
    state: Option<SessionState>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Replace the config. Only valid while no session is active.
    pub fn update_config(&mut self, config: SessionConfig) -> Result<(), SyncError> {
        if self.is_active() {
            return Err(SyncError::SessionActive);
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Start a session with `config` and its initial board.
    pub fn start(&mut self, config: SessionConfig, board: Board, now: u64) -> Result<&SessionState, SyncError> {
        if self.is_active() {
            return Err(SyncError::AlreadyStarted);
        }
        config.validate()?;
        self.config = config;
        Ok(self.state.insert(SessionState {
            config,
            board,
            started: true,
            started_at: now,
            last_update: now,
        }))
    }

    /// Replace the board, returning the timestamp it was stamped with.
    ///
    /// The stamp is `max(now, stored + 1)` so a local update always wins
    /// against the board it replaces, even if a peer's clock ran ahead.
    pub fn update_board(&mut self, board: Board, now: u64) -> Result<u64, SyncError> {
        let state = self.state.as_mut().ok_or(SyncError::NoActiveSession)?;
        let stamp = now.max(state.last_update + 1);
        state.board = board;
        state.last_update = stamp;
        Ok(stamp)
    }

    /// Drop the session. Returns `false` if there was none.
    pub fn end(&mut self) -> bool {
        self.state.take().is_some()
    }

    pub fn apply_config(&mut self, config: SessionConfig) -> ConfigApply {
        if self.config == config {
            return ConfigApply::Unchanged;
        }
        if self.is_active() {
            return ConfigApply::Conflict;
        }
        self.config = config;
        ConfigApply::Applied
    }

    /// Remote start. Replaces any active session.
    pub fn apply_start(&mut self, config: SessionConfig, board: Board, timestamp: u64) -> bool {
        let replaced = self.state.is_some();
        self.config = config;
        self.state = Some(SessionState {
            config,
            board,
            started: true,
            started_at: timestamp,
            last_update: timestamp,
        });
        replaced
    }

    /// Last-write-wins: equal timestamps are accepted.
    pub fn apply_update(&mut self, board: Board, timestamp: u64) -> BoardApply {
        match self.state.as_mut() {
            None => BoardApply::NoSession,
            Some(state) if timestamp < state.last_update => BoardApply::Stale {
                stored: state.last_update,
            },
            Some(state) => {
                state.board = board;
                state.last_update = timestamp;
                BoardApply::Applied
            }
        }
    }

    pub fn apply_end(&mut self) -> bool {
        self.end()
    }

    /// Adopt a bootstrap snapshot if we have no session or it is not older.
    pub fn apply_sync(&mut self, snapshot: SessionState) -> SyncApply {
        let outcome = match &self.state {
            None => SyncApply::Started,
            Some(current) if snapshot.last_update < current.last_update => {
                return SyncApply::Stale {
                    stored: current.last_update,
                }
            }
            Some(current) if *current == snapshot => return SyncApply::Unchanged,
            Some(current) if current.started_at != snapshot.started_at => SyncApply::Restarted,
            Some(_) => SyncApply::Updated,
        };
        self.config = snapshot.config;
        self.state = Some(snapshot);
        outcome
    }
}
