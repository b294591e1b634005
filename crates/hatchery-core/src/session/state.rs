use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::PendingSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Selecting,
    Running,
    Paused,
    /// Countdown finished; waiting for the user to acknowledge.
    Completed,
    /// Abandoned. Only ever observed in events: the session is discarded
    /// and the controller returns to `Idle` straight away.
    Forfeited,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Selecting => "selecting",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Forfeited => "forfeited",
        }
    }

    /// Running or paused: the states the interruption guard protects.
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }
}

/// Why a session was forfeited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForfeitReason {
    /// User confirmed leaving the session screen.
    Navigation,
    /// User confirmed a manual reset.
    Reset,
    /// Forfeit requested directly by presentation code.
    Explicit,
}

/// What a completed session produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub item_id: u32,
    pub duration_minutes: u32,
    pub reward: u32,
    /// False when the ledger write failed and will be retried.
    pub unlock_persisted: bool,
    /// Outbox entry to hand to the remote recorder.
    pub pending: PendingSession,
    pub completed_at: DateTime<Utc>,
}

/// The single live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub status: SessionStatus,
    pub duration_minutes: Option<u32>,
    /// Total length in wall-clock seconds; fixed once running.
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub chosen_item_id: Option<u32>,
    pub linked_task_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    /// Target end while running; `None` while paused.
    pub ends_at: Option<DateTime<Utc>>,
    pub completion: Option<Completion>,
}

impl Session {
    pub(crate) fn selecting() -> Self {
        Self {
            status: SessionStatus::Selecting,
            duration_minutes: None,
            duration_secs: 0,
            remaining_secs: 0,
            chosen_item_id: None,
            linked_task_id: None,
            started_at: None,
            ends_at: None,
            completion: None,
        }
    }

    /// 0.0 .. 1.0 elapsed fraction of the countdown.
    pub fn progress(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_secs as f64 / self.duration_secs as f64)
    }
}

/// Whole seconds left until `ends_at`, rounded up so the display never
/// reaches zero before the deadline.
pub(crate) fn remaining_until(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (ends_at - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms as u64).div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn remaining_rounds_up() {
        let now = Utc::now();
        assert_eq!(remaining_until(now + Duration::seconds(10), now), 10);
        assert_eq!(remaining_until(now + Duration::milliseconds(9_001), now), 10);
        assert_eq!(remaining_until(now + Duration::milliseconds(1), now), 1);
        assert_eq!(remaining_until(now, now), 0);
        assert_eq!(remaining_until(now - Duration::seconds(5), now), 0);
    }

    #[test]
    fn active_statuses() {
        assert!(SessionStatus::Running.is_active());
        assert!(SessionStatus::Paused.is_active());
        assert!(!SessionStatus::Selecting.is_active());
        assert!(!SessionStatus::Completed.is_active());
    }

    #[test]
    fn progress_of_fresh_session_is_zero() {
        assert_eq!(Session::selecting().progress(), 0.0);
    }
}
