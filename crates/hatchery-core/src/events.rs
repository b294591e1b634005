use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{ForfeitReason, SessionStatus};
use crate::storage::PendingSession;

/// Every session state change produces an Event.
/// The presentation layer renders from them; the host forwards completions
/// to the remote recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionBegan {
        next_item_id: Option<u32>,
        at: DateTime<Utc>,
    },
    DurationSelected {
        minutes: u32,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    ItemSelected {
        item_id: u32,
        at: DateTime<Utc>,
    },
    TaskLinked {
        task_id: Option<i64>,
        at: DateTime<Utc>,
    },
    SessionStarted {
        item_id: u32,
        duration_secs: u64,
        ends_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    SessionPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        remaining_secs: u64,
        ends_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Countdown reached zero. Reward and unlock are already committed locally.
    ///
    /// `pending` is already queued in the outbox. The host submits it with
    /// `SessionOutbox::deliver` as soon as it sees this event; anything left
    /// undelivered is retried by `SessionOutbox::reconcile` at the next start.
    SessionCompleted {
        item_id: u32,
        duration_minutes: u32,
        reward: u32,
        unlock_persisted: bool,
        pending: PendingSession,
        at: DateTime<Utc>,
    },
    /// User dismissed the completion screen; controller is idle again.
    SessionAcknowledged {
        item_id: u32,
        at: DateTime<Utc>,
    },
    SessionForfeited {
        item_id: Option<u32>,
        remaining_secs: u64,
        reason: ForfeitReason,
        at: DateTime<Utc>,
    },
    /// Selection abandoned before starting.
    SessionCancelled {
        at: DateTime<Utc>,
    },
    StateSnapshot {
        status: SessionStatus,
        item_id: Option<u32>,
        duration_secs: u64,
        remaining_secs: u64,
        progress_pct: f64,
        at: DateTime<Utc>,
    },
}
