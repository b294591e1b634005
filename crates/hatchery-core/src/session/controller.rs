//! Focus session state machine.
//!
//! The controller is driven from the outside: the host calls `tick()` about
//! once per second while [`SessionController::wants_ticks`] is true, and
//! forwards user intents (`begin`, `select_*`, `start`, `pause`, `resume`,
//! `forfeit`). There is no internal thread.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Selecting -> Running <-> Paused
//!                         |          |
//!                         v          v
//!                     Completed   Forfeited
//!                         |          |
//!                         +--> Idle <+
//! ```
//!
//! The countdown is derived from a target end timestamp rather than counted
//! down per tick, so suspended timers (e.g. while the app is backgrounded)
//! do not make it drift.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::state::{remaining_until, Completion, ForfeitReason, Session, SessionStatus};
use crate::clock::Clock;
use crate::error::{ExhaustedError, Result, ValidationError};
use crate::events::Event;
use crate::remote::SessionOutbox;
use crate::reward::RewardCalculator;
use crate::storage::{PendingSession, TimerConfig};
use crate::unlock::{CommitOutcome, UnlockSequenceStore};

/// Owns the live session and couples its completion to the unlock ledger,
/// the reward calculator and the outbox.
pub struct SessionController {
    clock: Arc<dyn Clock>,
    timer: TimerConfig,
    ledger: UnlockSequenceStore,
    outbox: SessionOutbox,
    rewards: RewardCalculator,
    session: Option<Session>,
}

impl SessionController {
    pub fn new(
        clock: Arc<dyn Clock>,
        timer: TimerConfig,
        ledger: UnlockSequenceStore,
        outbox: SessionOutbox,
    ) -> Self {
        Self {
            clock,
            timer,
            ledger,
            outbox,
            rewards: RewardCalculator::new(),
            session: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn remaining_secs(&self) -> u64 {
        self.session.as_ref().map(|s| s.remaining_secs).unwrap_or(0)
    }

    pub fn ledger(&self) -> &UnlockSequenceStore {
        &self.ledger
    }

    pub fn outbox(&self) -> &SessionOutbox {
        &self.outbox
    }

    pub fn timer_config(&self) -> &TimerConfig {
        &self.timer
    }

    /// Current time on the controller's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Next item the user may commit to.
    pub fn next_available(&self) -> Result<u32, ExhaustedError> {
        self.ledger.next_available()
    }

    /// Whether the host should keep delivering ticks.
    pub fn wants_ticks(&self) -> bool {
        self.status() == SessionStatus::Running
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        let session = self.session.as_ref();
        Event::StateSnapshot {
            status: self.status(),
            item_id: session.and_then(|s| s.chosen_item_id),
            duration_secs: session.map(|s| s.duration_secs).unwrap_or(0),
            remaining_secs: self.remaining_secs(),
            progress_pct: session.map(|s| s.progress() * 100.0).unwrap_or(0.0),
            at: self.clock.now(),
        }
    }

    // ── Startup ──────────────────────────────────────────────────────

    /// Repair the ledger from outbox entries whose unlock write was lost,
    /// then retry any outstanding ledger write. Call once at startup.
    ///
    /// Returns the ids that were re-claimed.
    pub fn reconcile_local(&mut self) -> Vec<u32> {
        let healed = match self.outbox.pending() {
            Ok(pending) => self.ledger.heal_from(pending.iter().map(|p| p.item_id)),
            Err(e) => {
                tracing::warn!(error = %e, "could not read outbox during reconciliation");
                Vec::new()
            }
        };
        if let Err(e) = self.ledger.flush() {
            tracing::warn!(error = %e, "unlock ledger still not persisted");
        }
        healed
    }

    // ── Selection ────────────────────────────────────────────────────

    /// Idle -> Selecting.
    pub fn begin(&mut self) -> Result<Event> {
        match self.status() {
            SessionStatus::Idle | SessionStatus::Forfeited => {
                let next_item_id = match self.ledger.ensure_loaded() {
                    Ok(()) => self.ledger.next_available().ok(),
                    Err(e) => {
                        tracing::warn!(error = %e, "unlock ledger unreadable at begin");
                        None
                    }
                };
                self.session = Some(Session::selecting());
                tracing::debug!("session selection began");
                Ok(Event::SessionBegan {
                    next_item_id,
                    at: self.clock.now(),
                })
            }
            status => Err(self.reject_in("begin a session", status).into()),
        }
    }

    pub fn select_duration(&mut self, minutes: u32) -> Result<Event> {
        self.ensure_selecting("select a duration")?;
        let (min, max) = (self.timer.min_minutes, self.timer.max_minutes);
        if minutes < min || minutes > max {
            return Err(ValidationError::InvalidDuration { minutes, min, max }.into());
        }

        let duration_secs = u64::from(minutes) * u64::from(self.timer.seconds_per_minute);
        let session = self.selecting_mut()?;
        session.duration_minutes = Some(minutes);
        session.duration_secs = duration_secs;
        session.remaining_secs = duration_secs;
        Ok(Event::DurationSelected {
            minutes,
            duration_secs,
            at: self.clock.now(),
        })
    }

    /// Commit to unlocking `item_id`. Only the next available item is accepted.
    pub fn select_item(&mut self, item_id: u32) -> Result<Event> {
        self.ensure_selecting("select an item")?;
        self.ledger.ensure_loaded()?;
        let expected = self.ledger.next_available()?;
        if item_id != expected {
            tracing::debug!(item_id, expected, "rejected out-of-order selection");
            return Err(ValidationError::OutOfOrder {
                requested: item_id,
                expected,
            }
            .into());
        }

        self.selecting_mut()?.chosen_item_id = Some(item_id);
        Ok(Event::ItemSelected {
            item_id,
            at: self.clock.now(),
        })
    }

    /// Attach (or clear) an external to-do reference.
    pub fn link_task(&mut self, task_id: Option<i64>) -> Result<Event> {
        self.ensure_selecting("link a task")?;
        self.selecting_mut()?.linked_task_id = task_id;
        Ok(Event::TaskLinked {
            task_id,
            at: self.clock.now(),
        })
    }

    /// Selecting -> Idle without starting.
    pub fn cancel(&mut self) -> Result<Event> {
        self.ensure_selecting("cancel")?;
        self.session = None;
        Ok(Event::SessionCancelled {
            at: self.clock.now(),
        })
    }

    // ── Countdown ────────────────────────────────────────────────────

    /// Selecting -> Running.
    pub fn start(&mut self) -> Result<Event> {
        self.ensure_selecting("start")?;
        self.ledger.ensure_loaded()?;
        let now = self.clock.now();
        let expected = self.ledger.next_available()?;

        let session = self.selecting_mut()?;
        let minutes = session
            .duration_minutes
            .ok_or(ValidationError::IncompleteSelection { missing: "duration" })?;
        let item_id = session
            .chosen_item_id
            .ok_or(ValidationError::IncompleteSelection { missing: "item" })?;
        if item_id != expected {
            return Err(ValidationError::OutOfOrder {
                requested: item_id,
                expected,
            }
            .into());
        }

        let ends_at = now + secs(session.duration_secs);
        session.status = SessionStatus::Running;
        session.remaining_secs = session.duration_secs;
        session.started_at = Some(now);
        session.ends_at = Some(ends_at);

        tracing::info!(item_id, minutes, duration_secs = session.duration_secs, "session started");
        Ok(Event::SessionStarted {
            item_id,
            duration_secs: session.duration_secs,
            ends_at,
            at: now,
        })
    }

    /// Call periodically. Returns `Some(Event::SessionCompleted)` exactly once,
    /// when the countdown reaches zero. A no-op in every status but Running.
    pub fn tick(&mut self) -> Option<Event> {
        self.refresh()
    }

    /// Recompute the countdown after returning to the foreground. The
    /// session may complete here if its end passed while suspended.
    pub fn resync(&mut self) -> Option<Event> {
        let event = self.refresh();
        tracing::debug!(remaining_secs = self.remaining_secs(), "session resynced");
        event
    }

    /// Running -> Paused.
    pub fn pause(&mut self) -> Result<Event> {
        match self.status() {
            SessionStatus::Running => {}
            SessionStatus::Idle | SessionStatus::Selecting => {
                return Err(ValidationError::NoActiveSession.into())
            }
            status => return Err(self.reject_in("pause", status).into()),
        }

        // Time may have run out since the last tick.
        if let Some(done) = self.refresh() {
            return Ok(done);
        }

        let now = self.clock.now();
        let session = self.active_mut()?;
        session.status = SessionStatus::Paused;
        session.ends_at = None;
        tracing::debug!(remaining_secs = session.remaining_secs, "session paused");
        Ok(Event::SessionPaused {
            remaining_secs: session.remaining_secs,
            at: now,
        })
    }

    /// Paused -> Running.
    pub fn resume(&mut self) -> Result<Event> {
        match self.status() {
            SessionStatus::Paused => {}
            SessionStatus::Idle | SessionStatus::Selecting => {
                return Err(ValidationError::NoActiveSession.into())
            }
            status => return Err(self.reject_in("resume", status).into()),
        }

        let now = self.clock.now();
        let session = self.active_mut()?;
        let ends_at = now + secs(session.remaining_secs);
        session.status = SessionStatus::Running;
        session.ends_at = Some(ends_at);
        tracing::debug!(remaining_secs = session.remaining_secs, "session resumed");
        Ok(Event::SessionResumed {
            remaining_secs: session.remaining_secs,
            ends_at,
            at: now,
        })
    }

    /// Running|Paused -> Forfeited -> Idle. No reward, no unlock.
    pub fn forfeit(&mut self, reason: ForfeitReason) -> Result<Event> {
        if !self.status().is_active() {
            return Err(ValidationError::NoActiveSession.into());
        }
        let now = self.clock.now();
        let session = self.active_mut()?;
        session.status = SessionStatus::Forfeited;
        let event = Event::SessionForfeited {
            item_id: session.chosen_item_id,
            remaining_secs: session.remaining_secs,
            reason,
            at: now,
        };
        tracing::info!(?reason, remaining_secs = session.remaining_secs, "session forfeited");
        self.session = None;
        Ok(event)
    }

    /// Completed -> Idle, once the user has seen the result.
    pub fn acknowledge(&mut self) -> Result<Event> {
        let status = self.status();
        let item_id = self
            .session
            .as_ref()
            .and_then(|s| s.completion.as_ref())
            .map(|c| c.item_id);
        match (status, item_id) {
            (SessionStatus::Completed, Some(item_id)) => {
                self.session = None;
                Ok(Event::SessionAcknowledged {
                    item_id,
                    at: self.clock.now(),
                })
            }
            (status, _) => Err(self.reject_in("acknowledge", status).into()),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Bring `remaining_secs` up to date and complete if it hit zero.
    fn refresh(&mut self) -> Option<Event> {
        let now = self.clock.now();
        let session = self.session.as_mut()?;
        if session.status != SessionStatus::Running {
            return None;
        }
        let ends_at = session.ends_at?;
        // Never count back up, even if the wall clock steps backwards.
        let remaining = remaining_until(ends_at, now).min(session.remaining_secs);
        session.remaining_secs = remaining;
        if remaining == 0 {
            return self.complete(now);
        }
        None
    }

    /// Running -> Completed. The status check at the top is the only gate:
    /// once it flips, nothing can complete this session again.
    fn complete(&mut self, now: DateTime<Utc>) -> Option<Event> {
        let session = self.session.as_mut()?;
        if session.status != SessionStatus::Running {
            return None;
        }
        session.status = SessionStatus::Completed;
        session.remaining_secs = 0;
        session.ends_at = None;

        let item_id = session.chosen_item_id?;
        let duration_minutes = session.duration_minutes.unwrap_or(0);
        let reward = self.rewards.reward(duration_minutes);

        let unlock_persisted = match self.ledger.commit_unlock(item_id) {
            Ok(CommitOutcome::Claimed { persisted }) => persisted,
            Ok(CommitOutcome::AlreadyClaimed) => !self.ledger.is_dirty(),
            Err(e) => {
                tracing::error!(item_id, error = %e, "completed session could not claim its item");
                false
            }
        };

        let pending = PendingSession {
            idempotency_key: uuid::Uuid::new_v4().to_string(),
            item_id,
            duration_minutes,
            task_id: session.linked_task_id,
            local_reward: reward,
            completed_at: now,
            attempts: 0,
            last_error: None,
        };
        if let Err(e) = self.outbox.enqueue(&pending) {
            tracing::error!(error = %e, "failed to queue completed session for recording");
        }

        session.completion = Some(Completion {
            item_id,
            duration_minutes,
            reward,
            unlock_persisted,
            pending: pending.clone(),
            completed_at: now,
        });

        tracing::info!(item_id, duration_minutes, reward, "session completed");
        Some(Event::SessionCompleted {
            item_id,
            duration_minutes,
            reward,
            unlock_persisted,
            pending,
            at: now,
        })
    }

    fn ensure_selecting(&self, action: &'static str) -> Result<(), ValidationError> {
        match self.status() {
            SessionStatus::Selecting => Ok(()),
            status => Err(self.reject_in(action, status)),
        }
    }

    fn reject_in(&self, action: &'static str, status: SessionStatus) -> ValidationError {
        if status.is_active() {
            ValidationError::SessionActive
        } else {
            ValidationError::InvalidTransition {
                action,
                status: status.as_str(),
            }
        }
    }

    fn selecting_mut(&mut self) -> Result<&mut Session, ValidationError> {
        let status = self.status();
        match self.session.as_mut() {
            Some(s) if s.status == SessionStatus::Selecting => Ok(s),
            _ => Err(ValidationError::InvalidTransition {
                action: "edit selection",
                status: status.as_str(),
            }),
        }
    }

    fn active_mut(&mut self) -> Result<&mut Session, ValidationError> {
        self.session
            .as_mut()
            .filter(|s| s.status.is_active())
            .ok_or(ValidationError::NoActiveSession)
    }
}

fn secs(n: u64) -> Duration {
    Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX))
}
