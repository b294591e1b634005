//! Durable queue of completed sessions awaiting backend acknowledgement.
//!
//! Each completed session gets a client-generated idempotency key and is
//! written to `pending_sessions` before any remote call. A delivery removes
//! the row only once the backend accepts it, so a crash or network failure
//! leaves it in place for [`SessionOutbox::reconcile`] at the next start.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{CompleteSessionRequest, RemoteSessionRecorder};
use crate::error::{DatabaseError, RecorderError};
use crate::storage::{Database, PendingSession};

/// A session the backend has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedSession {
    pub idempotency_key: String,
    pub item_id: u32,
    pub local_reward: u32,
    /// Server-authoritative amount.
    pub coins_earned: u32,
}

impl RecordedSession {
    /// Whether the backend granted a different amount than was shown locally.
    pub fn diverges(&self) -> bool {
        self.coins_earned != self.local_reward
    }
}

/// Outcome of a startup reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub delivered: Vec<RecordedSession>,
    /// `(idempotency_key, error)` for sessions still pending.
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cheap to clone; clones share the same database.
#[derive(Clone)]
pub struct SessionOutbox {
    db: Arc<Database>,
}

impl SessionOutbox {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn enqueue(&self, pending: &PendingSession) -> Result<(), DatabaseError> {
        self.db.insert_pending(pending)?;
        tracing::debug!(key = %pending.idempotency_key, item_id = pending.item_id, "session queued for recording");
        Ok(())
    }

    /// Sessions not yet acknowledged, oldest first.
    pub fn pending(&self) -> Result<Vec<PendingSession>, DatabaseError> {
        self.db.list_pending()
    }

    /// Submit one session.
    ///
    /// On success the row is removed; on failure the attempt is recorded and
    /// the row stays for a later retry. Local state is never rolled back.
    pub async fn deliver<R>(
        &self,
        recorder: &R,
        pending: &PendingSession,
    ) -> Result<RecordedSession, RecorderError>
    where
        R: RemoteSessionRecorder,
    {
        let request = CompleteSessionRequest {
            duration_minutes: pending.duration_minutes,
            task_id: pending.task_id,
            idempotency_key: pending.idempotency_key.clone(),
        };

        match recorder.complete_session(&request).await {
            Ok(response) => {
                if let Err(e) = self.db.delete_pending(&pending.idempotency_key) {
                    tracing::warn!(
                        key = %pending.idempotency_key,
                        error = %e,
                        "recorded session could not be removed from outbox"
                    );
                }
                let recorded = RecordedSession {
                    idempotency_key: pending.idempotency_key.clone(),
                    item_id: pending.item_id,
                    local_reward: pending.local_reward,
                    coins_earned: response.coins_earned,
                };
                if recorded.diverges() {
                    tracing::warn!(
                        local = recorded.local_reward,
                        remote = recorded.coins_earned,
                        "backend reward differs from local reward"
                    );
                }
                tracing::info!(key = %recorded.idempotency_key, coins = recorded.coins_earned, "session recorded");
                Ok(recorded)
            }
            Err(e) => {
                tracing::warn!(key = %pending.idempotency_key, error = %e, "session recording failed");
                if let Err(db_err) = self.db.record_attempt(&pending.idempotency_key, &e.to_string()) {
                    tracing::warn!(error = %db_err, "could not record delivery attempt");
                }
                Err(e)
            }
        }
    }

    /// Re-submit every pending session. Call once at startup.
    ///
    /// # Errors
    /// Only if the outbox itself cannot be read; delivery failures are
    /// collected in the report.
    pub async fn reconcile<R>(&self, recorder: &R) -> Result<ReconcileReport, DatabaseError>
    where
        R: RemoteSessionRecorder,
    {
        let mut report = ReconcileReport::default();
        for pending in self.pending()? {
            match self.deliver(recorder, &pending).await {
                Ok(recorded) => report.delivered.push(recorded),
                Err(e) => report.failed.push((pending.idempotency_key, e.to_string())),
            }
        }
        tracing::info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "outbox reconciled"
        );
        Ok(report)
    }
}
