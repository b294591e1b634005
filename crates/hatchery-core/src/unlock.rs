//! Durable, strictly ordered unlock ledger.
//!
//! The ledger records which catalog items have been claimed. It is append-only
//! and gapless: after `n` claims it holds exactly `[1, 2, ..., n]`, and the
//! only id that can ever be claimed is `n + 1`.
//!
//! The ledger is stored under [`LEDGER_KEY`] as a JSON array of integers.
//! Loading never fails: corrupt payloads, gaps, duplicates and out-of-range
//! ids are dropped down to the longest valid prefix and the cleaned ledger is
//! written back. If the stored ledger cannot be read at all, the store keeps
//! it untouched until a later read succeeds.

use std::sync::Arc;

use crate::error::{CoreError, DatabaseError, ExhaustedError, ValidationError};
use crate::storage::KeyValueStore;

/// Storage key holding the claimed ids.
pub const LEDGER_KEY: &str = "unlocked_sequence";

/// Result of a successful [`UnlockSequenceStore::commit_unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The id was appended. `persisted` is false when the durable write
    /// failed; the in-memory ledger advanced anyway and will be flushed later.
    Claimed { persisted: bool },
    /// The id was already claimed; nothing changed.
    AlreadyClaimed,
}

/// Ordered ledger of claimed collectibles.
pub struct UnlockSequenceStore {
    storage: Arc<dyn KeyValueStore>,
    claimed: Vec<u32>,
    total: u32,
    dirty: bool,
    /// The stored ledger has not been read successfully yet. Nothing may be
    /// written until it has, or earlier claims would be overwritten.
    unread: bool,
}

impl std::fmt::Debug for UnlockSequenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockSequenceStore")
            .field("claimed", &self.claimed)
            .field("total", &self.total)
            .field("dirty", &self.dirty)
            .field("unread", &self.unread)
            .finish()
    }
}

impl UnlockSequenceStore {
    /// Load the ledger for a sequence of `total` items.
    ///
    /// A failed read is not fatal: the store stays unread, and every claim
    /// retries the read first and refuses to proceed until it succeeds.
    pub fn load(storage: Arc<dyn KeyValueStore>, total: u32) -> Self {
        let mut store = Self {
            storage,
            claimed: Vec::new(),
            total,
            dirty: false,
            unread: true,
        };
        if let Err(e) = store.reload() {
            tracing::error!(error = %e, "failed to read unlock ledger; claims held until it can be read");
        }
        store
    }

    /// Whether the stored ledger has been read.
    pub fn is_loaded(&self) -> bool {
        !self.unread
    }

    /// Retry the initial read if it failed.
    ///
    /// # Errors
    /// Returns the storage error if the ledger still cannot be read.
    pub fn ensure_loaded(&mut self) -> Result<(), DatabaseError> {
        if self.unread {
            self.reload()?;
        }
        Ok(())
    }

    fn reload(&mut self) -> Result<(), DatabaseError> {
        let raw = self.storage.get(LEDGER_KEY)?;
        self.unread = false;

        let Some(raw) = raw else {
            tracing::debug!("no unlock ledger stored yet");
            return Ok(());
        };

        let (claimed, needs_rewrite) = sanitize(&raw, self.total);
        self.claimed = claimed;
        if needs_rewrite {
            tracing::warn!(
                stored = %raw,
                kept = self.claimed.len(),
                "unlock ledger contained invalid entries; repairing"
            );
            if let Err(e) = self.persist() {
                tracing::error!(error = %e, "failed to persist repaired unlock ledger");
                self.dirty = true;
            }
        } else {
            tracing::debug!(claimed = self.claimed.len(), "unlock ledger loaded");
        }
        Ok(())
    }

    /// Smallest unclaimed id.
    pub fn next_available(&self) -> Result<u32, ExhaustedError> {
        let next = self.claimed.len() as u32 + 1;
        if next > self.total {
            Err(ExhaustedError { total: self.total })
        } else {
            Ok(next)
        }
    }

    pub fn is_unlocked(&self, id: u32) -> bool {
        id >= 1 && id as usize <= self.claimed.len()
    }

    pub fn claimed(&self) -> &[u32] {
        &self.claimed
    }

    /// Number of items in the full sequence.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Whether the in-memory ledger is ahead of durable storage.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Claim `id`.
    ///
    /// Succeeds only when `id` is the next available item; re-claiming an
    /// already claimed id is a no-op success.
    ///
    /// # Errors
    /// `ValidationError::OutOfOrder` for any other id, `Exhausted` when
    /// nothing is left to claim, or `Persistence` when the stored ledger
    /// cannot be read.
    pub fn commit_unlock(&mut self, id: u32) -> Result<CommitOutcome, CoreError> {
        self.ensure_loaded()?;
        if self.is_unlocked(id) {
            tracing::debug!(id, "unlock already claimed");
            return Ok(CommitOutcome::AlreadyClaimed);
        }

        let expected = self.next_available()?;
        if id != expected {
            tracing::warn!(id, expected, "rejected out-of-order unlock");
            return Err(ValidationError::OutOfOrder {
                requested: id,
                expected,
            }
            .into());
        }

        self.claimed.push(id);
        let persisted = match self.persist() {
            Ok(()) => {
                self.dirty = false;
                true
            }
            Err(e) => {
                tracing::error!(id, error = %e, "failed to persist unlock; will retry");
                self.dirty = true;
                false
            }
        };
        tracing::info!(id, persisted, "unlock committed");
        Ok(CommitOutcome::Claimed { persisted })
    }

    /// Retry writing the ledger if a previous write failed.
    ///
    /// # Errors
    /// Returns the storage error if the write fails again.
    pub fn flush(&mut self) -> Result<(), DatabaseError> {
        self.ensure_loaded()?;
        if !self.dirty {
            return Ok(());
        }
        self.persist()?;
        self.dirty = false;
        tracing::info!(claimed = self.claimed.len(), "unlock ledger flushed");
        Ok(())
    }

    /// Re-claim items from completed sessions whose ledger write was lost.
    ///
    /// Ids are applied in ascending order; only ids that are exactly next in
    /// line are claimed, anything else is ignored. Returns the ids claimed.
    pub fn heal_from<I>(&mut self, item_ids: I) -> Vec<u32>
    where
        I: IntoIterator<Item = u32>,
    {
        if let Err(e) = self.ensure_loaded() {
            tracing::warn!(error = %e, "unlock ledger unreadable; skipping heal");
            return Vec::new();
        }
        let mut ids: Vec<u32> = item_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut healed = Vec::new();
        for id in ids {
            if self.is_unlocked(id) {
                continue;
            }
            if self.next_available().ok() != Some(id) {
                tracing::warn!(id, "pending session item cannot be re-claimed in order");
                continue;
            }
            if self.commit_unlock(id).is_ok() {
                healed.push(id);
            }
        }
        if !healed.is_empty() {
            tracing::info!(?healed, "unlock ledger healed from pending sessions");
        }
        healed
    }

    fn persist(&self) -> Result<(), DatabaseError> {
        if self.unread {
            return Err(DatabaseError::Unread(LEDGER_KEY));
        }
        let payload = serde_json::to_string(&self.claimed)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.storage.set(LEDGER_KEY, &payload)
    }
}

/// Reduce a stored payload to its longest valid prefix.
///
/// Returns the cleaned ids and whether they differ from what was stored.
fn sanitize(raw: &str, total: u32) -> (Vec<u32>, bool) {
    let values: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(serde_json::Value::Array(values)) => values,
        Ok(_) | Err(_) => return (Vec::new(), true),
    };

    let stored: Vec<Option<u64>> = values.iter().map(|v| v.as_u64()).collect();

    let mut ids: Vec<u64> = stored.iter().flatten().copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let claimed: Vec<u32> = ids
        .into_iter()
        .enumerate()
        .take_while(|(i, id)| *id == *i as u64 + 1 && *id <= u64::from(total))
        .map(|(_, id)| id as u32)
        .collect();

    let unchanged = stored.len() == claimed.len()
        && stored
            .iter()
            .zip(&claimed)
            .all(|(s, c)| *s == Some(u64::from(*c)));
    (claimed, !unchanged)
}
