//! # Hatchery Core Library
//!
//! Core logic for the Hatchery study timer: run a focus session, and when it
//! completes, hatch the next animal in a fixed collectible sequence and earn
//! coins. Presentation code (screens, navigation, notifications) lives
//! elsewhere and drives this crate.
//!
//! ## Architecture
//!
//! - **Session controller**: a wall-clock-based state machine; the host calls
//!   `tick()` periodically (see [`ticker`])
//! - **Interruption guard**: warns on backgrounding, holds navigation-away and
//!   reset until the user confirms forfeiting
//! - **Unlock ledger**: gapless, append-only record of claimed items in SQLite
//! - **Outbox**: completed sessions waiting for the backend, reconciled at start
//!
//! ## Key Components
//!
//! - [`SessionController`]: session state machine
//! - [`InterruptionGuard`]: exit gating
//! - [`UnlockSequenceStore`]: durable unlock ledger
//! - [`RewardCalculator`]: coins per session
//! - [`SessionOutbox`] / [`RemoteSessionRecorder`]: backend recording

pub mod catalog;
pub mod clock;
pub mod error;
pub mod events;
pub mod remote;
pub mod reward;
pub mod session;
pub mod storage;
pub mod ticker;
pub mod unlock;

pub use catalog::{Catalog, Collectible};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    ConfigError, CoreError, DatabaseError, ExhaustedError, RecorderError, Result, ValidationError,
};
pub use events::Event;
pub use remote::{
    CompleteSessionRequest, CompleteSessionResponse, HttpSessionRecorder, ReconcileReport,
    RecordedSession, RemoteSessionRecorder, SessionOutbox, StaticToken, TokenProvider,
};
pub use reward::RewardCalculator;
pub use session::{
    AppLifecycle, ExitDecision, ExitRequest, ForfeitReason, InterruptionGuard, LifecycleOutcome,
    Session, SessionController, SessionStatus,
};
pub use storage::{Config, Database, KeyValueStore, PendingSession, RemoteConfig, TimerConfig};
pub use ticker::{TickSignal, Ticker};
pub use unlock::{CommitOutcome, UnlockSequenceStore};

use std::sync::Arc;

/// Wire up the core services from an opened database.
///
/// Loads the ledger, repairs it from any outbox entries whose unlock write
/// was lost, and returns a controller ready for `begin()`. Outbox delivery
/// ([`SessionOutbox::reconcile`]) is left to the host since it is async.
pub fn bootstrap(
    db: Arc<Database>,
    config: &Config,
    catalog: &Catalog,
    clock: Arc<dyn Clock>,
) -> SessionController {
    let ledger = UnlockSequenceStore::load(db.clone(), catalog.len());
    let mut controller =
        SessionController::new(clock, config.timer.clone(), ledger, SessionOutbox::new(db));
    controller.reconcile_local();
    controller
}
