//! Recording completed sessions with the backend.
//!
//! The backend is the eventual source of truth for coins. Local unlocks and
//! local rewards are committed before any remote call, and a remote failure
//! never rolls them back. Completed sessions wait in the [`SessionOutbox`]
//! until the backend acknowledges them.

mod http;
mod outbox;

pub use http::HttpSessionRecorder;
pub use outbox::{ReconcileReport, RecordedSession, SessionOutbox};

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::RecorderError;

/// Body of `POST /sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSessionRequest {
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    /// Sent as the `Idempotency-Key` header, not in the body.
    #[serde(skip)]
    pub idempotency_key: String,
}

/// Backend reply. Fields beyond `coins_earned` are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteSessionResponse {
    pub coins_earned: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Backend collaborator that records a completed session.
pub trait RemoteSessionRecorder: Send + Sync {
    fn complete_session(
        &self,
        request: &CompleteSessionRequest,
    ) -> impl Future<Output = Result<CompleteSessionResponse, RecorderError>> + Send;
}

/// Supplies the bearer token. Authentication itself lives elsewhere.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, for hosts that already hold one.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}
