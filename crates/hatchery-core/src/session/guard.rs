//! Interruption guard.
//!
//! Sits between host signals and the [`SessionController`] while a session is
//! running or paused:
//!
//! - **Backgrounding** only produces a warning. The session keeps running on
//!   the wall clock; returning to the foreground resyncs the countdown.
//! - **Navigating away** (including hardware back) and **manual reset** are
//!   held until the user confirms. Confirming forfeits the session and lets
//!   the request through; declining drops the request and leaves the session
//!   untouched.
//!
//! In every other status the guard is inert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::controller::SessionController;
use super::state::{ForfeitReason, SessionStatus};
use crate::events::Event;

/// App lifecycle transitions reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// An attempt to leave the session screen or end the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitRequest {
    /// Hardware or gesture back.
    Back,
    /// In-app navigation to another route.
    Navigate { route: String },
    /// User pressed reset on the timer.
    Reset,
}

impl ExitRequest {
    fn forfeit_reason(&self) -> ForfeitReason {
        match self {
            ExitRequest::Reset => ForfeitReason::Reset,
            ExitRequest::Back | ExitRequest::Navigate { .. } => ForfeitReason::Navigation,
        }
    }
}

/// Non-blocking notice that the app left the foreground mid-session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptionWarning {
    pub status: SessionStatus,
    pub remaining_secs: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    /// Nothing to protect.
    Ignored,
    /// Backgrounded during an active session.
    Warning(InterruptionWarning),
    /// Back in the foreground; carries the completion event if the session
    /// ran out while the app was away.
    Resynced(Option<Event>),
}

/// What the user is asked before an active session is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
    pub request: ExitRequest,
    pub item_id: Option<u32>,
    pub remaining_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDecision {
    /// Let the request through.
    Proceed(ExitRequest),
    /// Hold the request until [`InterruptionGuard::confirm`] or
    /// [`InterruptionGuard::decline`].
    ConfirmationRequired(ConfirmationPrompt),
}

/// A confirmed exit: the request to carry out and the forfeit it caused, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitResolution {
    pub request: ExitRequest,
    pub forfeited: Option<Event>,
}

#[derive(Debug, Default)]
pub struct InterruptionGuard {
    pending: Option<ExitRequest>,
}

impl InterruptionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request currently waiting for confirmation.
    pub fn pending(&self) -> Option<&ExitRequest> {
        self.pending.as_ref()
    }

    /// React to a foreground/background transition.
    pub fn on_lifecycle(
        &mut self,
        controller: &mut SessionController,
        transition: AppLifecycle,
    ) -> LifecycleOutcome {
        let status = controller.status();
        match transition {
            AppLifecycle::Background if status.is_active() => {
                tracing::info!(
                    status = status.as_str(),
                    remaining_secs = controller.remaining_secs(),
                    "app backgrounded during session"
                );
                LifecycleOutcome::Warning(InterruptionWarning {
                    status,
                    remaining_secs: controller.remaining_secs(),
                    at: controller.now(),
                })
            }
            AppLifecycle::Foreground if status.is_active() => {
                LifecycleOutcome::Resynced(controller.resync())
            }
            _ => LifecycleOutcome::Ignored,
        }
    }

    /// Gate a navigation-away or reset request.
    pub fn request_exit(
        &mut self,
        controller: &SessionController,
        request: ExitRequest,
    ) -> ExitDecision {
        if !controller.status().is_active() {
            return ExitDecision::Proceed(request);
        }

        tracing::debug!(?request, "exit held for confirmation");
        let prompt = ConfirmationPrompt {
            request: request.clone(),
            item_id: controller.session().and_then(|s| s.chosen_item_id),
            remaining_secs: controller.remaining_secs(),
        };
        self.pending = Some(request);
        ExitDecision::ConfirmationRequired(prompt)
    }

    /// Shorthand for [`InterruptionGuard::request_exit`] with [`ExitRequest::Reset`].
    pub fn request_reset(&mut self, controller: &SessionController) -> ExitDecision {
        self.request_exit(controller, ExitRequest::Reset)
    }

    /// User chose to leave: forfeit the session and release the held request.
    ///
    /// Returns `None` when nothing was waiting. If the session already ended
    /// on its own in the meantime, nothing is forfeited.
    pub fn confirm(&mut self, controller: &mut SessionController) -> Option<ExitResolution> {
        let request = self.pending.take()?;
        let forfeited = if controller.status().is_active() {
            match controller.forfeit(request.forfeit_reason()) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "confirmed exit could not forfeit");
                    None
                }
            }
        } else {
            None
        };
        Some(ExitResolution { request, forfeited })
    }

    /// User chose to stay: drop the held request. The session is untouched.
    pub fn decline(&mut self) -> Option<ExitRequest> {
        let request = self.pending.take();
        if request.is_some() {
            tracing::debug!("exit declined; session continues");
        }
        request
    }
}
