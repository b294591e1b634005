mod controller;
mod guard;
mod state;

pub use controller::SessionController;
pub use guard::{
    AppLifecycle, ConfirmationPrompt, ExitDecision, ExitRequest, ExitResolution,
    InterruptionGuard, InterruptionWarning, LifecycleOutcome,
};
pub use state::{Completion, ForfeitReason, Session, SessionStatus};
