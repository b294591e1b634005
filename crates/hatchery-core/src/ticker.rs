//! Tick driver.
//!
//! Delivers a [`TickSignal`] on a channel once per period. The host owns the
//! [`SessionController`] and hands every signal to [`Ticker::step`], which
//! ticks the controller and stops the ticker once the session leaves
//! `Running`. After any other call that can end or pause the session
//! (`forfeit`, `pause`, a confirmed exit) the host calls
//! [`Ticker::follow`] so the timer is cancelled immediately:
//!
//! ```text
//! loop {
//!     select! {
//!         Some(_) = ticks.recv()   => ticker.step(&mut controller),
//!         Some(cmd) = commands.recv() => { apply(cmd); ticker.follow(&controller) }
//!     }
//! }
//! ```
//!
//! Stopping or dropping the [`Ticker`] aborts the background task, so no
//! callback can fire into a session that has been discarded.
//!
//! Must be spawned from within a tokio runtime.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::events::Event;
use crate::session::SessionController;
use crate::storage::TimerConfig;

/// One elapsed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSignal;

#[derive(Debug)]
pub struct Ticker {
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start ticking every `period`. The first signal arrives after one period.
    pub fn spawn(period: Duration) -> (Self, mpsc::UnboundedReceiver<TickSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            // Missed ticks carry no information: the countdown reads the clock.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(TickSignal).is_err() {
                    break;
                }
            }
        });
        (
            Self {
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Start ticking at the configured `tick_interval_ms`.
    pub fn for_timer(config: &TimerConfig) -> (Self, mpsc::UnboundedReceiver<TickSignal>) {
        Self::spawn(Duration::from_millis(config.tick_interval_ms.max(1)))
    }

    /// Handle one received signal: tick the controller, then stop if it no
    /// longer wants ticks. Returns the completion event, if any.
    pub fn step(&mut self, controller: &mut SessionController) -> Option<Event> {
        let event = controller.tick();
        self.follow(controller);
        event
    }

    /// Stop ticking if the controller left `Running`.
    pub fn follow(&mut self, controller: &SessionController) {
        if !controller.wants_ticks() {
            self.stop();
        }
    }

    /// Cancel the timer immediately.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("ticker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
