//! The console shell: hosts the lifecycle worker thread and turns the exit
//! command into a cancellation request.

use startstop_core::{LifecycleControl, LifecycleOutcome};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK: Duration = Duration::from_millis(100);
const CANCEL_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum ShellExit {
    /// The worker terminated and reported back.
    Finished(LifecycleOutcome),
    /// Exit was requested and the worker did not report within the grace period.
    Abandoned,
    /// The worker went away without reporting (it panicked).
    WorkerLost,
}

pub struct Supervisor {
    tick: Duration,
    cancel_grace: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            tick: TICK,
            cancel_grace: CANCEL_GRACE,
        }
    }
}

impl Supervisor {
    #[cfg(test)]
    fn with_timings(tick: Duration, cancel_grace: Duration) -> Self {
        Self { tick, cancel_grace }
    }

    /// Waits for the worker's outcome. Once `exit_requested` reports true the
    /// machine is cancelled and given `cancel_grace` to wind down.
    pub fn wait(
        &self,
        outcomes: &Receiver<LifecycleOutcome>,
        control: &LifecycleControl,
        exit_requested: impl Fn() -> bool,
    ) -> ShellExit {
        let mut deadline: Option<Instant> = None;

        loop {
            match outcomes.recv_timeout(self.tick) {
                Ok(outcome) => return ShellExit::Finished(outcome),
                Err(RecvTimeoutError::Disconnected) => return ShellExit::WorkerLost,
                Err(RecvTimeoutError::Timeout) => {}
            }

            if deadline.is_none() && exit_requested() {
                if control.request_cancel() {
                    info!("Exit command received");
                }
                deadline = Some(Instant::now() + self.cancel_grace);
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(
                        grace_ms = self.cancel_grace.as_millis() as u64,
                        "Lifecycle worker did not stop in time; exiting anyway"
                    );
                    return ShellExit::Abandoned;
                }
            }
        }
    }
}
