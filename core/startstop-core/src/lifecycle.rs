//! The lifecycle state machine.
//!
//! ## State Machine
//!
//! ```text
//! AwaitingConnection     → AwaitingConnection      (connect failed, or not ready yet)
//! AwaitingConnection     → RunningStartScripts     (connected and ready)
//! RunningStartScripts    → AwaitingShutdownSignal  (stop folder has scripts)
//! RunningStartScripts    → RunningStopScripts      (stop folder empty; wait skipped)
//! AwaitingShutdownSignal → RunningStopScripts      (runtime quit observed)
//! any                    → Terminated              (cancellation requested)
//! RunningStopScripts     → Terminated
//! ```
//!
//! The runtime is always disconnected before stop scripts run, and a quit is
//! acknowledged before that disconnect. Cancellation is checked at the top of
//! every step, so each wait iteration sees it; once requested, stop scripts
//! never run.

use crate::error::ConnectError;
use crate::gateway::{RuntimeEvent, RuntimeGateway};
use crate::scripts::{BatchReport, ScriptLauncher, ScriptRunner};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecyclePhase {
    AwaitingConnection,
    RunningStartScripts,
    AwaitingShutdownSignal,
    RunningStopScripts,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The runtime quit and stop scripts ran.
    ShutdownSignal,
    /// No stop scripts existed, so the wait was skipped.
    NoStopScripts,
    /// Exit was requested; stop scripts were skipped.
    Cancelled,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Control handle
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct ControlFlags {
    ready: AtomicBool,
    cancelled: AtomicBool,
}

/// The only way the shell influences a running machine: mark it ready, or
/// request cancellation. Both flags are one-way.
#[derive(Debug, Clone, Default)]
pub struct LifecycleControl {
    flags: Arc<ControlFlags>,
}

impl LifecycleControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.flags.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.flags.ready.load(Ordering::SeqCst)
    }

    /// Returns true only for the call that actually set the flag.
    pub fn request_cancel(&self) -> bool {
        !self.flags.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pacing
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the machine blocks between retries and polls.
pub trait Pacer: Send {
    fn pause(&mut self, interval: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, interval: Duration) {
        thread::sleep(interval);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Machine
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub start_dir: PathBuf,
    pub stop_dir: PathBuf,
    pub retry_interval: Duration,
    pub poll_interval: Duration,
}

/// Handed back to the shell once the machine reaches `Terminated`.
#[derive(Debug)]
pub struct LifecycleOutcome {
    pub reason: ExitReason,
    pub connect_attempts: u32,
    pub start: Option<BatchReport>,
    pub stop: Option<BatchReport>,
}

pub struct LifecycleMachine<G, L, P = ThreadPacer>
where
    G: RuntimeGateway,
    L: ScriptLauncher,
    P: Pacer,
{
    gateway: G,
    runner: ScriptRunner<L>,
    pacer: P,
    control: LifecycleControl,
    settings: LifecycleSettings,
    phase: LifecyclePhase,
    connection: ConnectionState,
    connect_attempts: u32,
    exit_reason: Option<ExitReason>,
    start_report: Option<BatchReport>,
    stop_report: Option<BatchReport>,
}

impl<G, L, P> LifecycleMachine<G, L, P>
where
    G: RuntimeGateway,
    L: ScriptLauncher,
    P: Pacer,
{
    pub fn new(
        gateway: G,
        runner: ScriptRunner<L>,
        pacer: P,
        control: LifecycleControl,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            gateway,
            runner,
            pacer,
            control,
            settings,
            phase: LifecyclePhase::AwaitingConnection,
            connection: ConnectionState::Disconnected,
            connect_attempts: 0,
            exit_reason: None,
            start_report: None,
            stop_report: None,
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Drives the machine to `Terminated`.
    pub fn run(mut self) -> LifecycleOutcome {
        while self.phase != LifecyclePhase::Terminated {
            self.step();
        }
        self.into_outcome()
    }

    /// Performs one phase's work and returns the phase that follows.
    /// Calling it after `Terminated` does nothing.
    pub fn step(&mut self) -> LifecyclePhase {
        if self.phase == LifecyclePhase::Terminated {
            return self.phase;
        }
        if self.control.is_cancelled() {
            info!("Exit requested");
            self.terminate(ExitReason::Cancelled);
            return self.phase;
        }

        let next = match self.phase {
            LifecyclePhase::AwaitingConnection => self.await_connection(),
            LifecyclePhase::RunningStartScripts => self.run_start_scripts(),
            LifecyclePhase::AwaitingShutdownSignal => self.await_shutdown_signal(),
            LifecyclePhase::RunningStopScripts => self.run_stop_scripts(),
            LifecyclePhase::Terminated => LifecyclePhase::Terminated,
        };
        self.advance(next);
        self.phase
    }

    fn await_connection(&mut self) -> LifecyclePhase {
        if self.connection == ConnectionState::Disconnected {
            self.connect_attempts += 1;
            match self.gateway.connect() {
                Ok(()) => {
                    info!(attempts = self.connect_attempts, "Runtime connection established");
                    self.connection = ConnectionState::Connected;
                }
                Err(err) => {
                    self.log_connect_failure(&err);
                    self.pacer.pause(self.settings.retry_interval);
                    return LifecyclePhase::AwaitingConnection;
                }
            }
        }

        if self.control.is_ready() {
            LifecyclePhase::RunningStartScripts
        } else {
            debug!("Connected; waiting for first-run notice to be acknowledged");
            self.pacer.pause(self.settings.poll_interval);
            LifecyclePhase::AwaitingConnection
        }
    }

    fn run_start_scripts(&mut self) -> LifecyclePhase {
        self.start_report = Some(self.runner.run_all(&self.settings.start_dir));

        if self.runner.has_scripts(&self.settings.stop_dir) {
            info!("Waiting for the shutdown of SteamVR to run additional scripts on exit");
            self.exit_reason = Some(ExitReason::ShutdownSignal);
            LifecyclePhase::AwaitingShutdownSignal
        } else {
            self.release_runtime();
            LifecyclePhase::RunningStopScripts
        }
    }

    /// One iteration of the wait: drain pending events, then either advance
    /// on quit or pause until the next poll.
    fn await_shutdown_signal(&mut self) -> LifecyclePhase {
        let mut quit = false;
        while let Some(event) = self.gateway.poll_event() {
            match event {
                RuntimeEvent::Quit => {
                    info!("Runtime quit event received");
                    self.gateway.acknowledge_shutdown();
                    quit = true;
                }
                RuntimeEvent::Other(kind) => debug!(event = %kind, "Ignoring runtime event"),
            }
        }

        if quit {
            self.release_runtime();
            return LifecyclePhase::RunningStopScripts;
        }
        self.pacer.pause(self.settings.poll_interval);
        LifecyclePhase::AwaitingShutdownSignal
    }

    fn run_stop_scripts(&mut self) -> LifecyclePhase {
        self.stop_report = Some(self.runner.run_all(&self.settings.stop_dir));
        if self.exit_reason.is_none() {
            self.exit_reason = Some(ExitReason::NoStopScripts);
        }
        info!("Application exiting");
        LifecyclePhase::Terminated
    }

    fn terminate(&mut self, reason: ExitReason) {
        self.release_runtime();
        self.exit_reason = Some(reason);
        info!("Application exiting");
        self.phase = LifecyclePhase::Terminated;
    }

    fn release_runtime(&mut self) {
        if self.connection == ConnectionState::Connected {
            self.gateway.disconnect();
            self.connection = ConnectionState::Disconnected;
        }
    }

    fn advance(&mut self, next: LifecyclePhase) {
        debug_assert!(
            next >= self.phase,
            "phase moved backwards: {:?} -> {:?}",
            self.phase,
            next
        );
        if next != self.phase {
            debug!(from = ?self.phase, to = ?next, "Lifecycle phase change");
        }
        self.phase = next;
    }

    fn log_connect_failure(&self, err: &ConnectError) {
        // First failure is worth a warning; the rest are expected while waiting.
        if self.connect_attempts == 1 {
            warn!(error = %err, "Error: Runtime connection failed, retrying");
        } else {
            debug!(attempt = self.connect_attempts, error = %err, "Runtime connection failed");
        }
    }

    fn into_outcome(self) -> LifecycleOutcome {
        LifecycleOutcome {
            reason: self.exit_reason.unwrap_or(ExitReason::Cancelled),
            connect_attempts: self.connect_attempts,
            start: self.start_report,
            stop: self.stop_report,
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use std::sync::Mutex;

    /// Records pauses instead of sleeping. Optionally requests cancellation
    /// once `cancel_after` pauses have happened.
    #[derive(Clone, Default)]
    pub struct RecordingPacer {
        pub pauses: Arc<Mutex<Vec<Duration>>>,
        pub cancel_after: Option<(usize, LifecycleControl)>,
    }

    impl RecordingPacer {
        pub fn cancelling_after(pauses: usize, control: LifecycleControl) -> Self {
            Self {
                cancel_after: Some((pauses, control)),
                ..Self::default()
            }
        }

        pub fn recorded(&self) -> Vec<Duration> {
            self.pauses.lock().unwrap().clone()
        }
    }

    impl Pacer for RecordingPacer {
        fn pause(&mut self, interval: Duration) {
            let mut pauses = self.pauses.lock().unwrap();
            pauses.push(interval);
            if let Some((limit, control)) = &self.cancel_after {
                if pauses.len() >= *limit {
                    control.request_cancel();
                }
            }
        }
    }
}
