//! SteamVR gateway backed by the OS process table.
//!
//! "Connected" means a SteamVR server process is alive and we hold its PID.
//! When that process goes away the runtime has quit, which is reported as a
//! single [`RuntimeEvent::Quit`].

use super::{AppRegistrar, RuntimeEvent, RuntimeGateway};
use crate::error::ConnectError;
use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RuntimeProcess {
    pid: Pid,
    start_time: u64,
}

pub struct SteamVrGateway {
    system: System,
    process_names: Vec<String>,
    registrar: AppRegistrar,
    registration_checked: bool,
    attached: Option<RuntimeProcess>,
    quit_reported: bool,
}

impl SteamVrGateway {
    pub fn new(process_names: Vec<String>, registrar: AppRegistrar) -> Self {
        Self {
            system: System::new(),
            process_names,
            registrar,
            registration_checked: false,
            attached: None,
            quit_reported: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.attached.is_some()
    }

    /// Lowest matching PID, so a runtime that shows its threads in the
    /// process table resolves to its main process.
    fn find_runtime(&mut self) -> Option<RuntimeProcess> {
        self.system.refresh_processes();
        self.system
            .processes()
            .iter()
            .filter(|(_, process)| matches_runtime_name(process.name(), &self.process_names))
            .min_by_key(|(pid, _)| pid.as_u32())
            .map(|(pid, process)| RuntimeProcess {
                pid: *pid,
                start_time: process.start_time(),
            })
    }

    /// Same PID and same start time; a recycled PID does not count.
    fn is_alive(&mut self, runtime: RuntimeProcess) -> bool {
        if !self
            .system
            .refresh_process_specifics(runtime.pid, ProcessRefreshKind::new())
        {
            return false;
        }
        self.system
            .process(runtime.pid)
            .map(|process| process.start_time() == runtime.start_time)
            .unwrap_or(false)
    }
}

impl RuntimeGateway for SteamVrGateway {
    fn connect(&mut self) -> Result<(), ConnectError> {
        if self.process_names.is_empty() {
            return Err(ConnectError::Probe(
                "no runtime process names configured".to_string(),
            ));
        }

        let runtime = self
            .find_runtime()
            .ok_or_else(|| ConnectError::RuntimeNotRunning {
                expected: self.process_names.join(", "),
            })?;

        info!(pid = %runtime.pid, "SteamVR connection established");
        self.attached = Some(runtime);
        self.quit_reported = false;

        if !self.registration_checked {
            self.registration_checked = true;
            self.registrar.ensure_registered();
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<RuntimeEvent> {
        let Some(runtime) = self.attached else {
            debug!("Polled runtime events while disconnected");
            return None;
        };
        if self.quit_reported || self.is_alive(runtime) {
            return None;
        }

        debug!(pid = %runtime.pid, "SteamVR server process exited");
        self.quit_reported = true;
        Some(RuntimeEvent::Quit)
    }

    /// The process table has no channel back to SteamVR, so there is nothing
    /// to acknowledge; the quit is only recorded in the log.
    fn acknowledge_shutdown(&mut self) {
        info!(app_key = %self.registrar.app_key(), "Acknowledged SteamVR quit");
    }

    fn disconnect(&mut self) {
        if let Some(runtime) = self.attached.take() {
            info!(pid = %runtime.pid, "SteamVR connection released");
        }
    }
}

/// Case-insensitive match that ignores a trailing `.exe`.
fn matches_runtime_name(name: &str, expected: &[String]) -> bool {
    let name = normalize_process_name(name);
    expected
        .iter()
        .any(|candidate| normalize_process_name(candidate) == name)
}

fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}
