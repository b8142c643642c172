//! Wiring of the production collaborators from a resolved configuration.

use crate::config::ResolvedConfig;
use crate::error::Result;
use crate::gateway::{AppRegistrar, SteamVrGateway};
use crate::lifecycle::{LifecycleControl, LifecycleMachine, LifecycleSettings, ThreadPacer};
use crate::scripts::{ScriptRunner, ShellLauncher};

/// The machine the agent binary runs.
pub type AgentMachine = LifecycleMachine<SteamVrGateway, ShellLauncher, ThreadPacer>;

pub fn registrar(config: &ResolvedConfig) -> AppRegistrar {
    AppRegistrar::new(
        config.runtime_config_dir.clone(),
        config.app_key.clone(),
        config.manifest_path.clone(),
    )
}

pub fn lifecycle_settings(config: &ResolvedConfig) -> LifecycleSettings {
    LifecycleSettings {
        start_dir: config.start_dir.clone(),
        stop_dir: config.stop_dir.clone(),
        retry_interval: config.retry_interval,
        poll_interval: config.poll_interval,
    }
}

/// Builds a SteamVR-backed machine that launches scripts through the host
/// shell. Fails only on an invalid script pattern.
pub fn build_machine(config: &ResolvedConfig, control: LifecycleControl) -> Result<AgentMachine> {
    let gateway = SteamVrGateway::new(config.process_names.clone(), registrar(config));
    let runner = ScriptRunner::new(&config.script_pattern)?;
    Ok(LifecycleMachine::new(
        gateway,
        runner,
        ThreadPacer,
        control,
        lifecycle_settings(config),
    ))
}
