//! # startstop-core
//!
//! Core library for vr-startstop: a background agent that runs operator
//! scripts when SteamVR starts and again when it shuts down.
//!
//! ## Design Principles
//!
//! - **Synchronous**: one worker thread drives the lifecycle; no async runtime.
//! - **Contained failures**: connection, registration, polling and launch
//!   errors are logged and never end the process. Only configuration and
//!   logging setup can fail startup.
//! - **Injected collaborators**: the runtime, the script launcher and the
//!   sleep between retries sit behind traits so the state machine can be
//!   stepped in tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use startstop_core::{build_machine, load_config, LifecycleControl};
//!
//! let base = startstop_core::default_base_dir()?;
//! let config = load_config(None, &base)?.resolve(&base);
//! let control = LifecycleControl::new();
//! control.mark_ready();
//! let outcome = build_machine(&config, control)?.run();
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod logging;
pub mod scripts;

pub use agent::{build_machine, registrar, AgentMachine};
pub use config::{default_base_dir, load_config, AgentConfig, ResolvedConfig, RuntimeConfig};
pub use error::{ConnectError, RegistrationError, Result, StartStopError};
pub use gateway::{AppRegistrar, RegistrationReport, RuntimeEvent, RuntimeGateway, SteamVrGateway};
pub use lifecycle::{
    ConnectionState, ExitReason, LifecycleControl, LifecycleMachine, LifecycleOutcome,
    LifecyclePhase, LifecycleSettings, Pacer, ThreadPacer,
};
pub use scripts::{
    discover_scripts, BatchReport, LaunchFailure, ScriptBatch, ScriptLauncher, ScriptRunner,
    ShellLauncher,
};
