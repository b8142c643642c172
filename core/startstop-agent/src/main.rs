//! vr-startstop: runs operator scripts when SteamVR starts and stops.
//!
//! The agent attaches to SteamVR, launches every script in `start/`, and, if
//! `stop/` holds scripts, stays resident until SteamVR quits to launch those
//! too. Without stop scripts it exits right after the start batch.
//!
//! ## Subcommands
//!
//! - `run` (default): the lifecycle agent
//! - `scripts`: list the scripts currently discovered in both folders
//! - `register`: register with SteamVR for auto-launch and exit

mod notice;
mod shell;
mod signals;

use clap::{Parser, Subcommand};
use shell::{ShellExit, Supervisor};
use startstop_core::{
    build_machine, default_base_dir, load_config, logging, registrar, LifecycleControl,
    LifecycleOutcome, ResolvedConfig, ScriptRunner,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "vr-startstop")]
#[command(about = "Run scripts when SteamVR starts and stops")]
#[command(version)]
struct Cli {
    /// Directory holding the script folders, log and config (default: executable's directory)
    #[arg(long, value_name = "DIR", global = true)]
    base_dir: Option<PathBuf>,

    /// Config file (default: vr-startstop.toml in the base directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Do not wait for the first-run notice to be acknowledged
    #[arg(long, global = true)]
    no_prompt: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run the lifecycle agent (default)
    Run,

    /// List the scripts currently found in the start and stop folders
    Scripts,

    /// Register with SteamVR for auto-launch, then exit
    Register,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("vr-startstop: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_agent(&config, cli.no_prompt),
        Commands::Scripts => list_scripts(&config),
        Commands::Register => register(&config),
    }
}

fn resolve_config(cli: &Cli) -> startstop_core::Result<ResolvedConfig> {
    let base_dir = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => default_base_dir()?,
    };
    let config = load_config(cli.config.as_deref(), &base_dir)?;
    Ok(config.resolve(&base_dir))
}

fn run_agent(config: &ResolvedConfig, no_prompt: bool) -> ExitCode {
    let session = match logging::prepare_log_file(&config.log_file).and_then(logging::init) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("vr-startstop: {}", err);
            return ExitCode::FAILURE;
        }
    };
    info!("Application starting ({})", env!("CARGO_PKG_VERSION"));

    let control = LifecycleControl::new();
    let machine = match build_machine(config, control.clone()) {
        Ok(machine) => machine,
        Err(err) => {
            error!(error = %err, "Failed to set up lifecycle");
            return ExitCode::FAILURE;
        }
    };

    let (outcome_tx, outcome_rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("lifecycle".to_string())
        .spawn(move || {
            let outcome = machine.run();
            let _ = outcome_tx.send(outcome);
        });
    let worker = match spawned {
        Ok(worker) => worker,
        Err(err) => {
            error!(error = %err, "Error: Could not start worker thread");
            return ExitCode::FAILURE;
        }
    };

    open_shell(config, session.first_run, no_prompt, &control);

    let exit = Supervisor::default().wait(&outcome_rx, &control, signals::exit_requested);
    let code = match exit {
        ShellExit::Finished(outcome) => {
            log_outcome(&outcome);
            let _ = worker.join();
            ExitCode::SUCCESS
        }
        ShellExit::Abandoned => ExitCode::SUCCESS,
        ShellExit::WorkerLost => {
            error!("Lifecycle worker stopped unexpectedly");
            ExitCode::FAILURE
        }
    };
    drop(session);
    code
}

/// Arms the exit command first, so an interrupt during the first-run prompt
/// still goes through the shell and flushes the log.
fn open_shell(config: &ResolvedConfig, first_run: bool, no_prompt: bool, control: &LifecycleControl) {
    signals::install();
    if first_run {
        notice::show(config, !no_prompt);
    }
    control.mark_ready();
}

fn log_outcome(outcome: &LifecycleOutcome) {
    for report in [&outcome.start, &outcome.stop].into_iter().flatten() {
        if let Some(load_error) = &report.load_error {
            warn!(folder = %report.folder.display(), error = %load_error, "Script folder was not run");
        }
    }
    info!(
        reason = ?outcome.reason,
        connect_attempts = outcome.connect_attempts,
        "Lifecycle finished"
    );
}

fn list_scripts(config: &ResolvedConfig) -> ExitCode {
    let runner = match ScriptRunner::new(&config.script_pattern) {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("vr-startstop: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    for (label, folder) in [("start", &config.start_dir), ("stop", &config.stop_dir)] {
        println!("{} ({}):", label, folder.display());
        match runner.discover(folder) {
            Ok(batch) if batch.is_empty() => println!("  (no {} files)", runner.pattern()),
            Ok(batch) => {
                for script in batch {
                    println!("  {}", script.display());
                }
            }
            Err(err) => {
                eprintln!("  {}", err);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn register(config: &ResolvedConfig) -> ExitCode {
    let registrar = registrar(config);
    if registrar.is_installed() {
        println!("Already registered as {}", registrar.app_key());
        return ExitCode::SUCCESS;
    }

    let mut ok = true;
    for (step, result) in [
        ("Install app manifest", registrar.install_manifest()),
        ("Enable auto launch", registrar.enable_auto_launch()),
    ] {
        match result {
            Ok(()) => println!("{}: ok", step),
            Err(err) => {
                eprintln!("{}: {}", step, err);
                ok = false;
            }
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
