//! Script discovery and fire-and-forget launching.
//!
//! Discovery is a plain function of the folder contents. Launching goes through
//! [`ScriptLauncher`]; the runner never waits for a script to finish, and one
//! failed launch never stops the rest of the batch.

use crate::error::{Result, StartStopError};
use glob::{MatchOptions, Pattern};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Windows file names compare case-insensitively, so `*.cmd` finds `START.CMD`.
const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: !cfg!(windows),
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Script paths in directory-enumeration order.
pub type ScriptBatch = Vec<PathBuf>;

/// Creates `folder` if needed and lists the files whose names match `pattern`.
/// Subdirectories are not searched.
pub fn discover_scripts(folder: &Path, pattern: &Pattern) -> Result<ScriptBatch> {
    fs_err::create_dir_all(folder).map_err(|source| StartStopError::Io {
        context: format!("creating script folder {}", folder.display()),
        source,
    })?;

    let mut batch = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(StartStopError::Io {
                    context: format!("listing script folder {}", folder.display()),
                    source: err.into(),
                })
            }
            Err(err) => {
                warn!(error = %err, "Skipping unreadable script entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            warn!(path = %entry.path().display(), "Skipping script with a non UTF-8 name");
            continue;
        };
        if pattern.matches_with(name, NAME_MATCH) {
            batch.push(entry.into_path());
        }
    }
    Ok(batch)
}

/// Starts a script without waiting for it.
pub trait ScriptLauncher: Send {
    fn launch(&self, script: &Path) -> io::Result<()>;
}

/// Runs each script through the host shell, detached from our stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellLauncher;

impl ShellLauncher {
    #[cfg(windows)]
    fn command(script: &Path) -> Command {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;

        let shell = std::env::var_os("ComSpec").unwrap_or_else(|| "cmd.exe".into());
        let mut command = Command::new(shell);
        command.arg("/C").arg(script).creation_flags(CREATE_NO_WINDOW);
        command
    }

    #[cfg(not(windows))]
    fn command(script: &Path) -> Command {
        let mut command = Command::new("sh");
        command.arg(script);
        command
    }
}

impl ScriptLauncher for ShellLauncher {
    fn launch(&self, script: &Path) -> io::Result<()> {
        let mut command = Self::command(script);
        if let Some(dir) = script.parent() {
            command.current_dir(dir);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Reap in the background so finished scripts do not linger as zombies.
        let script = script.to_path_buf();
        thread::spawn(move || match child.wait() {
            Ok(status) => debug!(script = %script.display(), %status, "Script finished"),
            Err(err) => debug!(script = %script.display(), error = %err, "Script wait failed"),
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct LaunchFailure {
    pub script: PathBuf,
    pub error: io::Error,
}

/// What one `run_all` call did.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub folder: PathBuf,
    pub found: usize,
    pub launched: usize,
    pub failures: Vec<LaunchFailure>,
    /// Set when the folder itself could not be created or listed.
    pub load_error: Option<String>,
}

pub struct ScriptRunner<L: ScriptLauncher = ShellLauncher> {
    pattern: Pattern,
    launcher: L,
}

impl ScriptRunner<ShellLauncher> {
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_launcher(pattern, ShellLauncher)
    }
}

impl<L: ScriptLauncher> ScriptRunner<L> {
    pub fn with_launcher(pattern: &str, launcher: L) -> Result<Self> {
        let pattern = Pattern::new(pattern).map_err(|err| StartStopError::InvalidPattern {
            pattern: pattern.to_string(),
            details: err.to_string(),
        })?;
        Ok(Self { pattern, launcher })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn discover(&self, folder: &Path) -> Result<ScriptBatch> {
        discover_scripts(folder, &self.pattern)
    }

    /// True if `folder` holds at least one matching script. Creates the folder.
    pub fn has_scripts(&self, folder: &Path) -> bool {
        match self.discover(folder) {
            Ok(batch) => !batch.is_empty(),
            Err(err) => {
                warn!(error = %err, "Error: Could not check for scripts");
                false
            }
        }
    }

    /// Launches every matching script in `folder` and returns once all
    /// launches have been issued.
    pub fn run_all(&self, folder: &Path) -> BatchReport {
        let mut report = BatchReport {
            folder: folder.to_path_buf(),
            ..BatchReport::default()
        };

        let batch = match self.discover(folder) {
            Ok(batch) => batch,
            Err(err) => {
                error!("Error: Could not load scripts from {}: {}", folder.display(), err);
                report.load_error = Some(err.to_string());
                return report;
            }
        };

        report.found = batch.len();
        info!("Found: {} script(s) in {}", batch.len(), folder.display());

        for script in batch {
            info!("Executing: {}", script.display());
            match self.launcher.launch(&script) {
                Ok(()) => report.launched += 1,
                Err(err) => {
                    error!(error = %err, "Error: Could not execute {}", script.display());
                    report.failures.push(LaunchFailure { script, error: err });
                }
            }
        }

        if report.found == 0 {
            info!(
                "Did not find any {} files to execute in {}",
                self.pattern.as_str(),
                folder.display()
            );
        }
        report
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::RecordingLauncher;
    use super::*;
    use crate::logging::capture::with_captured_log;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "echo hi\n").unwrap();
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[test]
    fn run_all_launches_only_matching_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.cmd");
        touch(temp.path(), "b.cmd");
        touch(temp.path(), "c.txt");

        let launcher = RecordingLauncher::default();
        let runner = ScriptRunner::with_launcher("*.cmd", launcher.clone()).unwrap();

        let (report, log) = with_captured_log(|| runner.run_all(temp.path()));
        assert_eq!(report.found, 2);
        assert_eq!(report.launched, 2);
        assert!(report.failures.is_empty());
        assert_eq!(
            sorted(launcher.launched_names()),
            vec!["a.cmd".to_string(), "b.cmd".to_string()]
        );
        assert!(log.contains("Found: 2 script(s)"), "log was: {log}");
        assert_eq!(log.matches("Executing: ").count(), 2);
    }

    #[test]
    fn run_all_on_missing_folder_creates_it_and_launches_nothing() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("stop");

        let launcher = RecordingLauncher::default();
        let runner = ScriptRunner::with_launcher("*.cmd", launcher.clone()).unwrap();

        let (report, log) = with_captured_log(|| runner.run_all(&folder));
        assert!(folder.is_dir());
        assert_eq!(report.found, 0);
        assert!(launcher.launched_names().is_empty());
        assert!(log.contains("Found: 0 script(s)"));
        assert!(log.contains("Did not find any *.cmd files to execute in"));
    }

    #[test]
    fn launch_failure_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.cmd");
        touch(temp.path(), "b.cmd");
        touch(temp.path(), "c.cmd");

        let launcher = RecordingLauncher::failing(&["b.cmd"]);
        let runner = ScriptRunner::with_launcher("*.cmd", launcher.clone()).unwrap();

        let report = runner.run_all(temp.path());
        assert_eq!(report.found, 3);
        assert_eq!(report.launched, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].script.ends_with("b.cmd"));
        assert_eq!(
            sorted(launcher.launched_names()),
            vec!["a.cmd".to_string(), "c.cmd".to_string()]
        );
    }

    #[test]
    fn discovery_skips_subdirectories_and_nested_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "top.cmd");
        let nested = temp.path().join("nested.cmd");
        std::fs::create_dir_all(&nested).unwrap();
        touch(&nested, "inner.cmd");

        let pattern = Pattern::new("*.cmd").unwrap();
        let batch = discover_scripts(temp.path(), &pattern).unwrap();
        assert_eq!(batch, vec![temp.path().join("top.cmd")]);
    }

    #[test]
    fn has_scripts_creates_folder() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("start");
        let runner = ScriptRunner::with_launcher("*.cmd", RecordingLauncher::default()).unwrap();

        assert!(!runner.has_scripts(&folder));
        assert!(folder.is_dir());

        touch(&folder, "go.cmd");
        assert!(runner.has_scripts(&folder));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let result = ScriptRunner::with_launcher("[", RecordingLauncher::default());
        assert!(matches!(result, Err(StartStopError::InvalidPattern { .. })));
    }

    #[cfg(windows)]
    #[test]
    fn discovery_ignores_extension_case_on_windows() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "START.CMD");
        touch(temp.path(), "b.Cmd");
        touch(temp.path(), "notes.txt");

        let pattern = Pattern::new("*.cmd").unwrap();
        let mut batch = discover_scripts(temp.path(), &pattern).unwrap();
        batch.sort();
        assert_eq!(
            batch,
            vec![temp.path().join("START.CMD"), temp.path().join("b.Cmd")]
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn discovery_is_case_sensitive_off_windows() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "upper.SH");
        touch(temp.path(), "lower.sh");

        let pattern = Pattern::new("*.sh").unwrap();
        let batch = discover_scripts(temp.path(), &pattern).unwrap();
        assert_eq!(batch, vec![temp.path().join("lower.sh")]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_skipped_with_a_warning() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(OsStr::from_bytes(b"bad\xff.cmd")), "rem\n").unwrap();
        touch(temp.path(), "good.cmd");

        let pattern = Pattern::new("*.cmd").unwrap();
        let (batch, log) = with_captured_log(|| discover_scripts(temp.path(), &pattern).unwrap());
        assert_eq!(batch, vec![temp.path().join("good.cmd")]);
        assert!(log.contains("Skipping script with a non UTF-8 name"), "log was: {log}");
    }

    #[test]
    fn unlistable_folder_is_reported_as_load_error() {
        let temp = TempDir::new().unwrap();
        let not_a_dir = temp.path().join("start");
        std::fs::write(&not_a_dir, "").unwrap();

        let launcher = RecordingLauncher::default();
        let runner = ScriptRunner::with_launcher("*.cmd", launcher.clone()).unwrap();

        let (report, log) = with_captured_log(|| runner.run_all(&not_a_dir));
        assert!(report.load_error.is_some());
        assert_eq!(report.found, 0);
        assert!(launcher.launched_names().is_empty());
        assert!(log.contains("Error: Could not load scripts from"), "log was: {log}");
    }

    #[cfg(unix)]
    #[test]
    fn shell_launcher_runs_script_detached() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("ran");
        let script = temp.path().join("mark.sh");
        std::fs::write(&script, format!("touch '{}'\n", marker.display())).unwrap();

        ShellLauncher.launch(&script).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !marker.exists() && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(marker.exists());
    }

    #[test]
    fn shell_launcher_reports_spawn_failure_for_missing_directory() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("gone").join("missing.sh");
        assert!(ShellLauncher.launch(&script).is_err());
    }
}
