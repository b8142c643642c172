//! Configuration loading and path resolution.
//!
//! Every setting has a default, so the agent runs without a config file.
//! Relative paths resolve against the agent's base directory, which is the
//! directory holding the executable unless the caller overrides it.

use crate::error::{Result, StartStopError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "vr-startstop.toml";
pub const DEFAULT_LOG_FILE: &str = "vr-startstop.log";
pub const DEFAULT_APP_KEY: &str = "vr-startstop.agent";
pub const DEFAULT_MANIFEST: &str = "app.vrmanifest";
const DEFAULT_INTERVAL_MS: u64 = 1000;

#[cfg(windows)]
pub const DEFAULT_SCRIPT_PATTERN: &str = "*.cmd";
#[cfg(not(windows))]
pub const DEFAULT_SCRIPT_PATTERN: &str = "*.sh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub start_dir: PathBuf,
    pub stop_dir: PathBuf,
    pub script_pattern: String,
    pub log_file: PathBuf,
    pub retry_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub runtime: RuntimeConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            start_dir: PathBuf::from("start"),
            stop_dir: PathBuf::from("stop"),
            script_pattern: DEFAULT_SCRIPT_PATTERN.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            retry_interval_ms: DEFAULT_INTERVAL_MS,
            poll_interval_ms: DEFAULT_INTERVAL_MS,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Process names that identify a running SteamVR server.
    pub process_names: Vec<String>,
    pub app_key: String,
    pub manifest_path: PathBuf,
    /// SteamVR `config` directory; platform default when unset.
    pub config_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            process_names: vec!["vrserver".to_string()],
            app_key: DEFAULT_APP_KEY.to_string(),
            manifest_path: PathBuf::from(DEFAULT_MANIFEST),
            config_dir: None,
        }
    }
}

/// Paths and timings with every relative path anchored to the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub base_dir: PathBuf,
    pub start_dir: PathBuf,
    pub stop_dir: PathBuf,
    pub script_pattern: String,
    pub log_file: PathBuf,
    pub retry_interval: Duration,
    pub poll_interval: Duration,
    pub process_names: Vec<String>,
    pub app_key: String,
    pub manifest_path: PathBuf,
    pub runtime_config_dir: Option<PathBuf>,
}

impl AgentConfig {
    pub fn resolve(&self, base_dir: &Path) -> ResolvedConfig {
        ResolvedConfig {
            base_dir: base_dir.to_path_buf(),
            start_dir: anchor(base_dir, &self.start_dir),
            stop_dir: anchor(base_dir, &self.stop_dir),
            script_pattern: self.script_pattern.clone(),
            log_file: anchor(base_dir, &self.log_file),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            process_names: self.runtime.process_names.clone(),
            app_key: self.runtime.app_key.clone(),
            manifest_path: anchor(base_dir, &self.runtime.manifest_path),
            runtime_config_dir: self
                .runtime
                .config_dir
                .clone()
                .or_else(default_runtime_config_dir),
        }
    }
}

fn anchor(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Returns the directory containing the running executable.
pub fn default_base_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|err| StartStopError::BaseDirUnavailable(err.to_string()))?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| StartStopError::BaseDirUnavailable(format!("{} has no parent", exe.display())))
}

/// Returns the SteamVR `config` directory for this platform, if one can be
/// guessed.
pub fn default_runtime_config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        let program_files = std::env::var_os("ProgramFiles(x86)")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
        Some(program_files.join("Steam").join("config"))
    }
    #[cfg(not(windows))]
    {
        dirs::home_dir().map(|home| home.join(".steam").join("steam").join("config"))
    }
}

/// Loads the agent configuration.
///
/// `path` overrides the default `vr-startstop.toml` in `base_dir`. A missing
/// file yields defaults; an unreadable or malformed one is an error.
pub fn load_config(path: Option<&Path>, base_dir: &Path) -> Result<AgentConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => base_dir.join(CONFIG_FILE_NAME),
    };

    if !config_path.exists() {
        return Ok(AgentConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| {
        StartStopError::ConfigRead {
            path: config_path.clone(),
            source,
        }
    })?;
    let config: AgentConfig =
        toml::from_str(&content).map_err(|err| StartStopError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        })?;

    glob::Pattern::new(&config.script_pattern).map_err(|err| {
        StartStopError::InvalidPattern {
            pattern: config.script_pattern.clone(),
            details: err.to_string(),
        }
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(None, temp.path()).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "script_pattern = \"*.cmd\"\npoll_interval_ms = 250\n\n[runtime]\napp_key = \"me.agent\"\n",
        )
        .unwrap();

        let config = load_config(None, temp.path()).unwrap();
        assert_eq!(config.script_pattern, "*.cmd");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.retry_interval_ms, DEFAULT_INTERVAL_MS);
        assert_eq!(config.runtime.app_key, "me.agent");
        assert_eq!(config.runtime.process_names, vec!["vrserver".to_string()]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "start_dir = [").unwrap();

        let err = load_config(Some(&path), temp.path()).unwrap_err();
        assert!(matches!(err, StartStopError::ConfigMalformed { .. }));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "script_pattern = \"[\"\n").unwrap();

        let err = load_config(None, temp.path()).unwrap_err();
        assert!(matches!(err, StartStopError::InvalidPattern { .. }));
    }

    #[test]
    fn resolve_anchors_relative_paths() {
        let base = Path::new("/opt/agent");
        let mut config = AgentConfig::default();
        config.stop_dir = PathBuf::from("/srv/stop");
        config.runtime.config_dir = Some(PathBuf::from("/steam/config"));

        let resolved = config.resolve(base);
        assert_eq!(resolved.start_dir, base.join("start"));
        assert_eq!(resolved.stop_dir, PathBuf::from("/srv/stop"));
        assert_eq!(resolved.log_file, base.join(DEFAULT_LOG_FILE));
        assert_eq!(resolved.manifest_path, base.join(DEFAULT_MANIFEST));
        assert_eq!(resolved.retry_interval, Duration::from_secs(1));
        assert_eq!(
            resolved.runtime_config_dir,
            Some(PathBuf::from("/steam/config"))
        );
    }
}
