//! SteamVR app registration.
//!
//! SteamVR keeps its app registry as JSON under its `config` directory:
//! `appconfig.json` lists installed manifest paths, and
//! `vrappconfig/<app_key>.vrappconfig` holds per-app settings such as
//! auto-launch. Both files are shared with SteamVR, so every write keeps the
//! keys we do not own.

use crate::error::RegistrationError;
use fs_err as fs;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const APP_CONFIG_FILE: &str = "appconfig.json";
const APP_SETTINGS_DIR: &str = "vrappconfig";
const MANIFEST_PATHS_KEY: &str = "manifest_paths";
const AUTOLAUNCH_KEY: &str = "autolaunch";

/// Outcome of [`AppRegistrar::ensure_registered`]. Each sub-step is `None`
/// when it was not attempted.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub already_registered: bool,
    pub manifest: Option<Result<(), RegistrationError>>,
    pub auto_launch: Option<Result<(), RegistrationError>>,
}

#[derive(Debug, Clone)]
pub struct AppRegistrar {
    config_dir: Option<PathBuf>,
    app_key: String,
    manifest_path: PathBuf,
}

impl AppRegistrar {
    pub fn new(config_dir: Option<PathBuf>, app_key: impl Into<String>, manifest_path: PathBuf) -> Self {
        Self {
            config_dir,
            app_key: app_key.into(),
            manifest_path,
        }
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// True if the manifest path is listed in `appconfig.json`.
    pub fn is_installed(&self) -> bool {
        let Ok(config_dir) = self.config_dir() else {
            return false;
        };
        match read_json_object(&config_dir.join(APP_CONFIG_FILE)) {
            Ok(object) => manifest_listed(&object, &self.manifest_key()),
            Err(err) => {
                warn!(error = %err, "Failed to read runtime app config");
                false
            }
        }
    }

    /// Registers the agent unless it already is. The two sub-steps run and
    /// fail independently; failures are logged and reported, never raised.
    pub fn ensure_registered(&self) -> RegistrationReport {
        if self.is_installed() {
            tracing::debug!(app_key = %self.app_key, "App already registered with runtime");
            return RegistrationReport {
                already_registered: true,
                ..RegistrationReport::default()
            };
        }

        let manifest = self.install_manifest();
        match &manifest {
            Ok(()) => info!("Successfully installed app manifest"),
            Err(err) => warn!(error = %err, "Error: Failed to add app manifest"),
        }

        let auto_launch = self.enable_auto_launch();
        match &auto_launch {
            Ok(()) => info!("Successfully set app to auto launch"),
            Err(err) => warn!(error = %err, "Error: Failed to turn on auto launch"),
        }

        RegistrationReport {
            already_registered: false,
            manifest: Some(manifest),
            auto_launch: Some(auto_launch),
        }
    }

    /// Adds the manifest path to `appconfig.json`.
    pub fn install_manifest(&self) -> Result<(), RegistrationError> {
        if !self.manifest_path.is_file() {
            return Err(RegistrationError::ManifestMissing(self.manifest_path.clone()));
        }
        let config_dir = self.config_dir()?;
        let path = config_dir.join(APP_CONFIG_FILE);
        let mut object = read_json_object(&path)?;

        let key = self.manifest_key();
        if manifest_listed(&object, &key) {
            return Ok(());
        }

        let paths = object
            .entry(MANIFEST_PATHS_KEY)
            .or_insert_with(|| Value::Array(vec![]));
        match paths {
            Value::Array(items) => items.push(Value::String(key)),
            _ => {
                return Err(RegistrationError::Malformed {
                    path,
                    details: format!("{} is not an array", MANIFEST_PATHS_KEY),
                })
            }
        }

        write_json_object(&path, &object)
    }

    /// Sets `autolaunch` in this app's `.vrappconfig`.
    pub fn enable_auto_launch(&self) -> Result<(), RegistrationError> {
        let config_dir = self.config_dir()?;
        let path = config_dir
            .join(APP_SETTINGS_DIR)
            .join(format!("{}.vrappconfig", self.app_key));
        let mut object = read_json_object(&path)?;
        object.insert(AUTOLAUNCH_KEY.to_string(), Value::Bool(true));
        write_json_object(&path, &object)
    }

    fn config_dir(&self) -> Result<&Path, RegistrationError> {
        match &self.config_dir {
            Some(dir) if dir.is_dir() => Ok(dir.as_path()),
            Some(dir) => Err(RegistrationError::ConfigDirMissing(dir.clone())),
            None => Err(RegistrationError::ConfigDirMissing(PathBuf::new())),
        }
    }

    fn manifest_key(&self) -> String {
        self.manifest_path.display().to_string()
    }
}

fn manifest_listed(object: &Map<String, Value>, key: &str) -> bool {
    object
        .get(MANIFEST_PATHS_KEY)
        .and_then(Value::as_array)
        .map(|items| items.iter().any(|item| item.as_str() == Some(key)))
        .unwrap_or(false)
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>, RegistrationError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => {
            return Err(RegistrationError::Malformed {
                path: path.to_path_buf(),
                details: err.to_string(),
            })
        }
    };

    match serde_json::from_slice::<Value>(&data) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(RegistrationError::Malformed {
            path: path.to_path_buf(),
            details: "top-level value is not an object".to_string(),
        }),
        Err(err) => Err(RegistrationError::Malformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        }),
    }
}

fn write_json_object(path: &Path, object: &Map<String, Value>) -> Result<(), RegistrationError> {
    let write_failed = |source| RegistrationError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_failed)?;
    }

    let payload = serde_json::to_vec_pretty(object).map_err(|err| RegistrationError::Malformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(write_failed)?;
    fs::rename(&tmp_path, path).map_err(write_failed)?;
    Ok(())
}
