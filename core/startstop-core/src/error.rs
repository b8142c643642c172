//! Error types for startstop-core operations.
//!
//! Only configuration and logging failures are meant to stop the agent.
//! Everything the lifecycle loop touches at runtime is logged and contained.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Agent Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur while setting up or running the agent.
#[derive(Debug, thiserror::Error)]
pub enum StartStopError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Agent base directory could not be determined: {0}")]
    BaseDirUnavailable(String),

    #[error("Configuration file unreadable: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid script pattern {pattern:?}: {details}")]
    InvalidPattern { pattern: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Logging Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Log file unavailable: {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging already initialized")]
    LoggingInitialized,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using StartStopError.
pub type Result<T> = std::result::Result<T, StartStopError>;

/// Failure to attach to the VR runtime. Always recoverable; the lifecycle
/// loop retries.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("VR runtime is not running (looked for {expected})")]
    RuntimeNotRunning { expected: String },

    #[error("VR runtime probe failed: {0}")]
    Probe(String),
}

/// Failure in one of the two registration sub-steps.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("App manifest not found at {0}")]
    ManifestMissing(PathBuf),

    #[error("Runtime config directory not found at {0}")]
    ConfigDirMissing(PathBuf),

    #[error("Runtime config file malformed: {path}: {details}")]
    Malformed { path: PathBuf, details: String },

    #[error("Runtime config write failed: {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
