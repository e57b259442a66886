//! Typed error hierarchy for the launchpad orchestrator.
//!
//! One enum per subsystem, joined at the aggregate:
//! - `ProjectError`: construction failures and lifecycle guards on `Project`
//! - `SetupError`: clone, `.env` materialization and dependency install
//! - `LaunchError`: child spawn, port leasing and readiness probing
//! - `PathGuardError`: path containment violations
//! - `StatsError`: the one fatal case of the stats analyzer

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the `Project` aggregate.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(
        "Invalid status '{value}'. Valid values: initialized, setting-up, ready, evaluating, evaluated, archived"
    )]
    InvalidStatus { value: String },

    #[error("Project identifier must not be empty")]
    EmptyIdentifier,

    #[error("Port {port} is outside the allowed range {min}-{max}")]
    PortOutOfRange { port: u16, min: u16, max: u16 },

    #[error("No recognizable video id in '{url}'")]
    MissingVideoId { url: String },

    #[error("Project {id} has a running server; stop it before running setup again")]
    SetupWhileRunning { id: String },

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    PathGuard(#[from] PathGuardError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Errors from materializing a project on disk.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Failed to clone {url}: {message}")]
    CloneFailed { url: String, message: String },

    #[error("Failed to write env file at {path}: {source}")]
    EnvWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Env value for '{key}' contains a line break")]
    InvalidEnvValue { key: String },

    #[error("Refusing to replace {}: not empty and not a git checkout", path.display())]
    TargetNotReplaceable { path: PathBuf },

    #[error("Failed to spawn {program}: {source}")]
    InstallerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} install failed with exit code: {exit_code}")]
    InstallFailed { program: String, exit_code: i32 },

    #[error("{stage} exceeded its deadline of {}s", timeout.as_secs_f64())]
    DeadlineExceeded { stage: String, timeout: Duration },

    #[error("Setup task aborted: {0}")]
    TaskAborted(String),
}

/// Errors from booting the target server.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {:.1}s waiting for {url}", elapsed.as_secs_f64())]
    ReadinessTimeout { url: String, elapsed: Duration },

    #[error("Port {port} is already leased by another project")]
    PortInUse { port: u16 },

    #[error("No free port left in {min}-{max}")]
    PortsExhausted { min: u16, max: u16 },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Errors from the path containment guard.
#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("Path '{}' escapes root {}", candidate.display(), root.display())]
    Escapes { candidate: PathBuf, root: PathBuf },

    #[error("Failed to resolve root {}: {source}", root.display())]
    RootUnresolvable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The only fatal stats failure: the project root itself can't be enumerated.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Failed to read project directory {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stats task aborted: {0}")]
    TaskAborted(String),
}
