//! Child-process supervision for a project's target server.
//!
//! State machine: `Absent → Starting → Running → Stopped`. `spawn` never
//! double-spawns and `stop` is a no-op when nothing runs.

pub mod registry;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::analyzer::PackageManifest;
use crate::errors::LaunchError;
use crate::ports::Port;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Absent,
    Starting,
    Running,
    Stopped,
}

/// Prefer `dev`, then `start`; default to `dev` when neither is declared.
pub fn select_run_script(manifest: &PackageManifest) -> &'static str {
    if manifest.has_script("dev") {
        "dev"
    } else if manifest.has_script("start") {
        "start"
    } else {
        "dev"
    }
}

/// Owns one child process and its cleanup-registry entry.
#[derive(Debug)]
pub struct ProcessSupervisor {
    key: String,
    program: PathBuf,
    child: Option<Child>,
    state: ProcessState,
    registration: Option<registry::Registration>,
}

impl ProcessSupervisor {
    /// `key` identifies the child in the process-wide cleanup registry.
    pub fn new(key: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            program: program.into(),
            child: None,
            state: ProcessState::Absent,
            registration: None,
        }
    }

    /// Current state, noticing a child that exited on its own.
    pub fn state(&mut self) -> ProcessState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(key = %self.key, ?status, "Target server exited");
                    self.child = None;
                    self.state = ProcessState::Stopped;
                    self.unregister();
                }
                Ok(None) => {}
                Err(e) => warn!(key = %self.key, error = %e, "Failed to poll child status"),
            }
        }
        self.state
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.state(), ProcessState::Starting | ProcessState::Running)
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Spawn `<program> run <script>` in `dir` with `PORT` set.
    ///
    /// Returns `Ok(false)` without spawning when a child is already alive.
    pub fn spawn(&mut self, dir: &Path, port: Port) -> Result<bool, LaunchError> {
        if self.is_running() {
            debug!(key = %self.key, "Target server already running, not spawning");
            return Ok(false);
        }

        let script = select_run_script(&PackageManifest::load(dir));
        let command_line = format!("{} run {}", self.program.display(), script);

        let mut command = Command::new(&self.program);
        command
            .arg("run")
            .arg(script)
            .current_dir(dir)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group so the signal reaches the whole script tree.
        #[cfg(unix)]
        command.process_group(0);

        self.state = ProcessState::Starting;
        let child = command.spawn().map_err(|source| {
            self.state = ProcessState::Absent;
            LaunchError::SpawnFailed {
                command: command_line.clone(),
                source,
            }
        })?;

        let pid = child.id();
        info!(key = %self.key, command = %command_line, port = port.value(), pid, "Spawned target server");
        self.child = Some(child);

        self.registration = pid.map(|pid| registry::register(&self.key, pid));
        Ok(true)
    }

    /// Mark a starting child as running once readiness is confirmed.
    pub fn mark_running(&mut self) {
        if self.state == ProcessState::Starting && self.child.is_some() {
            self.state = ProcessState::Running;
        }
    }

    /// Send SIGTERM to the child if it is still alive.
    ///
    /// Returns whether a signal was delivered. Delivery failures are logged,
    /// never returned.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        let Some(mut child) = self.child.take() else {
            return false;
        };
        self.unregister();
        self.state = ProcessState::Stopped;

        let delivered = match child.id() {
            Some(pid) => match registry::send_terminate(pid) {
                Ok(()) => {
                    info!(key = %self.key, pid, "Sent terminate signal to target server");
                    true
                }
                Err(e) if e.kind() == std::io::ErrorKind::Unsupported => {
                    let killed = child.start_kill().is_ok();
                    if killed {
                        info!(key = %self.key, pid, "Killed target server");
                    } else {
                        warn!(key = %self.key, pid, "Failed to kill target server");
                    }
                    killed
                }
                Err(e) => {
                    warn!(key = %self.key, pid, error = %e, "Failed to signal target server");
                    false
                }
            },
            None => false,
        };

        // Reap in the background so the child doesn't linger as a zombie.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = child.wait().await;
            });
        }
        delivered
    }

    fn unregister(&mut self) {
        if let Some(registration) = self.registration.take() {
            registry::unregister(registration);
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.child.is_some() && self.stop() {
            debug!(key = %self.key, "Stopped target server on drop");
        }
    }
}
