//! Dependency installation through the configured package manager.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::errors::SetupError;

/// Runs `<package_manager> <install_args...>` inside a project directory.
#[derive(Debug, Clone)]
pub struct DependencyInstaller {
    program: PathBuf,
    args: Vec<String>,
}

impl DependencyInstaller {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Install and wait. Output is inherited so it shows up alongside ours.
    ///
    /// On deadline expiry the installer is killed and `DeadlineExceeded` is
    /// returned.
    pub async fn install(&self, dir: &Path, deadline: Option<Duration>) -> Result<(), SetupError> {
        let name = self.program_name();
        info!(program = %name, dir = %dir.display(), "Installing dependencies");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SetupError::InstallerSpawn {
                program: name.clone(),
                source,
            })?;

        let status = match deadline {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(program = %name, error = %e, "Failed to kill installer after deadline");
                    }
                    return Err(SetupError::DeadlineExceeded {
                        stage: format!("{} install", name),
                        timeout: limit,
                    });
                }
            },
            None => child.wait().await,
        }
        .map_err(|source| SetupError::InstallerSpawn {
            program: name.clone(),
            source,
        })?;

        if !status.success() {
            return Err(SetupError::InstallFailed {
                program: name,
                exit_code: status.code().unwrap_or(-1),
            });
        }

        info!(program = %name, "Dependencies installed");
        Ok(())
    }
}
