//! The `Project` aggregate: one external repository's on-disk materialization
//! and runtime lifecycle.
//!
//! ## Flow
//!
//! ```text
//! ProjectFactory::create() ──> Project (status = initialized)
//!        │
//!        │ setup()                 clone ──> [ write .env ∥ install deps ]
//!        │ start_target_server()   spawn ──> poll readiness
//!        │ get_stats() / to_dto()  read-only projections
//!        v
//! stop_target_server()  or  signal/exit cleanup via supervisor::registry
//! ```
//!
//! Status transitions belong to the caller; the aggregate only enforces that
//! the status is one of the six `ProjectStatus` values.

pub mod dto;
pub mod factory;
pub mod models;
pub mod video;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analyzer::{StatsAnalyzer, StatsResult};
use crate::config::OrchestratorConfig;
use crate::env_file::write_env_file;
use crate::errors::{ProjectError, SetupError, StatsError};
use crate::fetch::{RepositoryFetcher, normalize_repo_url};
use crate::installer::DependencyInstaller;
use crate::path_guard::PathGuard;
use crate::ports::{Port, PortAllocator, PortLease};
use crate::readiness::ReadinessProbe;
use crate::supervisor::{ProcessState, ProcessSupervisor};

pub use dto::ProjectDto;
pub use factory::ProjectFactory;
pub use models::{DEFAULT_DESCRIPTION, ProjectId, ProjectInit, ProjectStatus};
pub use video::{canonical_video_url, extract_video_id};

/// Collaborators shared by every project built from one factory.
#[derive(Clone)]
pub struct ProjectContext {
    pub config: Arc<OrchestratorConfig>,
    pub fetcher: Arc<dyn RepositoryFetcher>,
    /// When present, ports are leased so concurrent projects never share one.
    pub ports: Option<Arc<PortAllocator>>,
}

pub struct Project {
    id: ProjectId,
    name: String,
    description: String,
    repo_url: String,
    video_url: String,
    directory: PathBuf,
    port: Port,
    status: ProjectStatus,
    env_config: BTreeMap<String, String>,
    stats: Option<StatsResult>,
    scores: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    context: ProjectContext,
    lease: Option<PortLease>,
    supervisor: ProcessSupervisor,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("repo_url", &self.repo_url)
            .field("directory", &self.directory)
            .field("port", &self.port)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Validate and normalize `init`. Performs no filesystem writes.
    pub fn new(init: ProjectInit, context: ProjectContext) -> Result<Self, ProjectError> {
        let id = match init.id {
            Some(id) => ProjectId::new(id)?,
            None => ProjectId::generate(),
        };

        let status = match init.status.as_deref() {
            Some(raw) => raw.parse()?,
            None => ProjectStatus::default(),
        };

        let description = init
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

        let repo_url = normalize_repo_url(&init.repo, &context.config.git_host);

        let requested = init.port.map(Port::new).transpose()?;
        let (port, lease) = match (&context.ports, requested) {
            (Some(ports), Some(port)) => (port, Some(ports.reserve(port)?)),
            (Some(ports), None) => {
                let lease = ports.allocate()?;
                (lease.port(), Some(lease))
            }
            (None, Some(port)) => (port, None),
            (None, None) => (Port::random(), None),
        };

        // The id may come from the caller, so it must not steer the default
        // directory outside the workspace root.
        let directory = match init.directory {
            Some(dir) => dir,
            None => PathGuard::new(&context.config.workspace_root)?.resolve(id.as_str())?,
        };

        let supervisor =
            ProcessSupervisor::new(id.as_str(), context.config.package_manager.clone());

        debug!(project_id = %id, repo_url = %repo_url, port = port.value(), "Constructed project");

        Ok(Self {
            id,
            name: init.name,
            description,
            repo_url,
            video_url: init.video_url,
            directory,
            port,
            status,
            env_config: init.env_config,
            stats: init.stats,
            scores: init.scores,
            created_at: init.created_at.unwrap_or_else(Utc::now),
            context,
            lease,
            supervisor,
        })
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn video_url(&self) -> &str {
        &self.video_url
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn env_config(&self) -> &BTreeMap<String, String> {
        &self.env_config
    }

    pub fn stats(&self) -> Option<&StatsResult> {
        self.stats.as_ref()
    }

    pub fn scores(&self) -> Option<&serde_json::Value> {
        self.scores.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_status(&mut self, status: ProjectStatus) {
        self.status = status;
    }

    /// Parse and apply a raw status string.
    pub fn set_status_str(&mut self, raw: &str) -> Result<(), ProjectError> {
        self.status = raw.parse()?;
        Ok(())
    }

    pub fn set_stats(&mut self, stats: Option<StatsResult>) {
        self.stats = stats;
    }

    pub fn set_scores(&mut self, scores: Option<serde_json::Value>) {
        self.scores = scores;
    }

    pub fn video_id(&self) -> Result<String, ProjectError> {
        extract_video_id(&self.video_url).ok_or_else(|| ProjectError::MissingVideoId {
            url: self.video_url.clone(),
        })
    }

    pub fn canonical_video_url(&self) -> Result<String, ProjectError> {
        self.video_id().map(|id| canonical_video_url(&id))
    }

    /// Clone the repository, then write `.env` and install dependencies
    /// concurrently.
    ///
    /// Refuses to run while the target server is up. If either concurrent
    /// step fails the first error is returned; the other step keeps running
    /// to completion in the background and its result is discarded.
    pub async fn setup(&mut self) -> Result<(), ProjectError> {
        if self.supervisor.is_running() {
            return Err(ProjectError::SetupWhileRunning {
                id: self.id.to_string(),
            });
        }

        let config = Arc::clone(&self.context.config);
        info!(project_id = %self.id, repo_url = %self.repo_url, dir = %self.directory.display(), "Setting up project");

        self.context
            .fetcher
            .fetch(&self.repo_url, &self.directory, config.clone_timeout)
            .await?;

        let env_task = {
            let dir = self.directory.clone();
            let env_config = self.env_config.clone();
            tokio::spawn(async move { write_env_file(&dir, &env_config).await.map(|_| ()) })
        };
        let install_task = {
            let dir = self.directory.clone();
            let installer =
                DependencyInstaller::new(config.package_manager.clone(), config.install_args.clone());
            let deadline = config.install_timeout;
            tokio::spawn(async move { installer.install(&dir, deadline).await })
        };

        tokio::try_join!(joined(env_task), joined(install_task))?;

        info!(project_id = %self.id, "Project setup complete");
        Ok(())
    }

    /// Static stats for the fetched tree. Recomputed on every call.
    pub async fn get_stats(&self) -> Result<StatsResult, ProjectError> {
        let analyzer = StatsAnalyzer::new(self.directory.clone());
        let stats = tokio::task::spawn_blocking(move || analyzer.analyze())
            .await
            .map_err(|e| StatsError::TaskAborted(e.to_string()))??;
        Ok(stats)
    }

    /// Spawn the target server and wait for it using the configured timeout.
    pub async fn start_target_server(&mut self) -> Result<(), ProjectError> {
        let timeout = self.context.config.readiness_timeout;
        self.start_target_server_with_timeout(timeout).await
    }

    /// Spawn the target server and block until it answers HTTP or `timeout`
    /// elapses. A no-op when a child is already alive.
    ///
    /// On readiness timeout the freshly spawned child is terminated; the spawn
    /// is not retried.
    pub async fn start_target_server_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<(), ProjectError> {
        if self.supervisor.is_running() {
            debug!(project_id = %self.id, "Target server already running");
            return Ok(());
        }

        if let Some(ports) = &self.context.ports
            && self.lease.is_none()
        {
            self.lease = Some(ports.reserve(self.port)?);
        }

        let config = &self.context.config;
        let probe = ReadinessProbe::for_port(
            config.probe_scheme,
            self.port.value(),
            config.poll_interval,
            timeout,
        )?;

        self.supervisor.spawn(&self.directory, self.port)?;

        match probe.wait_ready().await {
            Ok(elapsed) => {
                self.supervisor.mark_running();
                info!(
                    project_id = %self.id,
                    url = probe.url(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Target server started"
                );
                Ok(())
            }
            Err(e) => {
                warn!(project_id = %self.id, error = %e, "Target server never became ready");
                self.stop_target_server();
                Err(e.into())
            }
        }
    }

    /// Send a terminate signal to the running child, if any, and release
    /// the port lease. Returns whether a signal was delivered.
    pub fn stop_target_server(&mut self) -> bool {
        let delivered = self.supervisor.stop();
        self.lease = None;
        if delivered {
            info!(project_id = %self.id, "Target server stopped");
        }
        delivered
    }

    pub fn is_server_running(&mut self) -> bool {
        self.supervisor.is_running()
    }

    pub fn process_state(&mut self) -> ProcessState {
        self.supervisor.state()
    }

    pub fn server_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Serializable snapshot. Fails when `video_url` has no recognizable id.
    pub fn to_dto(&self) -> Result<ProjectDto, ProjectError> {
        let video_id = self.video_id()?;
        Ok(ProjectDto {
            name: self.name.clone(),
            id: self.id.to_string(),
            video_url: canonical_video_url(&video_id),
            env_config: self.env_config.clone(),
            video_id,
            description: self.description.clone(),
            port: self.port.value(),
            repo_url: self.repo_url.clone(),
            status: self.status,
            directory: self.directory.to_string_lossy().to_string(),
            stats: self.stats.clone(),
            scores: self.scores.clone(),
            created_at: self.created_at,
        })
    }
}

async fn joined<T>(handle: JoinHandle<Result<T, SetupError>>) -> Result<T, SetupError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(SetupError::TaskAborted(e.to_string())),
    }
}
