use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::errors::ProjectError;
use crate::fetch::{GitFetcher, RepositoryFetcher};
use crate::ports::PortAllocator;

use super::models::ProjectInit;
use super::{Project, ProjectContext};

/// Builds projects that share one configuration, fetcher and port allocator.
pub struct ProjectFactory {
    config: Arc<OrchestratorConfig>,
    fetcher: Arc<dyn RepositoryFetcher>,
    ports: Arc<PortAllocator>,
}

impl ProjectFactory {
    pub fn new(config: OrchestratorConfig) -> Self {
        let fetcher = GitFetcher::new(
            config
                .cache_repositories
                .then(|| config.cache_dir.clone()),
        );
        Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            ports: PortAllocator::new(),
        }
    }

    /// Replace the repository fetcher, e.g. with a local mirror.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RepositoryFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    pub fn create(&self, init: ProjectInit) -> Result<Project, ProjectError> {
        Project::new(
            init,
            ProjectContext {
                config: Arc::clone(&self.config),
                fetcher: Arc::clone(&self.fetcher),
                ports: Some(Arc::clone(&self.ports)),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LaunchError;
    use crate::ports::Port;
    use tempfile::tempdir;

    const VIDEO: &str = "https://youtu.be/abc123";

    fn factory(workspace: &std::path::Path) -> ProjectFactory {
        ProjectFactory::new(OrchestratorConfig {
            workspace_root: workspace.to_path_buf(),
            cache_repositories: false,
            ..OrchestratorConfig::default()
        })
    }

    #[test]
    fn test_projects_get_distinct_ports() {
        let ws = tempdir().unwrap();
        let factory = factory(ws.path());
        let projects: Vec<Project> = (0..20)
            .map(|i| factory.create(ProjectInit::new(format!("p{i}"), "o/r", VIDEO)).unwrap())
            .collect();

        let mut ports: Vec<u16> = projects.iter().map(|p| p.port().value()).collect();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), 20);
        assert_eq!(factory.ports().leased_count(), 20);
    }

    #[test]
    fn test_dropping_project_releases_port() {
        let ws = tempdir().unwrap();
        let factory = factory(ws.path());
        let project = factory.create(ProjectInit::new("p", "o/r", VIDEO)).unwrap();
        let port = project.port();
        assert!(factory.ports().is_leased(port));
        drop(project);
        assert!(!factory.ports().is_leased(port));
    }

    #[test]
    fn test_caller_port_conflict_is_rejected() {
        let ws = tempdir().unwrap();
        let factory = factory(ws.path());
        let mut first = ProjectInit::new("a", "o/r", VIDEO);
        first.port = Some(5005);
        let mut second = ProjectInit::new("b", "o/r", VIDEO);
        second.port = Some(5005);

        let _a = factory.create(first).unwrap();
        let err = factory.create(second).unwrap_err();
        assert!(matches!(
            err,
            ProjectError::Launch(LaunchError::PortInUse { port: 5005 })
        ));
        assert!(factory.ports().is_leased(Port::new(5005).unwrap()));
    }

    #[tokio::test]
    async fn test_stop_releases_lease() {
        let ws = tempdir().unwrap();
        let factory = factory(ws.path());
        let mut project = factory.create(ProjectInit::new("p", "o/r", VIDEO)).unwrap();
        let port = project.port();
        project.stop_target_server();
        assert!(!factory.ports().is_leased(port));
        assert_eq!(project.port(), port);
    }
}
