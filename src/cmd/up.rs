//! `launchpad up`: full lifecycle for one repository.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use launchpad::{OrchestratorConfig, ProjectFactory, ProjectStatus};
use tracing::info;

use super::super::UpArgs;
use super::project_init;

pub async fn cmd_up(mut config: OrchestratorConfig, args: UpArgs) -> Result<()> {
    if let Some(pm) = args.package_manager {
        config.package_manager = pm;
    }
    if args.no_cache {
        config.cache_repositories = false;
    }

    let factory = ProjectFactory::new(config);
    let mut project = factory.create(project_init(args.project))?;
    info!(project_id = %project.id(), dir = %project.directory().display(), "Created project");

    project.set_status(ProjectStatus::SettingUp);
    project
        .setup()
        .await
        .with_context(|| format!("Setup failed for {}", project.repo_url()))?;
    project.set_status(ProjectStatus::Ready);

    let stats = project.get_stats().await?;
    project.set_stats(Some(stats));

    match args.timeout {
        Some(secs) => {
            project
                .start_target_server_with_timeout(Duration::from_secs(secs))
                .await?
        }
        None => project.start_target_server().await?,
    }

    println!("{}", serde_json::to_string_pretty(&project.to_dto()?)?);
    eprintln!(
        "Serving {} on port {}. Press Ctrl-C to stop.",
        project.name(),
        project.port()
    );

    // SIGINT/SIGTERM belong to the supervisor registry, which stops the
    // server and exits with 130/143.
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        if !project.is_server_running() {
            bail!("Target server for {} exited unexpectedly", project.name());
        }
    }
}
