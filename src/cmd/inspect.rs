//! `launchpad inspect`: construct a project and print its snapshot.

use anyhow::Result;
use launchpad::{OrchestratorConfig, ProjectFactory};

use super::super::InspectArgs;
use super::project_init;

pub fn cmd_inspect(config: OrchestratorConfig, args: InspectArgs) -> Result<()> {
    let factory = ProjectFactory::new(config);
    let mut init = project_init(args.project);
    init.status = args.status;

    let project = factory.create(init)?;
    let dto = project.to_dto()?;
    println!("{}", serde_json::to_string_pretty(&dto)?);
    Ok(())
}
