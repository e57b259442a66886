pub mod analyzer;
pub mod config;
pub mod env_file;
pub mod errors;
pub mod fetch;
pub mod installer;
pub mod path_guard;
pub mod ports;
pub mod project;
pub mod readiness;
pub mod supervisor;

pub use config::OrchestratorConfig;
pub use errors::{LaunchError, PathGuardError, ProjectError, SetupError, StatsError};
pub use project::{Project, ProjectDto, ProjectFactory, ProjectInit, ProjectStatus};
