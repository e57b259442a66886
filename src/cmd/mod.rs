//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `up`       | `Up`             |
//! | `inspect`  | `Inspect`        |
//! | `stats`    | `Stats`          |
//! | `config`   | `Config`         |

pub mod config;
pub mod inspect;
pub mod stats;
pub mod up;

pub use config::cmd_config;
pub use inspect::cmd_inspect;
pub use stats::cmd_stats;
pub use up::cmd_up;

use launchpad::ProjectInit;

use super::ProjectArgs;

/// Last path segment of a repository reference, minus any `.git` suffix.
pub(crate) fn default_name(repo: &str) -> String {
    repo.trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .map(|s| s.trim_end_matches(".git"))
        .filter(|s| !s.is_empty())
        .unwrap_or(repo)
        .to_string()
}

pub(crate) fn project_init(args: ProjectArgs) -> ProjectInit {
    let name = args.name.unwrap_or_else(|| default_name(&args.repo));
    let mut init = ProjectInit::new(name, args.repo, args.video);
    init.description = args.description;
    init.port = args.port;
    init.directory = args.dir;
    init.id = args.id;
    init.env_config = args.env.into_iter().collect();
    init
}
