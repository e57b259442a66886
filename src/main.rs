use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use launchpad::config::{CONFIG_DIR, OrchestratorConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(version, about = "Fetch, provision, boot and analyze external repositories")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to launchpad.toml. Defaults to ./.launchpad/launchpad.toml when present.
    #[arg(long, global = true, env = "LAUNCHPAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory searched for .launchpad/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clone, provision and boot a repository, then wait for Ctrl-C
    Up(UpArgs),
    /// Build a project from arguments and print its snapshot without touching disk
    Inspect(InspectArgs),
    /// Analyze an existing source tree
    Stats {
        /// Root of the fetched project
        dir: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Clone)]
pub struct ProjectArgs {
    /// Repository URL or owner/repo shorthand
    pub repo: String,

    /// Demo video URL
    #[arg(long)]
    pub video: String,

    /// Display name (defaults to the repository name)
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Port in 3000-9000 (allocated when omitted)
    #[arg(long)]
    pub port: Option<u16>,

    /// Project directory (defaults to <workspace_root>/<id>)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Project identifier (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Variables written to the project's .env file
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,
}

#[derive(Args, Clone)]
pub struct UpArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Readiness timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Package manager executable (overrides config and environment)
    #[arg(long)]
    pub package_manager: Option<PathBuf>,

    /// Clone directly instead of through the local mirror cache
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Initial status (initialized, setting-up, ready, evaluating, evaluated, archived)
    #[arg(long)]
    pub status: Option<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("launchpad={level}")));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialise tracing: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config_dir = project_dir.join(CONFIG_DIR);
    let config = OrchestratorConfig::load(cli.config.as_deref(), &config_dir)?;

    match &cli.command {
        Commands::Up(args) => cmd::cmd_up(config, args.clone()).await?,
        Commands::Inspect(args) => cmd::cmd_inspect(config, args.clone())?,
        Commands::Stats { dir } => cmd::cmd_stats(dir)?,
        Commands::Config => cmd::cmd_config(&config, cli.config.as_deref(), &config_dir)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("API_KEY=a=b").unwrap(),
            ("API_KEY".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_env_pair("EMPTY=").unwrap().1, "");
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=x").is_err());
    }

    #[test]
    fn test_cli_parses_up() {
        let cli = Cli::try_parse_from([
            "launchpad",
            "up",
            "owner/repo",
            "--video",
            "https://youtu.be/abc",
            "--env",
            "A=1",
            "--env",
            "B=2",
            "--timeout",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Up(args) => {
                assert_eq!(args.project.repo, "owner/repo");
                assert_eq!(args.project.env.len(), 2);
                assert_eq!(args.timeout, Some(5));
            }
            _ => panic!("expected up"),
        }
    }
}
