//! `launchpad config`: print the effective configuration.

use std::path::Path;

use anyhow::Result;
use launchpad::OrchestratorConfig;
use launchpad::config::CONFIG_FILE;

pub fn cmd_config(config: &OrchestratorConfig, explicit: Option<&Path>, config_dir: &Path) -> Result<()> {
    let default_path = config_dir.join(CONFIG_FILE);
    match explicit {
        Some(path) => eprintln!("Config file: {}", path.display()),
        None if default_path.exists() => eprintln!("Config file: {}", default_path.display()),
        None => eprintln!("No {} found at {}; using defaults", CONFIG_FILE, default_path.display()),
    }

    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
