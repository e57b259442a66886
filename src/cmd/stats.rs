//! `launchpad stats`: analyze an existing tree.

use std::path::Path;

use anyhow::{Context, Result};
use launchpad::analyzer::StatsAnalyzer;

pub fn cmd_stats(dir: &Path) -> Result<()> {
    let stats = StatsAnalyzer::new(dir)
        .analyze()
        .with_context(|| format!("Failed to analyze {}", dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
