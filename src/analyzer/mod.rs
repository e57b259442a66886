//! Best-effort static analysis of a fetched project.
//!
//! | Submodule      | What it owns                                  |
//! |----------------|-----------------------------------------------|
//! | `manifest`     | `PackageManifest`, typed `package.json` view  |
//! | `technologies` | `TECHNOLOGIES` catalog of detectable stacks   |
//!
//! Counts are file-level: a file with three agent constructions counts once.
//! Unreadable files are skipped; only an unreadable project root is fatal.

pub mod manifest;
pub mod technologies;

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::errors::StatsError;

pub use manifest::PackageManifest;
pub use technologies::{TECHNOLOGIES, Technology};

/// Directory scanned below the project root.
pub const SOURCE_DIR: &str = "src";

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];

const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "out",
    "coverage",
    ".git",
    ".next",
    ".mastra",
    ".turbo",
];

static AGENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"new\s+Agent\s*\(").unwrap());
static TOOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"createTool\s*\(").unwrap());
static WORKFLOW_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(createWorkflow|createStep)\s*\(|new\s+Workflow\s*\(").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureCounts {
    pub agents: usize,
    pub tools: usize,
    pub workflows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResult {
    pub architecture: ArchitectureCounts,
    pub detected_technologies: BTreeMap<String, bool>,
}

/// Walks `<root>/src` and applies the name/content heuristics.
#[derive(Debug, Clone)]
pub struct StatsAnalyzer {
    root: PathBuf,
}

impl StatsAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn analyze(&self) -> Result<StatsResult, StatsError> {
        std::fs::read_dir(&self.root).map_err(|source| StatsError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;

        let manifest = PackageManifest::load(&self.root);
        let mut detected: BTreeMap<String, bool> = TECHNOLOGIES
            .iter()
            .map(|t| (t.name.to_string(), t.packages.iter().any(|p| manifest.has_dependency(p))))
            .collect();

        let mut counts = ArchitectureCounts::default();
        let mut scanned = 0usize;
        for path in self.source_files() {
            let Ok(content) = std::fs::read_to_string(&path) else {
                debug!(path = %path.display(), "Skipping unreadable file");
                continue;
            };
            scanned += 1;

            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            if has_segment(relative, "agents") || AGENT_PATTERN.is_match(&content) {
                counts.agents += 1;
            }
            if has_segment(relative, "tools") || TOOL_PATTERN.is_match(&content) {
                counts.tools += 1;
            }
            if has_segment(relative, "workflows") || WORKFLOW_PATTERN.is_match(&content) {
                counts.workflows += 1;
            }

            for tech in TECHNOLOGIES.iter() {
                if let Some(flag) = detected.get_mut(tech.name)
                    && !*flag
                    && tech.pattern.is_match(&content)
                {
                    *flag = true;
                }
            }
        }

        info!(
            root = %self.root.display(),
            files = scanned,
            agents = counts.agents,
            tools = counts.tools,
            workflows = counts.workflows,
            "Computed project stats"
        );

        Ok(StatsResult {
            architecture: counts,
            detected_technologies: detected,
        })
    }

    fn source_files(&self) -> Vec<PathBuf> {
        let src = self.root.join(SOURCE_DIR);
        if !src.is_dir() {
            debug!(path = %src.display(), "No source directory to scan");
            return Vec::new();
        }
        WalkDir::new(&src)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_excluded(e))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && has_source_extension(e.path()))
            .map(|e| e.into_path())
            .collect()
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn has_segment(path: &Path, segment: &str) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(part) if part == segment))
}
