//! Layered configuration for the orchestrator.
//!
//! Values are read from `launchpad.toml`, then overridden by environment
//! variables, then by CLI flags (applied by the binary).
//!
//! # Configuration File Format
//!
//! ```toml
//! [installer]
//! package_manager = "pnpm"
//! install_args = ["install", "--frozen-lockfile"]
//! timeout_secs = 600
//!
//! [repository]
//! host = "https://github.com"
//! cache = true
//! timeout_secs = 300
//!
//! [runtime]
//! workspace_root = "/var/tmp/launchpad"
//! readiness_timeout_secs = 60
//! poll_interval_ms = 500
//! probe_scheme = "http"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-local directory holding `launchpad.toml`.
pub const CONFIG_DIR: &str = ".launchpad";
pub const CONFIG_FILE: &str = "launchpad.toml";

pub const ENV_PACKAGE_MANAGER: &str = "LAUNCHPAD_PACKAGE_MANAGER";
pub const ENV_WORKSPACE_ROOT: &str = "LAUNCHPAD_WORKSPACE_ROOT";
pub const ENV_CACHE_DIR: &str = "LAUNCHPAD_CACHE_DIR";

/// Scheme used by the readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeScheme {
    #[default]
    Http,
    Https,
}

impl ProbeScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl std::str::FromStr for ProbeScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => anyhow::bail!("Invalid probe scheme '{}'. Valid values: http, https", s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallerSection {
    #[serde(default)]
    pub package_manager: Option<String>,
    #[serde(default)]
    pub install_args: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositorySection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub cache: Option<bool>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub readiness_timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub probe_scheme: Option<ProbeScheme>,
}

/// Raw structure of `launchpad.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchpadToml {
    #[serde(default)]
    pub installer: InstallerSection,
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub runtime: RuntimeSection,
}

impl LaunchpadToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse launchpad.toml")
    }

    /// Load `<dir>/launchpad.toml`, or defaults when the file doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Resolved runtime configuration shared by every project a factory builds.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorConfig {
    /// Package-manager executable used for install and run.
    pub package_manager: PathBuf,
    pub install_args: Vec<String>,
    /// Deadline for dependency installation; `None` waits forever.
    pub install_timeout: Option<Duration>,
    /// Host prefixed to `owner/repo` shorthands.
    pub git_host: String,
    pub cache_repositories: bool,
    pub cache_dir: PathBuf,
    /// Deadline for the clone; `None` waits forever.
    pub clone_timeout: Option<Duration>,
    /// Parent directory for defaulted project directories.
    pub workspace_root: PathBuf,
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
    pub probe_scheme: ProbeScheme,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            package_manager: PathBuf::from("npm"),
            install_args: vec!["install".to_string()],
            install_timeout: Some(Duration::from_secs(600)),
            git_host: "https://github.com".to_string(),
            cache_repositories: true,
            cache_dir: default_cache_dir(),
            clone_timeout: Some(Duration::from_secs(300)),
            workspace_root: std::env::temp_dir(),
            readiness_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            probe_scheme: ProbeScheme::Http,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("launchpad")
        .join("repos")
}

impl OrchestratorConfig {
    /// Build from a parsed file, then apply environment overrides.
    pub fn from_toml(toml: &LaunchpadToml) -> Self {
        let mut config = Self::default();

        if let Some(pm) = &toml.installer.package_manager {
            config.package_manager = PathBuf::from(pm);
        }
        if let Some(args) = &toml.installer.install_args {
            config.install_args = args.clone();
        }
        if let Some(secs) = toml.installer.timeout_secs {
            config.install_timeout = timeout_from_secs(secs);
        }
        if let Some(host) = &toml.repository.host {
            config.git_host = host.trim_end_matches('/').to_string();
        }
        if let Some(cache) = toml.repository.cache {
            config.cache_repositories = cache;
        }
        if let Some(dir) = &toml.repository.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(secs) = toml.repository.timeout_secs {
            config.clone_timeout = timeout_from_secs(secs);
        }
        if let Some(root) = &toml.runtime.workspace_root {
            config.workspace_root = root.clone();
        }
        if let Some(secs) = toml.runtime.readiness_timeout_secs {
            config.readiness_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = toml.runtime.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(scheme) = toml.runtime.probe_scheme {
            config.probe_scheme = scheme;
        }

        config.apply_env();
        config
    }

    /// Load from an explicit file, or `<dir>/launchpad.toml` if present.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        let toml = match explicit {
            Some(path) => LaunchpadToml::load(path)?,
            None => LaunchpadToml::load_or_default(dir)?,
        };
        Ok(Self::from_toml(&toml))
    }

    fn apply_env(&mut self) {
        if let Ok(pm) = std::env::var(ENV_PACKAGE_MANAGER)
            && !pm.trim().is_empty()
        {
            self.package_manager = PathBuf::from(pm);
        }
        if let Ok(root) = std::env::var(ENV_WORKSPACE_ROOT)
            && !root.trim().is_empty()
        {
            self.workspace_root = PathBuf::from(root);
        }
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR)
            && !dir.trim().is_empty()
        {
            self.cache_dir = PathBuf::from(dir);
        }
    }

    /// Short name of the package manager for messages ("npm", "pnpm").
    pub fn package_manager_name(&self) -> String {
        self.package_manager
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.package_manager.to_string_lossy().to_string())
    }
}

// A zero timeout in the file means "no deadline".
fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn test_defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.package_manager, PathBuf::from("npm"));
        assert_eq!(config.install_args, vec!["install".to_string()]);
        assert_eq!(config.git_host, "https://github.com");
        assert_eq!(config.readiness_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.probe_scheme, ProbeScheme::Http);
        assert_eq!(config.workspace_root, std::env::temp_dir());
    }

    #[test]
    fn test_parse_empty() {
        let toml = LaunchpadToml::parse("").unwrap();
        assert!(toml.installer.package_manager.is_none());
        assert!(toml.runtime.probe_scheme.is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
[installer]
package_manager = "/usr/local/bin/pnpm"
install_args = ["install", "--frozen-lockfile"]
timeout_secs = 0

[repository]
host = "https://gitlab.com/"
cache = false
timeout_secs = 30

[runtime]
workspace_root = "/srv/projects"
readiness_timeout_secs = 5
poll_interval_ms = 100
probe_scheme = "https"
"#;
        let _guard = ENV_MUTEX.lock().unwrap();
        let toml = LaunchpadToml::parse(content).unwrap();
        let config = OrchestratorConfig::from_toml(&toml);

        assert_eq!(config.package_manager_name(), "pnpm");
        assert_eq!(config.install_args.len(), 2);
        assert!(config.install_timeout.is_none());
        assert_eq!(config.git_host, "https://gitlab.com");
        assert!(!config.cache_repositories);
        assert_eq!(config.clone_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.readiness_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.probe_scheme, ProbeScheme::Https);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(LaunchpadToml::parse("[installer\nbroken").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = LaunchpadToml::load_or_default(dir.path()).unwrap();
        assert!(toml.repository.host.is_none());
    }

    #[test]
    fn test_load_or_default_with_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("launchpad.toml"),
            "[runtime]\nreadiness_timeout_secs = 12\n",
        )
        .unwrap();
        let toml = LaunchpadToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.runtime.readiness_timeout_secs, Some(12));
    }

    #[test]
    fn test_env_overrides_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = std::env::var(ENV_PACKAGE_MANAGER).ok();
        unsafe { std::env::set_var(ENV_PACKAGE_MANAGER, "yarn") };

        let toml = LaunchpadToml::parse("[installer]\npackage_manager = \"pnpm\"\n").unwrap();
        let config = OrchestratorConfig::from_toml(&toml);
        assert_eq!(config.package_manager, PathBuf::from("yarn"));

        match saved {
            Some(val) => unsafe { std::env::set_var(ENV_PACKAGE_MANAGER, val) },
            None => unsafe { std::env::remove_var(ENV_PACKAGE_MANAGER) },
        }
    }

    #[test]
    fn test_probe_scheme_from_str() {
        assert_eq!("HTTPS".parse::<ProbeScheme>().unwrap(), ProbeScheme::Https);
        assert!("ftp".parse::<ProbeScheme>().is_err());
    }
}
