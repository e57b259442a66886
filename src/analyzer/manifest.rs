//! Typed partial view of `package.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

pub const MANIFEST_FILE: &str = "package.json";

/// The subset of `package.json` the orchestrator cares about.
///
/// A missing file, invalid JSON, or a field with the wrong shape all collapse
/// to "no manifest data" instead of an error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub dev_dependencies: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub scripts: Option<BTreeMap<String, String>>,
}

impl PackageManifest {
    pub fn parse(content: &str) -> Option<Self> {
        serde_json::from_str(content).ok()
    }

    /// Read `<dir>/package.json`, or an empty manifest if unusable.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No readable manifest");
                return Self::default();
            }
        };
        Self::parse(&content).unwrap_or_else(|| {
            debug!(path = %path.display(), "Manifest is not valid package.json, ignoring");
            Self::default()
        })
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies
            .as_ref()
            .is_some_and(|deps| deps.contains_key(name))
            || self
                .dev_dependencies
                .as_ref()
                .is_some_and(|deps| deps.contains_key(name))
    }

    pub fn has_script(&self, name: &str) -> bool {
        self.scripts
            .as_ref()
            .is_some_and(|scripts| scripts.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = PackageManifest::parse(
            r#"{
                "name": "demo",
                "dependencies": {"@mastra/core": "^0.10.0"},
                "devDependencies": {"typescript": "^5"},
                "scripts": {"dev": "mastra dev", "build": "mastra build"}
            }"#,
        )
        .unwrap();
        assert!(manifest.has_dependency("@mastra/core"));
        assert!(manifest.has_dependency("typescript"));
        assert!(!manifest.has_dependency("react"));
        assert!(manifest.has_script("dev"));
        assert!(!manifest.has_script("start"));
    }

    #[test]
    fn test_wrong_shape_is_no_data() {
        assert!(PackageManifest::parse(r#"{"dependencies": ["a", "b"]}"#).is_none());
        assert!(PackageManifest::parse("not json").is_none());
    }

    #[test]
    fn test_load_missing_and_invalid_files() {
        let dir = tempdir().unwrap();
        assert_eq!(PackageManifest::load(dir.path()), PackageManifest::default());

        std::fs::write(dir.path().join(MANIFEST_FILE), "{ invalid").unwrap();
        assert_eq!(PackageManifest::load(dir.path()), PackageManifest::default());
    }
}
