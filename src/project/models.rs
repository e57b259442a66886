use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::StatsResult;
use crate::errors::ProjectError;

pub const DEFAULT_DESCRIPTION: &str = "No description provided";

/// Non-empty, immutable project identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Result<Self, ProjectError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ProjectError::EmptyIdentifier);
        }
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectId {
    type Error = ProjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Initialized,
    SettingUp,
    Ready,
    Evaluating,
    Evaluated,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::SettingUp => "setting-up",
            Self::Ready => "ready",
            Self::Evaluating => "evaluating",
            Self::Evaluated => "evaluated",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "setting-up" => Ok(Self::SettingUp),
            "ready" => Ok(Self::Ready),
            "evaluating" => Ok(Self::Evaluating),
            "evaluated" => Ok(Self::Evaluated),
            "archived" => Ok(Self::Archived),
            _ => Err(ProjectError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction input for a `Project`.
///
/// `repo` takes either a full URL or an `owner/repo` shorthand. `status` is a
/// raw string so persisted or caller-supplied values are validated here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInit {
    pub name: String,
    #[serde(rename = "videoURL")]
    pub video_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "repoURL", alias = "repoURLOrShorthand")]
    pub repo: String,
    #[serde(default)]
    pub env_config: BTreeMap<String, String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stats: Option<StatsResult>,
    #[serde(default)]
    pub scores: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProjectInit {
    pub fn new(name: impl Into<String>, repo: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo: repo.into(),
            video_url: video_url.into(),
            ..Default::default()
        }
    }
}
