use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::ProjectStatus;
use crate::analyzer::StatsResult;

/// Flat, serializable snapshot of a `Project`.
///
/// `videoURL` is the canonical form; `videoId` is derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDto {
    pub name: String,
    pub id: String,
    #[serde(rename = "videoURL")]
    pub video_url: String,
    pub env_config: BTreeMap<String, String>,
    pub video_id: String,
    pub description: String,
    pub port: u16,
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub status: ProjectStatus,
    pub directory: String,
    pub stats: Option<StatsResult>,
    pub scores: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
