//! `.env` materialization.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::SetupError;

pub const ENV_FILE_NAME: &str = ".env";

/// Render one `KEY=VALUE` line per entry. No quoting is applied, so values
/// with line breaks are rejected.
pub fn render_env(config: &BTreeMap<String, String>) -> Result<String, SetupError> {
    let mut out = String::new();
    for (key, value) in config {
        if value.contains(['\n', '\r']) || key.contains(['\n', '\r', '=']) {
            return Err(SetupError::InvalidEnvValue { key: key.clone() });
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    Ok(out)
}

/// Write `<dir>/.env`, replacing any existing file.
pub async fn write_env_file(
    dir: &Path,
    config: &BTreeMap<String, String>,
) -> Result<PathBuf, SetupError> {
    let path = dir.join(ENV_FILE_NAME);
    let content = render_env(config)?;
    tokio::fs::write(&path, content)
        .await
        .map_err(|source| SetupError::EnvWriteFailed {
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), entries = config.len(), "Wrote env file");
    Ok(path)
}
