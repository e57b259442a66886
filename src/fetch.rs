//! Repository fetching: normalize references and clone into a project directory.
//!
//! `GitFetcher` keeps a bare mirror per repository URL under a cache directory,
//! refreshes it with a fetch, and clones from the mirror into the target after
//! wiping whatever was there before. Only empty directories and earlier clones
//! are wiped. On deadline expiry the fetch returns at once and the clone thread
//! is cancelled through a `CancellationToken` polled by the transfer-progress
//! callback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks, Repository};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::SetupError;

/// Prefixes that mark a reference as a full URL rather than `owner/repo`.
const URL_PREFIXES: &[&str] = &["http://", "https://", "git@", "ssh://", "file://"];

/// Expand `owner/repo` into `<host>/owner/repo`; full URLs pass through.
pub fn normalize_repo_url(reference: &str, host: &str) -> String {
    let reference = reference.trim();
    if URL_PREFIXES.iter().any(|p| reference.starts_with(p)) {
        return reference.to_string();
    }
    format!(
        "{}/{}",
        host.trim_end_matches('/'),
        reference.trim_start_matches('/')
    )
}

/// Clones a repository into a directory.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Clone `url` into `target`, replacing any existing contents.
    async fn fetch(
        &self,
        url: &str,
        target: &Path,
        deadline: Option<Duration>,
    ) -> Result<(), SetupError>;
}

// One lock per cache entry so concurrent fetches of a URL don't interleave.
static CACHE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn cache_lock(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = CACHE_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(locks.entry(path.to_path_buf()).or_default())
}

/// `git2`-backed fetcher with an optional local mirror cache.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    cache_dir: Option<PathBuf>,
}

impl GitFetcher {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }

    pub fn cached(cache_dir: impl Into<PathBuf>) -> Self {
        Self::new(Some(cache_dir.into()))
    }

    pub fn uncached() -> Self {
        Self::new(None)
    }

    /// Mirror location for `url`: `<cache>/<sha256(url)[..16]>.git`.
    pub fn cache_path(&self, url: &str) -> Option<PathBuf> {
        let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.git", &digest[..16])))
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    async fn fetch(
        &self,
        url: &str,
        target: &Path,
        deadline: Option<Duration>,
    ) -> Result<(), SetupError> {
        ensure_replaceable(target)?;
        if let Some(limit) = deadline {
            apply_transport_timeouts(limit);
        }

        info!(url, target = %target.display(), "Cloning repository");

        let cancel = CancellationToken::new();
        let mirror = self.cache_path(url);
        let job_url = url.to_string();
        let job_target = target.to_path_buf();
        let job_cancel = cancel.clone();
        let mut job = tokio::task::spawn_blocking(move || {
            clone_with_cache(&job_url, &job_target, mirror.as_deref(), &job_cancel)
        });

        let result = match deadline {
            Some(limit) => match tokio::time::timeout(limit, &mut job).await {
                Ok(result) => result,
                Err(_) => {
                    // The blocking clone is left to stop at its next progress
                    // callback or socket timeout.
                    cancel.cancel();
                    warn!(url, timeout_secs = limit.as_secs_f64(), "Clone exceeded its deadline");
                    return Err(SetupError::DeadlineExceeded {
                        stage: "clone".to_string(),
                        timeout: limit,
                    });
                }
            },
            None => job.await,
        };

        match result {
            Ok(Ok(())) => {
                debug!(url, "Clone complete");
                Ok(())
            }
            Ok(Err(e)) => Err(SetupError::CloneFailed {
                url: url.to_string(),
                message: e.message().to_string(),
            }),
            Err(join_err) => Err(SetupError::TaskAborted(join_err.to_string())),
        }
    }
}

/// Fail unless `target` is missing, an empty directory, or an earlier clone.
///
/// Fetching wipes the target first, so anything else is left untouched.
pub fn ensure_replaceable(target: &Path) -> Result<(), SetupError> {
    let metadata = match std::fs::symlink_metadata(target) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(_) => {
            return Err(SetupError::TargetNotReplaceable {
                path: target.to_path_buf(),
            });
        }
    };

    let replaceable = metadata.is_dir()
        && (target.join(".git").exists()
            || std::fs::read_dir(target)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false));
    if replaceable {
        Ok(())
    } else {
        Err(SetupError::TargetNotReplaceable {
            path: target.to_path_buf(),
        })
    }
}

// libgit2 socket timeouts are process-wide. They bound a clone thread that
// is stuck on a silent server after its deadline has already been reported.
fn apply_transport_timeouts(limit: Duration) {
    let millis = i32::try_from(limit.as_millis()).unwrap_or(i32::MAX).max(1);
    // SAFETY: only updates libgit2's global transport options.
    let result = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to set git transport timeouts");
    }
}

fn fetch_options(cancel: &CancellationToken) -> FetchOptions<'static> {
    let token = cancel.clone();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| !token.is_cancelled());
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn clone_with_cache(
    url: &str,
    target: &Path,
    mirror: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<(), git2::Error> {
    if target.exists() {
        std::fs::remove_dir_all(target).map_err(|e| {
            git2::Error::from_str(&format!("Failed to clear {}: {}", target.display(), e))
        })?;
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            git2::Error::from_str(&format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let Some(mirror) = mirror else {
        RepoBuilder::new()
            .fetch_options(fetch_options(cancel))
            .clone(url, target)?;
        return Ok(());
    };

    let lock = cache_lock(mirror);
    let _held = lock.lock().unwrap_or_else(|e| e.into_inner());

    if let Err(e) = refresh_mirror(url, mirror, cancel) {
        if cancel.is_cancelled() {
            return Err(e);
        }
        warn!(url, error = %e, "Mirror refresh failed, cloning directly");
        let _ = std::fs::remove_dir_all(mirror);
        RepoBuilder::new()
            .fetch_options(fetch_options(cancel))
            .clone(url, target)?;
        return Ok(());
    }

    let mirror_str = mirror.to_string_lossy().to_string();
    let repo = RepoBuilder::new().clone(&mirror_str, target)?;
    repo.remote_set_url("origin", url)?;
    Ok(())
}

fn refresh_mirror(url: &str, mirror: &Path, cancel: &CancellationToken) -> Result<(), git2::Error> {
    if let Ok(repo) = Repository::open_bare(mirror) {
        debug!(url, mirror = %mirror.display(), "Refreshing cached mirror");
        let mut remote = repo.find_remote("origin")?;
        remote.fetch(
            &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
            Some(&mut fetch_options(cancel)),
            None,
        )?;
        return Ok(());
    }

    if mirror.exists() {
        let _ = std::fs::remove_dir_all(mirror);
    }
    if let Some(parent) = mirror.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            git2::Error::from_str(&format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    debug!(url, mirror = %mirror.display(), "Creating cached mirror");
    RepoBuilder::new()
        .bare(true)
        .fetch_options(fetch_options(cancel))
        .clone(url, mirror)?;
    Ok(())
}
