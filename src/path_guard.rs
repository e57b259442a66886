//! Containment guard for user-influenced path fragments.

use std::path::{Component, Path, PathBuf};

use crate::errors::PathGuardError;

/// Resolves relative candidates against a fixed root and rejects anything
/// that lands outside it, whether through `..` or through a symlink.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// The root must exist; it is canonicalized once here.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathGuardError> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|source| PathGuardError::RootUnresolvable {
                root: root.to_path_buf(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` to an absolute path inside the root.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Result<PathBuf, PathGuardError> {
        let candidate = candidate.as_ref();
        let escapes = || PathGuardError::Escapes {
            candidate: candidate.to_path_buf(),
            root: self.root.clone(),
        };

        let joined = normalize(&self.root.join(candidate)).ok_or_else(escapes)?;
        if !joined.starts_with(&self.root) {
            return Err(escapes());
        }

        // Whatever part of the path already exists may contain symlinks.
        let resolved = resolve_existing_prefix(&joined);
        if !resolved.starts_with(&self.root) {
            return Err(escapes());
        }

        Ok(resolved)
    }

    pub fn contains(&self, candidate: impl AsRef<Path>) -> bool {
        self.resolve(candidate).is_ok()
    }
}

/// Lexically collapse `.` and `..`. Returns `None` when `..` climbs past `/`.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Canonicalize the longest existing ancestor and re-append the remainder.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in rest.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rejects_parent_traversal() {
        let dir = tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();

        let err = guard.resolve("../outside.txt").unwrap_err();
        assert!(matches!(err, PathGuardError::Escapes { .. }));
    }

    #[test]
    fn test_accepts_nested_relative_path() {
        let dir = tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();

        let resolved = guard.resolve("subdir/file.txt").unwrap();
        assert!(resolved.starts_with(guard.root()));
        assert!(resolved.ends_with("subdir/file.txt"));
    }

    #[test]
    fn test_accepts_dotdot_that_stays_inside() {
        let dir = tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();

        let resolved = guard.resolve("a/../b/c.txt").unwrap();
        assert_eq!(resolved, guard.root().join("b/c.txt"));
    }

    #[test]
    fn test_rejects_absolute_candidate_outside_root() {
        let dir = tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        assert!(!guard.contains("/etc/passwd"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let err = PathGuard::new("/definitely/not/a/real/root").unwrap_err();
        assert!(matches!(err, PathGuardError::RootUnresolvable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let guard = PathGuard::new(root.path()).unwrap();
        assert!(!guard.contains("link/secret.txt"));
    }
}
