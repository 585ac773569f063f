//! Path guard for safe archive extraction
//!
//! Every entry name is checked twice before anything touches the disk: a
//! syntactic pass over the raw name, then a canonical pass that resolves the
//! joined path (including symlinks materialized by earlier entries) and
//! requires the canonical destination root as a component-wise prefix.

use crate::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{error, warn};

/// Security options for extraction
#[derive(Debug, Clone)]
pub struct SecurityOptions {
    /// Whether to allow symlinks that point outside the extraction directory
    pub allow_external_symlinks: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            allow_external_symlinks: true,
        }
    }
}

/// Reject names that are empty, absolute, contain a backslash or a `..` segment
pub fn is_syntactically_safe(name: &str) -> bool {
    if name.is_empty() || name.starts_with('/') || name.contains('\\') {
        return false;
    }
    !name.split('/').any(|segment| segment == "..")
}

/// Destination root resolved once, used to validate every entry of an archive
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// The destination must already exist
    pub fn new(destination: &Path) -> Result<Self> {
        let root = fs::canonicalize(destination)
            .map_err(|e| Error::filesystem(destination, "resolving destination", e))?;
        Ok(Self { root })
    }

    /// Canonical destination root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `entry_name` under the root, or fail with [`Error::PathTraversal`]
    pub fn validate(&self, entry_name: &str) -> Result<PathBuf> {
        if !is_syntactically_safe(entry_name) {
            return Err(self.traversal(self.root.join(entry_name), entry_name));
        }

        let mut candidate = self.root.clone();
        for component in Path::new(entry_name).components() {
            match component {
                Component::Normal(name) => candidate.push(name),
                Component::CurDir => {}
                _ => return Err(self.traversal(self.root.join(entry_name), entry_name)),
            }
        }

        let resolved = resolve_parent(&candidate);
        if !resolved.starts_with(&self.root) {
            return Err(self.traversal(resolved, entry_name));
        }

        Ok(resolved)
    }

    /// Check a symlink target against the root
    ///
    /// `link_path` is the already validated location of the link. Absolute
    /// targets and relative targets that climb above the root are rejected
    /// unless `allow_external` is set.
    pub fn validate_symlink(&self, link_path: &Path, target: &Path, allow_external: bool) -> Result<()> {
        if allow_external {
            return Ok(());
        }

        if target.has_root() {
            warn!(link = ?link_path, target = ?target, "Symlink has absolute target");
            return Err(Error::SecurityError(format!(
                "Symlink points outside extraction directory: {:?} -> {:?}",
                link_path, target
            )));
        }

        let link_parent = link_path
            .parent()
            .ok_or_else(|| Error::SecurityError("Symlink has no parent directory".to_string()))?;

        let mut normalized = PathBuf::new();
        let start_path = link_parent.strip_prefix(&self.root).unwrap_or(link_parent);
        for component in start_path.components() {
            if let Component::Normal(name) = component {
                normalized.push(name)
            }
        }

        for component in target.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        warn!(link = ?link_path, target = ?target, "Symlink target escapes extraction directory");
                        return Err(Error::SecurityError(format!(
                            "Symlink target would escape extraction directory: {:?} -> {:?}",
                            link_path, target
                        )));
                    }
                }
                Component::Normal(name) => normalized.push(name),
                Component::CurDir => {}
                _ => {
                    return Err(Error::SecurityError(format!(
                        "Invalid symlink target: {:?} -> {:?}",
                        link_path, target
                    )));
                }
            }
        }

        Ok(())
    }

    fn traversal(&self, resolved: PathBuf, entry_name: &str) -> Error {
        error!(root = ?self.root, entry = entry_name, resolved = ?resolved, "Entry escapes destination");
        Error::PathTraversal {
            resolved,
            entry: entry_name.to_string(),
        }
    }
}

/// One-shot form of [`PathGuard::validate`]
pub fn validate_path(destination: &Path, entry_name: &str) -> Result<PathBuf> {
    PathGuard::new(destination)?.validate(entry_name)
}

// Canonicalize the longest existing ancestor of the parent directory and
// re-append the rest. The final component is left alone: writers replace
// whatever sits there instead of following it.
fn resolve_parent(candidate: &Path) -> PathBuf {
    let (parent, file_name) = match (candidate.parent(), candidate.file_name()) {
        (Some(parent), Some(file_name)) => (parent, file_name),
        _ => return candidate.to_path_buf(),
    };

    for ancestor in parent.ancestors() {
        if let Ok(canonical) = fs::canonicalize(ancestor) {
            let rest = parent.strip_prefix(ancestor).unwrap_or(Path::new(""));
            return canonical.join(rest).join(file_name);
        }
    }

    candidate.to_path_buf()
}
