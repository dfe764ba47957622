//! Path resolution for containment checks.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Resolve `requested` against `root` the way the kernel would open it.
///
/// Relative paths are joined onto `root`. Every prefix that exists on disk is
/// canonicalized, so symlinks are followed before any later `..` is applied.
/// Once a component is missing the rest of the path is applied lexically,
/// which keeps the result meaningful for files that are about to be created.
pub fn resolve(root: &Path, requested: &Path) -> PathBuf {
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
            Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            // Safe to pop: `resolved` is either canonical or ends in a
            // component that does not exist, so it is never a symlink.
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                if let Ok(canonical) = fs::canonicalize(&resolved) {
                    resolved = canonical;
                }
            }
        }
    }
    resolved
}

/// Whether `path` is `root` or lies beneath it (component-wise).
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

/// Render `path` relative to `root` with `/` separators; `.` for the root itself.
pub fn display_relative(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}
