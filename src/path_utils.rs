// src/path_utils.rs

//! Utility functions for path handling.
//!
//! Source patterns, change events and destinations are all expressed
//! relative to the project root with forward slashes, so that glob matching
//! behaves the same on every platform.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again. A deleted file cannot be
///   canonicalized, so its parent is canonicalized instead.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    let root_canon = root.canonicalize().ok()?;
    let path_canon = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            let parent = path.parent()?.canonicalize().ok()?;
            parent.join(path.file_name()?)
        }
    };

    path_canon
        .strip_prefix(&root_canon)
        .ok()
        .map(to_slash)
}

/// Render a path with forward slashes and without a leading `./`.
pub fn to_slash(path: &Path) -> String {
    let s = normalize_lexically(path).to_string_lossy().replace('\\', "/");
    if s == "." { String::new() } else { s }
}

/// Lexically normalise a path: drop `.` components, fold `..` into the
/// preceding component and strip trailing separators. Never touches the
/// filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Whether a path component contains glob metacharacters.
pub fn has_glob_meta(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Split a glob into its static, wildcard-free directory prefix.
///
/// - `src/assets/**/*.css` → `src/assets`
/// - `src/index.html` → `src` (a literal file contributes its directory)
/// - `*.md` → `.`
pub fn glob_base(pattern: &str) -> PathBuf {
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();
    let split_idx = components
        .iter()
        .position(|c| has_glob_meta(c))
        .unwrap_or(components.len().saturating_sub(1));

    let base: PathBuf = components.iter().take(split_idx).collect();
    let base = normalize_lexically(&base);
    if pattern.starts_with('/') && !base.is_absolute() {
        Path::new("/").join(base)
    } else {
        base
    }
}

/// Reduce a set of directories to the minimal set of recursive watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a`.
pub fn collapse_roots<I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let sorted: BTreeSet<PathBuf> = paths.into_iter().collect();

    let mut filtered: Vec<PathBuf> = Vec::new();
    for path in sorted {
        if let Some(last) = filtered.last() {
            if last == Path::new(".") || path.starts_with(last) {
                continue;
            }
        }
        filtered.push(path);
    }
    filtered
}
