use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::engine::TaskName;
use crate::errors::{AssetdagError, Result};
use crate::fs::FileSystem;
use crate::path_utils::{glob_base, to_slash};

/// Compiled include/exclude glob patterns for a single task.
///
/// Patterns are relative to the project root. `*` does not cross directory
/// separators; `**` does. A path belongs to the task when it matches at
/// least one include pattern and no exclude pattern.
#[derive(Clone)]
pub struct SourcePatterns {
    include: Vec<String>,
    exclude: Vec<String>,
    include_set: GlobSet,
    exclude_set: Option<GlobSet>,
    /// Static prefix of each include pattern, index-aligned with `include`.
    bases: Vec<PathBuf>,
}

impl fmt::Debug for SourcePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePatterns")
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .finish_non_exhaustive()
    }
}

impl SourcePatterns {
    /// Compile the patterns for `task`.
    pub fn compile(task: &str, include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set = build_globset(task, include)?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(task, exclude)?)
        };

        Ok(Self {
            include: include.to_vec(),
            exclude: exclude.to_vec(),
            include_set,
            exclude_set,
            bases: include.iter().map(|p| glob_base(p)).collect(),
        })
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Returns true if the given path (relative to the project root) belongs
    /// to this task, e.g. `"src/assets/sass/main.scss"`.
    pub fn matches(&self, rel_path: impl AsRef<Path>) -> bool {
        let rel = to_slash(rel_path.as_ref());
        if !self.include_set.is_match(&rel) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(&rel) {
                return false;
            }
        }
        true
    }

    /// Directories that must be watched to observe every matching path.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.bases.iter().map(|b| b.as_path())
    }

    /// Static base of the first include pattern matching `rel_path`.
    ///
    /// Outputs of directory-mirroring processors are placed relative to this
    /// base, so `src/assets/js/app.js` matched by `src/assets/js/**/*.js`
    /// lands at `<destination>/app.js`.
    pub fn base_for(&self, rel_path: impl AsRef<Path>) -> Option<&Path> {
        let rel = to_slash(rel_path.as_ref());
        let first = self.include_set.matches(&rel).into_iter().min()?;
        self.bases.get(first).map(|b| b.as_path())
    }
}

fn compile_glob(pattern: &str) -> std::result::Result<Glob, globset::Error> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
}

fn build_globset(task: &str, patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = compile_glob(pat).map_err(|source| AssetdagError::InvalidPattern {
            task: task.to_string(),
            pattern: pat.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| AssetdagError::InvalidPattern {
        task: task.to_string(),
        pattern: patterns.join(", "),
        source,
    })
}

/// Collect all files under `root` that belong to the given task.
///
/// Returns absolute paths sorted lexically so processors see a stable order.
/// Only the static bases of the include patterns are walked.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    task: &TaskName,
    patterns: &SourcePatterns,
) -> anyhow::Result<Vec<PathBuf>> {
    use anyhow::Context;

    let mut files = Vec::new();
    let mut stack: Vec<PathBuf> = crate::path_utils::collapse_roots(
        patterns.roots().map(|b| b.to_path_buf()),
    )
    .into_iter()
    .map(|base| if base == Path::new(".") { root.to_path_buf() } else { root.join(base) })
    .filter(|dir| fs.is_dir(dir))
    .collect();

    while let Some(dir) = stack.pop() {
        let entries = fs
            .read_dir(&dir)
            .with_context(|| format!("collecting sources for task '{task}'"))?;
        for path in entries {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Ok(rel) = path.strip_prefix(root) {
                    if patterns.matches(rel) {
                        files.push(path);
                    }
                }
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
