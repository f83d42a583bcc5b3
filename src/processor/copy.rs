// src/processor/copy.rs

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::errors::ProcessorError;
use crate::processor::{ProcessFuture, ProcessOutput, ProcessRequest, Processor};

/// Mirror every source file under the destination directory, keeping its
/// path relative to the static base of the pattern that matched it.
///
/// With a file destination exactly one source is allowed. When the request
/// carries a `since` timestamp, files not modified after it are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyProcessor;

impl Processor for CopyProcessor {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || copy_sources(&request))
                .await
                .map_err(|e| ProcessorError::Other(e.into()))?
        })
    }
}

fn copy_sources(request: &ProcessRequest) -> Result<ProcessOutput, ProcessorError> {
    let dest = request.destination_path();
    if request.destination.is_file() && request.sources.len() > 1 {
        return Err(ProcessorError::InvalidOptions(format!(
            "copy into file destination {:?} needs a single source, got {}",
            request.destination.path(),
            request.sources.len()
        )));
    }

    let mut staged: Vec<Staged> = Vec::new();
    if let Err(err) = stage_sources(request, &dest, &mut staged) {
        discard(request, &staged);
        return Err(err);
    }

    request.check_cancelled().inspect_err(|_| discard(request, &staged))?;
    commit(request, staged)
}

/// A copy written next to its target but not yet moved into place.
#[derive(Debug)]
struct Staged {
    source: PathBuf,
    staged: PathBuf,
    target: PathBuf,
}

fn stage_sources(
    request: &ProcessRequest,
    dest: &Path,
    staged: &mut Vec<Staged>,
) -> Result<(), ProcessorError> {
    for src in &request.sources {
        request.check_cancelled()?;

        if let Some(since) = request.since {
            let modified: DateTime<Utc> = request.fs.modified(src)?.into();
            if modified <= since {
                trace!(task = %request.task, path = ?src, "unchanged since last run, skipping");
                continue;
            }
        }

        let target = if request.destination.is_file() {
            dest.to_path_buf()
        } else {
            dest.join(mirrored_path(request, src))
        };
        let staging = staging_path(&target);

        let bytes = request.fs.read(src)?;
        request.fs.write_atomic(&staging, &bytes)?;
        staged.push(Staged {
            source: src.clone(),
            staged: staging,
            target,
        });
    }
    Ok(())
}

/// Move every staged copy into place. If one move fails, targets already
/// replaced get their previous contents back.
fn commit(
    request: &ProcessRequest,
    staged: Vec<Staged>,
) -> Result<ProcessOutput, ProcessorError> {
    let mut replaced: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(staged.len());

    for (i, entry) in staged.iter().enumerate() {
        let previous = if request.fs.is_file(&entry.target) {
            match request.fs.read(&entry.target) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    roll_back(request, &replaced);
                    discard(request, &staged[i..]);
                    return Err(err.into());
                }
            }
        } else {
            None
        };

        if let Err(err) = request.fs.rename(&entry.staged, &entry.target) {
            roll_back(request, &replaced);
            discard(request, &staged[i..]);
            return Err(err.into());
        }
        debug!(task = %request.task, from = ?entry.source, to = ?entry.target, "copied");
        replaced.push((entry.target.clone(), previous));
    }

    Ok(ProcessOutput {
        produced: staged.iter().map(|e| request.relative(&e.target)).collect(),
    })
}

fn roll_back(request: &ProcessRequest, replaced: &[(PathBuf, Option<Vec<u8>>)]) {
    for (target, previous) in replaced.iter().rev() {
        let restored = match previous {
            Some(bytes) => request.fs.write_atomic(target, bytes),
            None => request.fs.remove_all(target),
        };
        if let Err(err) = restored {
            warn!(
                task = %request.task,
                path = ?target,
                error = %err,
                "failed to restore previous output"
            );
        }
    }
}

fn discard(request: &ProcessRequest, staged: &[Staged]) {
    for entry in staged {
        if let Err(err) = request.fs.remove_all(&entry.staged) {
            debug!(
                task = %request.task,
                path = ?entry.staged,
                error = %err,
                "failed to remove staged copy"
            );
        }
    }
}

/// `public/img/a.png` is staged as `public/img/.a.png.assetdag-staged`.
fn staging_path(target: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    if let Some(file_name) = target.file_name() {
        name.push(file_name);
    }
    name.push(".assetdag-staged");
    target.with_file_name(name)
}

/// Path of `src` below the base of the include pattern that matched it.
fn mirrored_path(request: &ProcessRequest, src: &Path) -> PathBuf {
    let rel = request.relative(src);
    match request.patterns.base_for(&rel) {
        Some(base) if base != Path::new(".") => rel
            .strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or(rel.clone()),
        _ => rel,
    }
}
