// src/processor/concat.rs

use tracing::debug;

use crate::errors::ProcessorError;
use crate::processor::{ProcessFuture, ProcessOutput, ProcessRequest, Processor};

const DEFAULT_SEPARATOR: &str = "\n";

/// Concatenate all sources, in sorted path order, into one destination file.
///
/// Options:
/// - `separator` (string, default `"\n"`): inserted between two sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatProcessor;

impl Processor for ConcatProcessor {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || concat_sources(&request))
                .await
                .map_err(|e| ProcessorError::Other(e.into()))?
        })
    }
}

fn concat_sources(request: &ProcessRequest) -> Result<ProcessOutput, ProcessorError> {
    if !request.destination.is_file() {
        return Err(ProcessorError::InvalidOptions(format!(
            "concat needs a file destination, {:?} is a directory",
            request.destination.path()
        )));
    }

    let separator = match request.options.get("separator") {
        None => DEFAULT_SEPARATOR,
        Some(value) => value.as_str().ok_or_else(|| {
            ProcessorError::InvalidOptions("`separator` must be a string".to_string())
        })?,
    };

    let mut sources = request.sources.clone();
    sources.sort();

    let mut out: Vec<u8> = Vec::new();
    for (i, src) in sources.iter().enumerate() {
        request.check_cancelled()?;
        if i > 0 {
            out.extend_from_slice(separator.as_bytes());
        }
        out.extend(request.fs.read(src)?);
    }

    request.check_cancelled()?;
    let dest = request.destination_path();
    request.fs.write_atomic(&dest, &out)?;
    debug!(
        task = %request.task,
        sources = sources.len(),
        bytes = out.len(),
        to = ?dest,
        "concatenated"
    );

    Ok(ProcessOutput {
        produced: vec![request.relative(&dest)],
    })
}
