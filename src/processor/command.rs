// src/processor/command.rs

//! Processor that runs an external tool through the platform shell.

use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::ProcessorError;
use crate::processor::{ProcessFuture, ProcessOutput, ProcessRequest, Processor};

/// Run `options.cmd` with `sh -c` (or `cmd /C` on Windows) in the project
/// root.
///
/// The command sees the request through environment variables:
///
/// | variable              | value                                      |
/// |-----------------------|--------------------------------------------|
/// | `ASSETDAG_TASK`       | task name                                  |
/// | `ASSETDAG_RUN_ID`     | build run id                               |
/// | `ASSETDAG_ROOT`       | project root                               |
/// | `ASSETDAG_DEST`       | absolute destination path                  |
/// | `ASSETDAG_SOURCES`    | newline separated absolute source paths    |
/// | `ASSETDAG_DATA`       | template data as a JSON object             |
/// | `ASSETDAG_SINCE`      | RFC 3339 `lastRun`, only for incremental   |
///
/// A non-zero exit status is a failure carrying the command's stderr. The
/// token is only checked before spawning; a started command always runs to
/// completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandProcessor;

impl Processor for CommandProcessor {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        Box::pin(run_command(request))
    }
}

async fn run_command(request: ProcessRequest) -> Result<ProcessOutput, ProcessorError> {
    let script = request
        .option_str("cmd")
        .ok_or_else(|| {
            ProcessorError::InvalidOptions("command processor needs a string `cmd`".to_string())
        })?
        .to_string();

    request.check_cancelled()?;

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&script);
        c
    };

    let dest = request.destination_path();
    let sources = request
        .sources
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    let data = serde_json::to_string(request.data.as_ref())
        .context("serialising template data")?;

    cmd.current_dir(&request.root)
        .env("ASSETDAG_TASK", &request.task)
        .env("ASSETDAG_RUN_ID", request.run_id.to_string())
        .env("ASSETDAG_ROOT", &request.root)
        .env("ASSETDAG_DEST", &dest)
        .env("ASSETDAG_SOURCES", sources)
        .env("ASSETDAG_DATA", data)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(since) = request.since {
        cmd.env("ASSETDAG_SINCE", since.to_rfc3339());
    }

    info!(task = %request.task, run_id = request.run_id, cmd = %script, "starting command");

    let output = cmd
        .output()
        .await
        .with_context(|| format!("spawning command for task '{}'", request.task))?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!(task = %request.task, run_id = request.run_id, "stdout: {}", line);
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ProcessorError::Failed(if stderr.is_empty() {
            format!("command exited with status {code}")
        } else {
            format!("command exited with status {code}: {stderr}")
        }));
    }

    let produced = if request.fs.exists(&dest) {
        vec![request.relative(&dest)]
    } else {
        Vec::new()
    };

    Ok(ProcessOutput { produced })
}
