// src/exec/task_runner.rs

//! Single external process execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// One successful program run.
#[derive(Debug, Clone)]
pub struct ProgramRun {
    pub input_file: PathBuf,
}

/// Run `program <input_file>` in `workdir` and wait for it to exit.
///
/// Both pipes are drained and logged at debug so neither fills. A non-zero
/// exit is an error that carries the tail of stderr.
///
/// `workdir` becomes the child's cwd, so `program` and `input_file` must not
/// be relative to the caller's cwd.
pub async fn run_program(program: &Path, input_file: &Path, workdir: &Path) -> Result<ProgramRun> {
    info!(
        program = %program.display(),
        input = %input_file.display(),
        "starting external program"
    );

    let mut child = Command::new(program)
        .arg(input_file)
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning {:?} for {:?}", program, input_file))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let label = input_file.display().to_string();
    let stdout_task = tokio::spawn(collect_lines(stdout, label.clone(), "stdout"));
    let stderr_task = tokio::spawn(collect_lines(stderr, label, "stderr"));

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for {:?} on {:?}", program, input_file))?;

    stdout_task.await.context("joining stdout reader")?;
    let stderr = stderr_task.await.context("joining stderr reader")?;
    let exit_code = status.code().unwrap_or(-1);

    info!(
        input = %input_file.display(),
        exit_code,
        success = status.success(),
        "external program exited"
    );

    if !status.success() {
        let tail: Vec<_> = stderr.iter().rev().take(5).rev().cloned().collect();
        bail!(
            "{:?} exited with code {} on {:?}: {}",
            program,
            exit_code,
            input_file,
            tail.join(" | ")
        );
    }

    Ok(ProgramRun {
        input_file: input_file.to_path_buf(),
    })
}

async fn collect_lines<R>(reader: Option<R>, label: String, stream: &'static str) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Vec::new();
    };

    let mut lines = BufReader::new(reader).lines();
    let mut collected = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(input = %label, stream, "{}", line);
        collected.push(line);
    }
    collected
}
