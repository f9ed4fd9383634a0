//! Execution of test commands against the current stream table.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::Context;
use stdcap_core::{StdStreams, StreamHandle, StreamId};

use crate::trace_categories;

/// Runs `command` through `sh -c`, wiring its standard streams to whatever the stream
/// table currently holds.
///
/// Streams backed by a descriptor are handed to the child directly. In-memory streams
/// are fed through pipes and copied.
///
/// Arguments:
///
/// * `command`: The shell command to run.
/// * `streams`: The stream table to wire the child to.
/// * `stdin_text`: Text to feed to the child instead of the table's standard input.
pub fn run_command(
    command: &str,
    streams: &StdStreams,
    stdin_text: Option<&str>,
) -> anyhow::Result<ExitStatus> {
    tracing::debug!(target: trace_categories::RUNNER, "running: {command}");

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);

    let feed_stdin = match stdin_text {
        Some(_) => {
            cmd.stdin(Stdio::piped());
            false
        }
        None => wire(&mut cmd, streams, StreamId::Stdin)?,
    };
    let copy_stdout = wire(&mut cmd, streams, StreamId::Stdout)?;
    let copy_stderr = wire(&mut cmd, streams, StreamId::Stderr)?;

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to run: {command}"))?;

    let child_stdin = child.stdin.take();
    let status = std::thread::scope(|scope| {
        // The child may exit without reading its input; a broken pipe is not a failure.
        if let Some(mut pipe) = child_stdin {
            scope.spawn(move || {
                let _ = match stdin_text {
                    Some(text) => pipe.write_all(text.as_bytes()),
                    None if feed_stdin => std::io::copy(&mut streams.stdin(), &mut pipe).map(|_| ()),
                    None => Ok(()),
                };
            });
        }

        let stdout_copier = copy_stdout
            .then(|| child.stdout.take())
            .flatten()
            .map(|pipe| scope.spawn(move || copy_pipe(pipe, streams.stdout())));
        let stderr_copier = copy_stderr
            .then(|| child.stderr.take())
            .flatten()
            .map(|pipe| scope.spawn(move || copy_pipe(pipe, streams.stderr())));

        for copier in [stdout_copier, stderr_copier].into_iter().flatten() {
            if let Ok(Err(e)) = copier.join() {
                tracing::warn!(target: trace_categories::RUNNER, "failed to copy child output: {e}");
            }
        }

        child.wait()
    })?;

    tracing::debug!(target: trace_categories::RUNNER, "command exited with {status}");

    Ok(status)
}

/// Configures one of the child's streams from the table. Returns whether the stream
/// must be piped and copied by the caller.
fn wire(cmd: &mut Command, streams: &StdStreams, id: StreamId) -> anyhow::Result<bool> {
    let (stdio, piped) = match streams.get(id)?.try_into_stdio() {
        Some(stdio) => (stdio, false),
        None => (Stdio::piped(), true),
    };

    match id {
        StreamId::Stdin => cmd.stdin(stdio),
        StreamId::Stdout => cmd.stdout(stdio),
        StreamId::Stderr => cmd.stderr(stdio),
    };

    Ok(piped)
}

fn copy_pipe(mut pipe: impl Read, mut dest: StreamHandle) -> std::io::Result<u64> {
    let copied = std::io::copy(&mut pipe, &mut dest)?;
    dest.flush()?;
    Ok(copied)
}
