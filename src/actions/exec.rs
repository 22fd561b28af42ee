// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Exec action.
//!
//! Interactive mode drops the operator into the dialect's client shell with
//! the local terminal in raw mode and resizes forwarded to the remote PTY.
//! A supplied command bypasses the dialect shell and runs literally.

use anyhow::{Context, Result};
use futures::SinkExt;
use kube::Client;
use kube::api::TerminalSize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::Global;
use crate::errors::Error;
use crate::kubernetes::exec::{ExecOptions, exec};
use crate::session::Session;

pub struct ExecArgs {
    /// One-shot command; empty means interactive shell.
    pub command: Vec<String>,
}

pub async fn run(
    client: &Client,
    global: &Global,
    session: &Session,
    args: ExecArgs,
) -> Result<()> {
    if args.command.is_empty() {
        interactive(client, global, session).await
    } else {
        one_shot(client, global, &args.command.join(" ")).await
    }
}

/// Run a literal command, piping its output through.
async fn one_shot(client: &Client, global: &Global, command: &str) -> Result<()> {
    let mut stream = exec(
        client,
        &global.namespace,
        global.exec_target(),
        command,
        ExecOptions {
            stdin: false,
            stdout: true,
            stderr: true,
            tty: false,
        },
    )
    .await?;

    let stdout = stream.stdout.take();
    let stderr = stream.stderr.take();

    let out_task = tokio::spawn(async move {
        if let Some(mut stdout) = stdout {
            let _ = tokio::io::copy(&mut stdout, &mut tokio::io::stdout()).await;
        }
    });
    let err_task = tokio::spawn(async move {
        if let Some(mut stderr) = stderr {
            let _ = tokio::io::copy(&mut stderr, &mut tokio::io::stderr()).await;
        }
    });

    let _ = futures::future::join(out_task, err_task).await;
    stream.wait().await
}

/// Interactive client shell with TTY passthrough.
async fn interactive(client: &Client, global: &Global, session: &Session) -> Result<()> {
    let execer = global.dialect.as_execer().ok_or(Error::CapabilityMissing {
        dialect: global.dialect.info().pretty_name(),
        operation: "exec",
    })?;
    let command = execer.exec_command(global).render();
    debug!(command = %session.masks.apply(&command), "starting interactive shell");

    let mut stream = exec(
        client,
        &global.namespace,
        global.exec_target(),
        &command,
        ExecOptions::interactive(),
    )
    .await?;

    let _raw = RawModeGuard::enable()?;

    // seed the remote PTY with the current size, then follow SIGWINCH
    if let Some(mut size_tx) = stream.terminal_size.take() {
        if let Ok(size) = terminal_size() {
            let _ = size_tx.send(size).await;
        }
        spawn_resize_forwarder(size_tx);
    }

    let mut remote_stdin = stream
        .stdin
        .take()
        .context("exec returned no stdin stream")?;
    let stdin_task = tokio::spawn(async move {
        let mut local_stdin = tokio::io::stdin();
        let _ = tokio::io::copy(&mut local_stdin, &mut remote_stdin).await;
        let _ = remote_stdin.shutdown().await;
    });

    if let Some(mut remote_stdout) = stream.stdout.take() {
        let mut local_stdout = tokio::io::stdout();
        let _ = tokio::io::copy(&mut remote_stdout, &mut local_stdout).await;
        let _ = local_stdout.flush().await;
    }

    // the remote process exited; the local stdin pump has nothing left to
    // feed and is aborted rather than left blocking on a read
    stdin_task.abort();

    stream.wait().await
}

fn terminal_size() -> Result<TerminalSize> {
    let (width, height) = crossterm::terminal::size()?;
    Ok(TerminalSize { width, height })
}

#[cfg(unix)]
fn spawn_resize_forwarder(mut size_tx: futures::channel::mpsc::Sender<TerminalSize>) {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut winch) = signal(SignalKind::window_change()) else {
        return;
    };
    tokio::spawn(async move {
        while winch.recv().await.is_some() {
            let Ok(size) = terminal_size() else { continue };
            if size_tx.send(size).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_resize_forwarder(_size_tx: tokio::sync::mpsc::Sender<TerminalSize>) {}

/// Puts the local terminal in raw mode for the guard's lifetime.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}
