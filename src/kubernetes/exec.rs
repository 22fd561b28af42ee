// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Remote exec transport.
//!
//! Runs a rendered command inside a pod via the Kubernetes exec subprotocol
//! (`sh -c <command>`), exposing the process's streams and a single-slot
//! completion channel. The completion channel is written exactly once per
//! invocation, success or failure, and must be consumed by the caller.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, TerminalSize};
use kube::Client;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;

use crate::errors::Error;

/// Which streams to wire up for an invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub tty: bool,
}

impl ExecOptions {
    /// Streaming payload into the pod (restore).
    pub fn writing() -> Self {
        Self {
            stdin: true,
            stdout: false,
            stderr: true,
            tty: false,
        }
    }

    /// Streaming payload out of the pod (dump).
    pub fn reading() -> Self {
        Self {
            stdin: false,
            stdout: true,
            stderr: true,
            tty: false,
        }
    }

    /// Interactive shell.
    pub fn interactive() -> Self {
        Self {
            stdin: true,
            stdout: true,
            stderr: false,
            tty: true,
        }
    }
}

/// An in-flight remote invocation.
pub struct ExecStream {
    pub stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub stdout: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
    /// Present only for TTY invocations; forward terminal resizes here.
    pub terminal_size: Option<futures::channel::mpsc::Sender<TerminalSize>>,
    completion: oneshot::Receiver<Result<()>>,
}

impl ExecStream {
    /// Await the invocation's terminal result. Must be called exactly once,
    /// after the caller is done with the streams.
    pub async fn wait(self) -> Result<()> {
        self.completion
            .await
            .context("exec status channel dropped")?
    }
}

/// Start `sh -c <command>` inside the pod.
pub async fn exec(
    client: &Client,
    namespace: &str,
    pod: &str,
    command: &str,
    opts: ExecOptions,
) -> Result<ExecStream> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);

    let attach_params = AttachParams {
        tty: opts.tty,
        stdin: opts.stdin,
        stdout: opts.stdout,
        // stderr is merged with stdout when tty is enabled
        stderr: opts.stderr && !opts.tty,
        max_stdin_buf_size: Some(4096),
        max_stdout_buf_size: Some(1024 * 1024),
        max_stderr_buf_size: Some(1024 * 1024),
        ..Default::default()
    };

    let mut attached = pods
        .exec(pod, ["sh", "-c", command], &attach_params)
        .await
        .with_context(|| format!("failed to exec in pod \"{pod}\""))?;

    let stdin = attached
        .stdin()
        .map(|s| Box::new(s) as Box<dyn AsyncWrite + Send + Unpin>);
    let stdout = attached
        .stdout()
        .map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>);
    let stderr = attached
        .stderr()
        .map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>);
    let terminal_size = attached.terminal_size();

    let status = attached.take_status();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let status = match status {
            Some(fut) => fut.await,
            None => None,
        };
        let joined = attached.join().await.map_err(anyhow::Error::new);
        let result = interpret_completion(status, joined);
        // the receiver may already be gone if the caller was cancelled
        let _ = tx.send(result);
    });

    Ok(ExecStream {
        stdin,
        stdout,
        stderr,
        terminal_size,
        completion: rx,
    })
}

/// Fold the exec status object and the websocket join result into one
/// terminal error (or success).
fn interpret_completion(status: Option<Status>, joined: Result<(), anyhow::Error>) -> Result<()> {
    if let Some(status) = status {
        if status.status.as_deref() != Some("Success") {
            let detail = status
                .message
                .or(status.reason)
                .unwrap_or_else(|| "unknown failure".to_string());
            return Err(Error::RemoteCommand(detail).into());
        }
    }
    joined.context("exec transport failed")?;
    Ok(())
}

/// Run a command and collect its stdout as UTF-8 text. Used for short
/// control queries (leader election, listers), not payload streaming.
pub async fn exec_capture(
    client: &Client,
    namespace: &str,
    pod: &str,
    command: &str,
) -> Result<String> {
    let mut stream = exec(client, namespace, pod, command, ExecOptions::reading()).await?;

    let mut output = Vec::new();
    if let Some(mut stdout) = stream.stdout.take() {
        stdout.read_to_end(&mut output).await?;
    }
    let mut errout = Vec::new();
    if let Some(mut stderr) = stream.stderr.take() {
        stderr.read_to_end(&mut errout).await?;
    }

    stream.wait().await.map_err(|e| {
        let stderr_text = String::from_utf8_lossy(&errout);
        if stderr_text.trim().is_empty() {
            e
        } else {
            e.context(format!("stderr: {}", stderr_text.trim()))
        }
    })?;

    Ok(String::from_utf8_lossy(&output).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_completion_success() {
        let status = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        assert!(interpret_completion(Some(status), Ok(())).is_ok());
        assert!(interpret_completion(None, Ok(())).is_ok());
    }

    #[test]
    fn test_interpret_completion_failure_prefers_message() {
        let status = Status {
            status: Some("Failure".to_string()),
            message: Some("command terminated with exit code 1".to_string()),
            ..Default::default()
        };
        let err = interpret_completion(Some(status), Ok(())).unwrap_err();
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_exec_options_tty_merges_stderr() {
        let opts = ExecOptions::interactive();
        assert!(opts.tty);
        assert!(!opts.stderr);
    }
}
