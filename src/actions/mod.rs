// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Action orchestrators: dump, restore, exec, port-forward.
//!
//! Each action takes a fully resolved `Global` and drives remote commands
//! through the exec transport and the transcode pipeline. Capability checks
//! happen here, before any remote call.

pub mod dump;
pub mod exec;
pub mod port_forward;
pub mod restore;

use anyhow::Result;
use tokio::io::AsyncReadExt;

use crate::kubernetes::exec::ExecStream;

/// Collect a remote invocation's stderr concurrently with the payload
/// transfer, so a failure can be reported with the process's own words.
pub(crate) fn capture_stderr(
    stream: &mut ExecStream,
) -> tokio::task::JoinHandle<String> {
    let stderr = stream.stderr.take();
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Await the invocation's completion channel, contextualizing a failure
/// with captured stderr.
pub(crate) async fn finish_invocation(
    stream: ExecStream,
    stderr: tokio::task::JoinHandle<String>,
) -> Result<()> {
    let result = stream.wait().await;
    let stderr_text = stderr.await.unwrap_or_default();
    result.map_err(|e| {
        let trimmed = stderr_text.trim();
        if trimmed.is_empty() {
            e
        } else {
            e.context(format!("remote stderr: {trimmed}"))
        }
    })
}
