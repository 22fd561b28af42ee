// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Restore action.
//!
//! Up to three remote invocations run against the same pod, strictly in
//! order and never overlapping: an optional clean step (the dialect's drop
//! script streamed as plain text), the main payload, and an optional
//! analyze step. The sequencing is modeled as an explicit state machine;
//! `AwaitingDrain` consumes the main invocation's completion channel before
//! anything else may start, which is what binary-format clients require.

use anyhow::{Context, Result};
use kube::Client;
use std::io::IsTerminal;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

use super::{capture_stderr, finish_invocation};
use crate::config::Global;
use crate::dialect::RestoreOptions;
use crate::errors::Error;
use crate::format::{Format, detect_format};
use crate::kubernetes::exec::{ExecOptions, ExecStream, exec};
use crate::session::Session;
use crate::storage::{self, StorageClient};
use crate::transfer::progress::byte_progress;
use crate::transfer::{ByteSink, ByteSource, Transcode, pump};

pub struct RestoreArgs {
    pub filename: String,
    pub clean: bool,
    pub no_owner: bool,
    pub force: bool,
    pub no_analyze: bool,
}

/// Restore sequencing states. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Cleaning,
    Restoring,
    AwaitingDrain,
    Analyzing,
    Done,
}

pub async fn run(
    client: &Client,
    global: &Global,
    session: &Session,
    args: RestoreArgs,
) -> Result<()> {
    let restorer = global.dialect.as_restorer().ok_or(Error::CapabilityMissing {
        dialect: global.dialect.info().pretty_name(),
        operation: "restore",
    })?;

    let format = source_format(global, &args.filename)?;
    confirm(global, &args)?;

    let (wire_format, mode) = transfer_mode(format, global.remote_gzip);
    let opts = RestoreOptions {
        no_owner: args.no_owner,
    };

    let mut stage = Stage::Cleaning;
    // held between Restoring and AwaitingDrain
    let mut in_flight: Option<(ExecStream, tokio::task::JoinHandle<String>)> = None;

    while stage != Stage::Done {
        match stage {
            Stage::Cleaning => {
                if args.clean {
                    if let Some(dropper) = global.dialect.as_dropper() {
                        let database = global.database.clone().unwrap_or_default();
                        let script = dropper.drop_query(&database);
                        info!("cleaning target database");
                        run_script_step(client, global, session, &script).await?;
                    }
                }
                stage = Stage::Restoring;
            }
            Stage::Restoring => {
                let command = restorer.restore_command(global, wire_format, &opts).render();
                info!(
                    pod = global.exec_target(),
                    command = %session.masks.apply(&command),
                    "restoring"
                );

                let mut stream = exec(
                    client,
                    &global.namespace,
                    global.exec_target(),
                    &command,
                    ExecOptions::writing(),
                )
                .await?;
                let stderr = capture_stderr(&mut stream);
                let stdin = stream
                    .stdin
                    .take()
                    .context("exec returned no stdin stream")?;

                let source = open_source(&args.filename).await?;
                let progress = byte_progress("Restoring", global.quiet);
                pump(source, ByteSink::Async(stdin), mode, Some(progress.clone())).await?;
                progress.finish_and_clear();

                in_flight = Some((stream, stderr));
                stage = Stage::AwaitingDrain;
            }
            Stage::AwaitingDrain => {
                // The client process must exit cleanly before any further
                // invocation touches the pod; binary formats (pg_restore)
                // misbehave otherwise.
                let (stream, stderr) = in_flight.take().expect("no in-flight restore");
                finish_invocation(stream, stderr).await?;
                debug!("main payload drained");
                stage = Stage::Analyzing;
            }
            Stage::Analyzing => {
                if !args.no_analyze {
                    if let Some(query) = restorer.analyze_query() {
                        info!("analyzing restored database");
                        run_script_step(client, global, session, query).await?;
                    }
                }
                stage = Stage::Done;
            }
            Stage::Done => unreachable!(),
        }
    }

    info!("restore complete");
    Ok(())
}

/// Run a short SQL/script step through the dialect's client shell, streamed
/// on stdin as plain text. Fully awaited before returning, so steps can
/// never overlap.
async fn run_script_step(
    client: &Client,
    global: &Global,
    session: &Session,
    script: &str,
) -> Result<()> {
    let execer = global.dialect.as_execer().ok_or(Error::CapabilityMissing {
        dialect: global.dialect.info().pretty_name(),
        operation: "exec",
    })?;
    let command = execer.exec_command(global).render();
    debug!(command = %session.masks.apply(&command), "script step");

    let mut stream = exec(
        client,
        &global.namespace,
        global.exec_target(),
        &command,
        ExecOptions::writing(),
    )
    .await?;
    let stderr = capture_stderr(&mut stream);

    let mut stdin = stream
        .stdin
        .take()
        .context("exec returned no stdin stream")?;
    stdin.write_all(script.as_bytes()).await?;
    stdin.shutdown().await?;
    drop(stdin);

    finish_invocation(stream, stderr).await
}

/// Determine the payload format from the source name. Stdin carries plain
/// text; files and objects must have a recognized extension.
fn source_format(global: &Global, filename: &str) -> Result<Format> {
    if filename == "-" {
        return Ok(Format::Plain);
    }
    let extensions = global.dialect.info().format_extensions();
    let name = if storage::is_object_uri(filename) {
        storage::parse_uri(filename)?.key
    } else {
        filename.to_string()
    };
    detect_format(extensions, &name).ok_or_else(|| Error::UnknownFormat(filename.to_string()).into())
}

/// A restore overwrites data; make the operator say so. Non-interactive
/// runs must pass --force instead of hanging on a prompt.
fn confirm(global: &Global, args: &RestoreArgs) -> Result<()> {
    if args.force {
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        return Err(Error::ForceRequired.into());
    }
    let target = format!(
        "{}/{}",
        global.namespace,
        global.database.as_deref().unwrap_or("?")
    );
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(format!(
            "Restore \"{}\" into {}? This overwrites existing data",
            args.filename, target
        ))
        .default(false)
        .interact()
        .context("confirmation prompt failed")?;
    if confirmed {
        Ok(())
    } else {
        Err(Error::RestoreDeclined.into())
    }
}

/// The wire format sent to the pod and the local transcode producing it.
/// Text payloads travel gzipped when the remote end can decompress them;
/// native binary containers travel untouched.
fn transfer_mode(source: Format, remote_gzip: bool) -> (Format, Transcode) {
    match (source, remote_gzip) {
        (Format::Custom, _) => (Format::Custom, Transcode::Passthrough),
        (Format::Gzip, true) => (Format::Gzip, Transcode::Passthrough),
        (Format::Plain, true) => (Format::Gzip, Transcode::Encode),
        (Format::Gzip, false) => (Format::Plain, Transcode::Decode),
        (Format::Plain, false) => (Format::Plain, Transcode::Passthrough),
    }
}

async fn open_source(filename: &str) -> Result<ByteSource> {
    if filename == "-" {
        return Ok(ByteSource::stream(tokio::io::stdin()));
    }
    if storage::is_object_uri(filename) {
        let uri = storage::parse_uri(filename)?;
        let store = storage::client_for(&uri).await?;
        let reader: Box<dyn AsyncRead + Send + Unpin> =
            store.get_object(&uri.bucket, &uri.key).await?;
        return Ok(ByteSource::Async(reader));
    }
    let file = std::fs::File::open(filename)
        .with_context(|| format!("failed to open {filename}"))?;
    Ok(ByteSource::sync(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::test_support::test_global;
    use crate::dialect::{Dialect, Postgres};

    #[test]
    fn test_transfer_mode_roundtrips_with_remote_gzip() {
        assert_eq!(
            transfer_mode(Format::Plain, true),
            (Format::Gzip, Transcode::Encode)
        );
        assert_eq!(
            transfer_mode(Format::Gzip, true),
            (Format::Gzip, Transcode::Passthrough)
        );
        assert_eq!(
            transfer_mode(Format::Gzip, false),
            (Format::Plain, Transcode::Decode)
        );
        assert_eq!(
            transfer_mode(Format::Plain, false),
            (Format::Plain, Transcode::Passthrough)
        );
        assert_eq!(
            transfer_mode(Format::Custom, true),
            (Format::Custom, Transcode::Passthrough)
        );
    }

    #[test]
    fn test_source_format_detection() {
        let global = test_global(Dialect::Postgres(Postgres));
        assert_eq!(
            source_format(&global, "x.sql.gz").unwrap(),
            Format::Gzip
        );
        assert_eq!(source_format(&global, "x.dmp").unwrap(), Format::Custom);
        assert_eq!(source_format(&global, "-").unwrap(), Format::Plain);
        assert_eq!(
            source_format(&global, "s3://b/prod/x.sql").unwrap(),
            Format::Plain
        );
        assert!(source_format(&global, "x.txt").is_err());
    }

    #[test]
    fn test_confirm_force_short_circuits() {
        let global = test_global(Dialect::Postgres(Postgres));
        let args = RestoreArgs {
            filename: "x.sql".to_string(),
            clean: false,
            no_owner: false,
            force: true,
            no_analyze: false,
        };
        assert!(confirm(&global, &args).is_ok());
    }

    #[test]
    fn test_confirm_refuses_non_interactive() {
        // test harnesses run without a TTY on stdin, which is exactly the
        // non-interactive case the guard exists for
        if std::io::stdin().is_terminal() {
            return;
        }
        let global = test_global(Dialect::Postgres(Postgres));
        let args = RestoreArgs {
            filename: "x.sql".to_string(),
            clean: false,
            no_owner: false,
            force: false,
            no_analyze: false,
        };
        let err = confirm(&global, &args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ForceRequired)
        ));
    }
}
