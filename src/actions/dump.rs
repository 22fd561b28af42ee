// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Dump action.
//!
//! Runs the dialect's dump command inside the target pod and streams its
//! stdout into a local file, stdout, or an object store, transcoding gzip
//! on the way so the on-disk format matches the requested one regardless
//! of where the compression stage ran.

use anyhow::{Context, Result};
use chrono::Utc;
use kube::Client;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::{capture_stderr, finish_invocation};
use crate::config::Global;
use crate::dialect::DumpOptions;
use crate::errors::Error;
use crate::format::{Format, detect_format, extension_for, generate_filename};
use crate::kubernetes::exec::{ExecOptions, exec};
use crate::session::Session;
use crate::storage::{self, ObjectUri, StorageClient};
use crate::transfer::progress::byte_progress;
use crate::transfer::{ByteSink, ByteSource, Transcode, pump};

/// Where the dump lands.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Stdout,
    File(PathBuf),
    Object(ObjectUri),
}

pub struct DumpArgs {
    pub filename: Option<String>,
    pub format: Option<Format>,
    pub clean: bool,
    pub no_owner: bool,
    pub if_exists: bool,
    pub tables: Vec<String>,
    pub exclude_table: Vec<String>,
    pub exclude_table_data: Vec<String>,
}

pub async fn run(
    client: &Client,
    global: &Global,
    session: &Session,
    args: DumpArgs,
) -> Result<()> {
    let dumper = global.dialect.as_dumper().ok_or(Error::CapabilityMissing {
        dialect: global.dialect.info().pretty_name(),
        operation: "dump",
    })?;

    let extensions = global.dialect.info().format_extensions();
    let (target, format) = resolve_target(
        &args,
        extensions,
        global.dialect.info().default_format(),
        &global.namespace,
    )?;
    debug!(?target, ?format, "resolved dump target");

    let opts = DumpOptions {
        format,
        clean: args.clean,
        no_owner: args.no_owner,
        if_exists: args.if_exists,
        tables: args.tables,
        exclude_table: args.exclude_table,
        exclude_table_data: args.exclude_table_data,
    };
    let command = dumper.dump_command(global, &opts).render();
    info!(
        pod = global.exec_target(),
        command = %session.masks.apply(&command),
        "dumping"
    );

    let mut stream = exec(
        client,
        &global.namespace,
        global.exec_target(),
        &command,
        ExecOptions::reading(),
    )
    .await?;
    let stderr = capture_stderr(&mut stream);
    let stdout = stream
        .stdout
        .take()
        .context("exec returned no stdout stream")?;

    let mode = transfer_mode(format, global.remote_gzip);
    let progress = byte_progress("Dumping", global.quiet || target == Target::Stdout);

    let copied = match &target {
        Target::Stdout => {
            pump(
                ByteSource::Async(stdout),
                ByteSink::sync(std::io::stdout()),
                mode,
                Some(progress.clone()),
            )
            .await?
        }
        Target::File(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            pump(
                ByteSource::Async(stdout),
                ByteSink::sync(file),
                mode,
                Some(progress.clone()),
            )
            .await?
        }
        Target::Object(uri) => {
            // buffered: the store wants the finished payload
            let buffer = Arc::new(Mutex::new(Vec::new()));
            pump(
                ByteSource::Async(stdout),
                ByteSink::sync(SharedBuffer(Arc::clone(&buffer))),
                mode,
                Some(progress.clone()),
            )
            .await?;
            let data = std::mem::take(&mut *buffer.lock().unwrap());
            let store = storage::client_for(uri).await?;
            store.put_object(&uri.bucket, &uri.key, data).await?;
            0
        }
    };

    finish_invocation(stream, stderr).await?;
    progress.finish_and_clear();

    match &target {
        Target::Stdout => info!("dump complete"),
        Target::File(path) => info!(file = %path.display(), bytes = copied, "dump complete"),
        Target::Object(uri) => {
            info!(object = format!("s3://{}/{}", uri.bucket, uri.key), "dump complete");
        }
    }
    Ok(())
}

/// Pick the destination and the on-disk format, generating a filename from
/// the namespace and timestamp when none was given.
fn resolve_target(
    args: &DumpArgs,
    extensions: &'static [(Format, &'static str)],
    default_format: Format,
    namespace: &str,
) -> Result<(Target, Format)> {
    match args.filename.as_deref() {
        Some("-") => Ok((Target::Stdout, args.format.unwrap_or(default_format))),
        Some(name) if storage::is_object_uri(name) => {
            let uri = storage::parse_uri(name)?;
            let format = match args.format {
                Some(format) => format,
                None => detect_format(extensions, &uri.key)
                    .ok_or_else(|| Error::UnknownFormat(name.to_string()))?,
            };
            Ok((Target::Object(uri), format))
        }
        Some(name) => {
            let format = match args.format {
                Some(format) => format,
                None => detect_format(extensions, name)
                    .ok_or_else(|| Error::UnknownFormat(name.to_string()))?,
            };
            Ok((Target::File(PathBuf::from(name)), format))
        }
        None => {
            let format = args.format.unwrap_or(default_format);
            let extension = extension_for(extensions, format)
                .ok_or_else(|| Error::UnknownFormat(format!("{format:?}")))?;
            let name = generate_filename(namespace, Utc::now(), extension);
            Ok((Target::File(PathBuf::from(name)), format))
        }
    }
}

/// What the local end must do to the wire stream so the output matches the
/// requested format. The wire carries gzip unless the format is a native
/// binary container or the gzip stage runs locally.
fn transfer_mode(format: Format, remote_gzip: bool) -> Transcode {
    match (format, remote_gzip) {
        (Format::Custom, _) => Transcode::Passthrough,
        (Format::Gzip, true) => Transcode::Passthrough,
        (Format::Gzip, false) => Transcode::Encode,
        (Format::Plain, true) => Transcode::Decode,
        (Format::Plain, false) => Transcode::Passthrough,
    }
}

/// `Write` into a shared buffer, so the pump (which consumes its sink) can
/// hand the payload back for an object upload.
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG_EXTENSIONS: &[(Format, &str)] = &[
        (Format::Plain, ".sql"),
        (Format::Gzip, ".sql.gz"),
        (Format::Custom, ".dmp"),
    ];

    fn args(filename: Option<&str>, format: Option<Format>) -> DumpArgs {
        DumpArgs {
            filename: filename.map(String::from),
            format,
            clean: false,
            no_owner: false,
            if_exists: false,
            tables: vec![],
            exclude_table: vec![],
            exclude_table_data: vec![],
        }
    }

    #[test]
    fn test_resolve_target_generates_filename() {
        let (target, format) =
            resolve_target(&args(None, None), PG_EXTENSIONS, Format::Gzip, "prod").unwrap();
        assert_eq!(format, Format::Gzip);
        let Target::File(path) = target else {
            panic!("expected file target");
        };
        let name = path.to_string_lossy();
        assert!(name.starts_with("prod_"));
        assert!(name.ends_with(".sql.gz"));
    }

    #[test]
    fn test_resolve_target_detects_format_from_name() {
        let (_, format) = resolve_target(
            &args(Some("backup.dmp"), None),
            PG_EXTENSIONS,
            Format::Gzip,
            "prod",
        )
        .unwrap();
        assert_eq!(format, Format::Custom);
    }

    #[test]
    fn test_resolve_target_unknown_extension_is_error() {
        let err = resolve_target(
            &args(Some("backup.txt"), None),
            PG_EXTENSIONS,
            Format::Gzip,
            "prod",
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_resolve_target_object_uri() {
        let (target, format) = resolve_target(
            &args(Some("s3://backups/prod/db.sql.gz"), None),
            PG_EXTENSIONS,
            Format::Gzip,
            "prod",
        )
        .unwrap();
        assert_eq!(format, Format::Gzip);
        assert!(matches!(target, Target::Object(_)));
    }

    #[test]
    fn test_transfer_mode_never_double_compresses() {
        // remote gzip on: wire already compressed
        assert_eq!(transfer_mode(Format::Gzip, true), Transcode::Passthrough);
        // remote gzip off: the only gzip stage is local
        assert_eq!(transfer_mode(Format::Gzip, false), Transcode::Encode);
        // plain output must strip the wire's compression
        assert_eq!(transfer_mode(Format::Plain, true), Transcode::Decode);
        assert_eq!(transfer_mode(Format::Plain, false), Transcode::Passthrough);
        // custom is a native container either way
        assert_eq!(transfer_mode(Format::Custom, true), Transcode::Passthrough);
        assert_eq!(transfer_mode(Format::Custom, false), Transcode::Passthrough);
    }
}
