// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Streaming transcode pipeline.
//!
//! Dump and restore payloads flow between a remote process and local/cloud
//! storage through one blocking pump: async endpoints are bridged to
//! synchronous I/O (`SyncIoBridge`), optionally passed through gzip, and
//! copied with natural backpressure: the writer side blocks until the
//! reader drains, so no unbounded buffering of dump data occurs.

pub mod progress;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use indicatif::ProgressBar;
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::io::SyncIoBridge;

/// What the pump does to bytes in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transcode {
    /// Plain in, gzip out.
    Encode,
    /// Gzip in, plain out.
    Decode,
    /// Copy unchanged.
    Passthrough,
}

/// One endpoint of a transfer.
pub enum ByteSource {
    Sync(Box<dyn Read + Send>),
    Async(Box<dyn AsyncRead + Send + Unpin>),
}

pub enum ByteSink {
    Sync(Box<dyn Write + Send>),
    Async(Box<dyn AsyncWrite + Send + Unpin>),
}

impl ByteSource {
    pub fn sync(reader: impl Read + Send + 'static) -> Self {
        ByteSource::Sync(Box::new(reader))
    }

    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        ByteSource::Async(Box::new(reader))
    }
}

impl ByteSink {
    pub fn sync(writer: impl Write + Send + 'static) -> Self {
        ByteSink::Sync(Box::new(writer))
    }

    pub fn stream(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        ByteSink::Async(Box::new(writer))
    }
}

/// Synchronous transcode core. Returns the number of bytes read from
/// `reader`. Separated out so the gzip path is testable without a runtime.
pub fn transcode_copy<R: Read, W: Write>(
    reader: R,
    writer: W,
    mode: Transcode,
) -> io::Result<u64> {
    let mut reader = reader;
    let mut writer = writer;
    match mode {
        Transcode::Encode => {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            let copied = io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?.flush()?;
            Ok(copied)
        }
        Transcode::Decode => {
            let mut decoder = GzDecoder::new(reader);
            let copied = io::copy(&mut decoder, &mut writer)?;
            writer.flush()?;
            Ok(copied)
        }
        Transcode::Passthrough => {
            let copied = io::copy(&mut reader, &mut writer)?;
            writer.flush()?;
            Ok(copied)
        }
    }
}

/// Drive a transfer to completion on the blocking pool. The progress bar,
/// when given, observes the source side of the copy.
pub async fn pump(
    source: ByteSource,
    sink: ByteSink,
    mode: Transcode,
    progress: Option<ProgressBar>,
) -> Result<u64> {
    let copied = tokio::task::spawn_blocking(move || -> io::Result<u64> {
        let reader: Box<dyn Read + Send> = match source {
            ByteSource::Sync(reader) => reader,
            ByteSource::Async(reader) => Box::new(SyncIoBridge::new(reader)),
        };
        let reader: Box<dyn Read + Send> = match progress {
            Some(bar) => Box::new(bar.wrap_read(reader)),
            None => reader,
        };

        match sink {
            ByteSink::Sync(writer) => transcode_copy(reader, writer, mode),
            ByteSink::Async(writer) => {
                let mut bridge = SyncIoBridge::new(writer);
                let copied = transcode_copy(reader, &mut bridge, mode)?;
                // propagate EOF so the remote process sees stdin close
                bridge.shutdown()?;
                Ok(copied)
            }
        }
    })
    .await
    .context("transcode task panicked")??;

    Ok(copied)
}
