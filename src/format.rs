// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Dump formats, filename generation, and format detection.

use chrono::{DateTime, Utc};
use clap::ValueEnum;

/// On-disk representation of a dump payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Uncompressed text (e.g. plain SQL).
    Plain,
    /// Gzip-compressed text.
    Gzip,
    /// Engine-native binary container (e.g. pg_dump custom format).
    /// Never wrapped in an additional gzip stage.
    Custom,
}

impl Format {
    /// Whether the wire stream for this format is gzip-compressed.
    /// Custom formats carry their own compression.
    pub fn is_wire_gzipped(self) -> bool {
        !matches!(self, Format::Custom)
    }
}

/// Pick the format whose extension matches `filename`, using the dialect's
/// declared extension map. Longest extension wins so `.sql.gz` is tried
/// before `.sql`.
pub fn detect_format(extensions: &[(Format, &str)], filename: &str) -> Option<Format> {
    let mut candidates: Vec<&(Format, &str)> = extensions.iter().collect();
    candidates.sort_by_key(|(_, ext)| std::cmp::Reverse(ext.len()));
    candidates
        .iter()
        .find(|(_, ext)| filename.ends_with(ext))
        .map(|(format, _)| *format)
}

/// Extension for a format, from the dialect's map.
pub fn extension_for(
    extensions: &'static [(Format, &'static str)],
    format: Format,
) -> Option<&'static str> {
    extensions
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, ext)| *ext)
}

/// Generated filenames follow `<namespace>_<YYYY-MM-DD_HHMMSS><ext>`.
pub fn generate_filename(namespace: &str, timestamp: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}_{}{}",
        namespace,
        timestamp.format("%Y-%m-%d_%H%M%S"),
        extension
    )
}
