// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Domain error taxonomy.
//!
//! Orchestration code uses `anyhow::Result` for plumbing; these variants are
//! the conditions the CLI boundary matches on to decide exit behavior and
//! messaging. Transport errors from kube are propagated verbatim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No pod in the namespace matched any dialect's label filters.
    #[error("no database found in namespace \"{namespace}\"")]
    DatabaseNotFound { namespace: String },

    /// The dialect does not implement the requested operation.
    #[error("{dialect} does not support {operation}")]
    CapabilityMissing {
        dialect: &'static str,
        operation: &'static str,
    },

    /// Every lookup strategy for a config value failed.
    #[error("could not resolve {what}: {causes}")]
    LookupExhausted { what: String, causes: String },

    /// The user answered "no" to the restore confirmation prompt.
    #[error("restore declined")]
    RestoreDeclined,

    /// Restore would prompt, but stdin is not a terminal and --force was not given.
    #[error("refusing to restore non-interactively without --force")]
    ForceRequired,

    #[error("unknown dialect \"{0}\"")]
    UnknownDialect(String),

    #[error("could not detect dump format from filename \"{0}\"")]
    UnknownFormat(String),

    #[error("remote command failed: {0}")]
    RemoteCommand(String),

    #[error("unsupported storage scheme \"{0}\"")]
    UnsupportedScheme(String),
}
