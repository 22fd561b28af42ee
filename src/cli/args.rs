// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::{Parser, Subcommand};

use crate::format::Format;

#[derive(Parser, Debug)]
#[command(name = "k8db")]
#[command(author, version, about = "Dump, restore, and inspect databases running in Kubernetes")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Kubernetes context to use (defaults to the kubeconfig current context)
    #[arg(short, long, global = true)]
    pub context: Option<String>,

    /// Namespace to search for the database (defaults to the context namespace)
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Database engine; detected from pod labels when omitted
    #[arg(short, long, global = true)]
    pub dialect: Option<String>,

    /// Target pod name, skipping label-based discovery
    #[arg(long, global = true)]
    pub pod: Option<String>,

    /// Database name override
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Username override
    #[arg(short = 'U', long, global = true)]
    pub username: Option<String>,

    /// Password override (otherwise resolved from the pod's env and secrets)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Port override
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Run client tools in a disposable job pod instead of the database pod
    #[arg(long, global = true)]
    pub job: bool,

    /// Run the gzip stage locally instead of inside the cluster
    #[arg(long, global = true)]
    pub local_gzip: bool,

    /// Suppress progress output and remote verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump a database to a file, stdout ("-"), or object storage (s3://...)
    Dump {
        /// Output path; generated as <namespace>_<timestamp><ext> if omitted
        filename: Option<String>,

        /// Dump format; detected from the filename extension if omitted
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Include clean (drop) statements in the dump
        #[arg(long)]
        clean: bool,

        /// Skip restoration of object ownership
        #[arg(long)]
        no_owner: bool,

        /// Use IF EXISTS when dropping objects
        #[arg(long)]
        if_exists: bool,

        /// Dump only matching tables (repeatable)
        #[arg(short = 't', long = "table")]
        tables: Vec<String>,

        /// Exclude matching tables (repeatable)
        #[arg(short = 'T', long = "exclude-table")]
        exclude_table: Vec<String>,

        /// Dump structure but not data for matching tables (repeatable)
        #[arg(long = "exclude-table-data")]
        exclude_table_data: Vec<String>,
    },

    /// Restore a dump from a file, stdin ("-"), or object storage
    Restore {
        filename: String,

        /// Drop and recreate the target schema/database first
        #[arg(long)]
        clean: bool,

        /// Skip restoration of object ownership
        #[arg(long)]
        no_owner: bool,

        /// Skip the confirmation prompt (required when not a terminal)
        #[arg(short, long)]
        force: bool,

        /// Skip the post-restore analyze step
        #[arg(long)]
        no_analyze: bool,
    },

    /// Open the database's interactive client shell, or run a one-shot command
    Exec {
        /// Command to run instead of the interactive shell
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Forward a local port to the database pod
    PortForward {
        /// Local port (defaults to the database port)
        #[arg(short, long)]
        local_port: Option<u16>,

        /// Local address to bind
        #[arg(long, default_value = "127.0.0.1")]
        address: String,
    },

    /// List databases on the server
    Databases,

    /// List tables in the target database
    Tables,

    /// Show the resolved target (pod, dialect, connection parameters)
    Status,
}
