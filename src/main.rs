// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod actions;
mod cli;
mod command;
pub mod config;
mod dialect;
mod errors;
mod format;
mod kubernetes;
mod session;
mod storage;
mod transfer;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing_subscriber::prelude::*;

use cli::Args;
use session::Session;

/// Initialize logging to stderr. Stdout is reserved for dump payloads and
/// lister output, so diagnostics must never land there.
fn init_logging(verbose: bool) {
    let filter = if verbose { "k8db=debug" } else { "k8db=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (aws-lc-rs)
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();
    init_logging(args.verbose);

    let session = Session::new();
    let result = run(args, &session).await;

    // teardown (job pods etc.) always runs, success or failure
    session.finalizers.run_all().await;

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// The whole invocation races the interrupt signal; a cancelled transfer
/// may leave a partially written file or object behind.
async fn run(args: Args, session: &Session) -> Result<()> {
    tokio::select! {
        result = cli::run(args, session) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    }
}
