// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Progress reporting for long-running operations
//!
//! Spinners for discovery phases and byte-level bars wrapped around the
//! transcode reader. Redraw rate is throttled: faster when stderr is an
//! interactive terminal, slower otherwise.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Redraw rate when stderr is a TTY.
const TTY_HZ: u8 = 12;

/// Redraw rate for non-interactive output (CI logs and friends).
const PLAIN_HZ: u8 = 2;

fn draw_target() -> ProgressDrawTarget {
    let hz = if std::io::stderr().is_terminal() {
        TTY_HZ
    } else {
        PLAIN_HZ
    };
    ProgressDrawTarget::stderr_with_hz(hz)
}

/// Create a spinner with consistent styling
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(None, draw_target());
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Byte counter for a transfer of unknown size. Hidden in quiet mode.
pub fn byte_progress(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::with_draw_target(None, draw_target());
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg} {bytes} ({bytes_per_sec}) {elapsed:.dim}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_progress_is_hidden() {
        let pb = byte_progress("dumping", true);
        assert!(pb.is_hidden());
    }

    #[test]
    fn test_byte_progress_counts() {
        let pb = byte_progress("dumping", true);
        pb.inc(1024);
        assert_eq!(pb.position(), 1024);
    }

    #[test]
    fn test_spinner_message() {
        let pb = create_spinner("Connecting to Kubernetes...");
        assert_eq!(pb.message(), "Connecting to Kubernetes...");
        pb.finish_and_clear();
    }
}
