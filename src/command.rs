// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Shell-safe command assembly.
//!
//! Dialects build remote invocations from typed segments instead of string
//! concatenation; rendering applies POSIX single-quote escaping to every
//! `Literal` and `Env` value, so credentials and identifiers can never break
//! out of the command line. `Raw` and `Pipe` pass through verbatim and are
//! reserved for text the dialect controls (e.g. `$(which ...)` fallbacks).

use std::fmt;

/// One element of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A single argument, shell-quoted on render.
    Literal(String),
    /// A `KEY=value` environment prefix; the value is shell-quoted.
    Env(String, String),
    /// Emitted unmodified. The caller vouches for its contents.
    Raw(String),
    /// The literal `|` separator.
    Pipe,
}

/// Shorthand constructors, mirroring how dialects read.
pub fn lit(s: impl Into<String>) -> Segment {
    Segment::Literal(s.into())
}

pub fn env(key: impl Into<String>, value: impl Into<String>) -> Segment {
    Segment::Env(key.into(), value.into())
}

pub fn raw(s: impl Into<String>) -> Segment {
    Segment::Raw(s.into())
}

/// An ordered sequence of segments. Builders are plain values: rendering has
/// no side effects and the same builder can be rendered any number of times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBuilder {
    segments: Vec<Segment>,
}

impl CommandBuilder {
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    /// Append segments at the end.
    pub fn push(mut self, segments: impl IntoIterator<Item = Segment>) -> Self {
        self.segments.extend(segments);
        self
    }

    /// Prepend segments at the front, preserving their order.
    pub fn unshift(mut self, segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut front: Vec<Segment> = segments.into_iter().collect();
        front.append(&mut self.segments);
        self.segments = front;
        self
    }

    /// Pipe this command into the next: `self | gzip --force` and friends.
    pub fn pipe(self, segments: impl IntoIterator<Item = Segment>) -> Self {
        self.push([Segment::Pipe]).push(segments)
    }

    /// Serialize to the string handed to `sh -c` inside the pod.
    pub fn render(&self) -> String {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|seg| match seg {
                Segment::Literal(v) => quote(v),
                Segment::Env(k, v) => format!("{}={}", k, quote(v)),
                Segment::Raw(v) => v.clone(),
                Segment::Pipe => "|".to_string(),
            })
            .collect();
        parts.join(" ")
    }
}

impl fmt::Display for CommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// POSIX shell quoting. Safe strings pass through unchanged so rendered
/// commands stay readable; anything else is wrapped in single quotes with
/// embedded quotes rendered as `'\''`.
pub fn quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let safe = value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"_%+=:,./-".contains(&b));
    if safe {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_passthrough() {
        assert_eq!(quote("pg_dump"), "pg_dump");
        assert_eq!(quote("--host=127.0.0.1"), "--host=127.0.0.1");
        assert_eq!(quote("a,b.c/d-e_f"), "a,b.c/d-e_f");
    }

    #[test]
    fn test_quote_empty() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_spaces_and_specials() {
        assert_eq!(quote("hello world"), "'hello world'");
        assert_eq!(quote("a;b"), "'a;b'");
        assert_eq!(quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_quote_embedded_single_quote() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_render_env_and_pipe() {
        let cmd = CommandBuilder::new([
            env("PGPASSWORD", "s3cr3t pw"),
            lit("pg_dump"),
            lit("--host=127.0.0.1"),
        ])
        .pipe([lit("gzip"), lit("--force")]);
        assert_eq!(
            cmd.render(),
            "PGPASSWORD='s3cr3t pw' pg_dump --host=127.0.0.1 | gzip --force"
        );
    }

    #[test]
    fn test_raw_passthrough() {
        let cmd = CommandBuilder::new([raw("\"$(which mariadb || which mysql)\""), lit("--verbose")]);
        assert_eq!(cmd.render(), "\"$(which mariadb || which mysql)\" --verbose");
    }

    #[test]
    fn test_push_appends_unshift_prepends() {
        let base = CommandBuilder::new([lit("b")]);
        let cmd = base.push([lit("x")]).unshift([lit("y"), lit("z")]);
        assert_eq!(cmd.render(), "y z b x");
    }

    #[test]
    fn test_render_is_repeatable() {
        let cmd = CommandBuilder::new([lit("it's"), env("K", "v w")]);
        let first = cmd.render();
        let second = cmd.render();
        assert_eq!(first, second);
        // escaping happens at render time only; the stored literal is untouched
        assert_eq!(cmd, CommandBuilder::new([lit("it's"), env("K", "v w")]));
    }
}
