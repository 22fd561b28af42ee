// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Per-invocation registries.
//!
//! One `Session` is created in `main` and threaded down to the actions. It
//! carries the two pieces of state that outlive any single component: the
//! secret masks applied to logged command lines, and the finalizers that
//! must run after the action completes (success or failure), e.g. deleting
//! a disposable job pod.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

/// How long a single finalizer gets before it is abandoned.
const FINALIZER_TIMEOUT: Duration = Duration::from_secs(30);

type Finalizer = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Append-only set of secrets to hide from log output.
#[derive(Default)]
pub struct MaskSet {
    secrets: Mutex<Vec<String>>,
}

impl MaskSet {
    /// Register a secret. Empty strings are ignored (masking "" would
    /// mangle every message).
    pub fn add(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.is_empty() {
            return;
        }
        self.secrets.lock().unwrap().push(secret);
    }

    /// Replace every registered secret in `text` with `***`.
    pub fn apply(&self, text: &str) -> String {
        let secrets = self.secrets.lock().unwrap();
        let mut out = text.to_string();
        for secret in secrets.iter() {
            out = out.replace(secret.as_str(), "***");
        }
        out
    }
}

/// Teardown callbacks registered during an action and drained once at the
/// end, regardless of how the action exited.
#[derive(Default)]
pub struct Finalizers {
    pending: Mutex<Vec<(String, Finalizer)>>,
}

impl Finalizers {
    /// Register a teardown step. Finalizers run in registration order.
    pub fn defer<F>(&self, label: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending
            .lock()
            .unwrap()
            .push((label.into(), Box::pin(fut)));
    }

    /// Run every registered finalizer, each bounded by a timeout.
    pub async fn run_all(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        for (label, fut) in pending {
            if tokio::time::timeout(FINALIZER_TIMEOUT, fut).await.is_err() {
                warn!(finalizer = %label, "finalizer timed out");
            }
        }
    }
}

/// Everything scoped to one CLI invocation.
#[derive(Default)]
pub struct Session {
    pub masks: MaskSet,
    pub finalizers: Finalizers,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}
