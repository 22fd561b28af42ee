// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Kubernetes client construction and namespace listing.

use anyhow::{Context, Result, anyhow};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for connecting to K8s API
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reading K8s API responses
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Create a client for the given kubeconfig context (or the current one).
/// Returns the client together with the namespace the action should target:
/// the explicit override if given, else the context's default namespace.
pub async fn create_client(
    context: Option<&str>,
    namespace: Option<&str>,
) -> Result<(Client, String)> {
    let kubeconfig = Kubeconfig::read()?;

    let context_name = context
        .map(String::from)
        .or_else(|| kubeconfig.current_context.clone())
        .ok_or_else(|| anyhow!("No context specified and no current context in kubeconfig"))?;

    let kube_context = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .ok_or_else(|| anyhow!("Context '{}' not found in kubeconfig", context_name))?;

    let resolved_namespace = namespace
        .map(String::from)
        .or_else(|| {
            kube_context
                .context
                .as_ref()
                .and_then(|c| c.namespace.clone())
        })
        .unwrap_or_else(|| "default".to_string());

    let mut config = Config::from_custom_kubeconfig(
        kubeconfig,
        &KubeConfigOptions {
            context: Some(context_name.clone()),
            ..Default::default()
        },
    )
    .await
    .with_context(|| format!("Failed to load kubeconfig for context '{}'", context_name))?;

    // Set timeouts for reliability
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);

    let client = Client::try_from(config)
        .with_context(|| format!("Failed to create client for context '{}'", context_name))?;

    debug!(context = %context_name, namespace = %resolved_namespace, "created client");

    Ok((client, resolved_namespace))
}

/// List all pods in a namespace, retrying transient API failures with
/// exponential backoff.
pub async fn list_pods(client: &Client, namespace: &str) -> Result<Vec<Pod>> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default();

    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        match api.list(&params).await {
            Ok(list) => return Ok(list.items),
            Err(e) => {
                if is_retryable_error(&e) {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    warn!(
                        namespace = %namespace,
                        attempt = attempt + 1,
                        max_attempts = MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retryable error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                } else {
                    return Err(anyhow!("K8s API error: {}", e));
                }
            }
        }
    }

    Err(anyhow!(
        "Failed after {} retries: {}",
        MAX_RETRIES,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// Check if an error is retryable (transient failures)
fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        // Network/connection errors are retryable
        kube::Error::HyperError(_) => true,
        // API errors: retry on 429 (rate limit), 503 (unavailable), 504 (timeout)
        kube::Error::Api(api_err) => {
            matches!(api_err.code, 429 | 503 | 504)
        }
        _ => false,
    }
}
