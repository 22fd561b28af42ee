// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Disposable job pods.
//!
//! Some operations are better run from a sandbox pod than from the database
//! pod itself (the database image may lack client tools, or the operator may
//! want isolation). The job pod reuses the target pod's container image so
//! the client binaries match the server version, sleeps until exec'd into,
//! and is always torn down by a session finalizer.

use anyhow::{Context, Result, anyhow};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::session::Session;

/// How long to wait for the job's pod to reach Running.
const READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Poll interval while waiting for the pod.
const READY_POLL: Duration = Duration::from_secs(2);

/// Create a job pod and wait for it to be exec-ready. Returns the pod name.
/// Teardown is registered on the session's finalizers.
pub async fn create_job_pod(
    client: &Client,
    namespace: &str,
    image: &str,
    dialect_name: &str,
    session: &Session,
) -> Result<String> {
    let name = job_name(dialect_name);
    let jobs: Api<Job> = Api::namespaced(client.clone(), namespace);

    let job = build_job(&name, image);
    jobs.create(&PostParams::default(), &job)
        .await
        .with_context(|| format!("failed to create job \"{name}\""))?;
    info!(job = %name, image = %image, "created job pod");

    // Always tear the job down, even if waiting for readiness fails.
    {
        let client = client.clone();
        let namespace = namespace.to_string();
        let name = name.clone();
        session.finalizers.defer(format!("delete job {name}"), async move {
            let jobs: Api<Job> = Api::namespaced(client, &namespace);
            match jobs.delete(&name, &DeleteParams::background()).await {
                Ok(_) => debug!(job = %name, "deleted job"),
                Err(e) => warn!(job = %name, error = %e, "failed to delete job"),
            }
        });
    }

    wait_for_pod(client, namespace, &name).await
}

fn job_name(dialect_name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("k8db-{dialect_name}-{nanos:08x}")
}

fn build_job(name: &str, image: &str) -> Job {
    let labels: BTreeMap<String, String> = [
        ("app.kubernetes.io/name".to_string(), "k8db".to_string()),
        ("app.kubernetes.io/managed-by".to_string(), "k8db".to_string()),
    ]
    .into_iter()
    .collect();

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: "k8db".to_string(),
                        image: Some(image.to_string()),
                        command: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Wait for the job's pod to reach Running and return its name.
async fn wait_for_pod(client: &Client, namespace: &str, job: &str) -> Result<String> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default().labels(&format!("job-name={job}"));

    let deadline = tokio::time::Instant::now() + READY_TIMEOUT;
    loop {
        let list = pods.list(&params).await?;
        for pod in &list.items {
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .unwrap_or_default();
            if phase == "Running" {
                let name = pod
                    .metadata
                    .name
                    .clone()
                    .ok_or_else(|| anyhow!("job pod has no name"))?;
                debug!(pod = %name, "job pod is ready");
                return Ok(name);
            }
            if phase == "Failed" {
                return Err(anyhow!("job pod for \"{job}\" failed to start"));
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!(
                "timed out waiting for job \"{job}\" pod to become ready"
            ));
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

/// First container image of a pod, used to pick the job pod's image.
pub fn pod_image(pod: &Pod) -> Option<String> {
    pod.spec
        .as_ref()?
        .containers
        .first()?
        .image
        .clone()
}
