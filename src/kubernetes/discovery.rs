// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Database pod discovery.
//!
//! Stage one shortlists pods by label signature: every pod in the namespace
//! is tested against each dialect's filter tree, in dialect priority order,
//! and the first dialect with any match wins. Stage two narrows a
//! multi-pod match to the primary using the dialect's leader hint; that
//! refinement is best effort and falls back to the full matched set.

use anyhow::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use tracing::{debug, info, warn};

use super::exec::exec_capture;
use crate::dialect::{Dialect, LeaderHint};
use crate::errors::Error;
use crate::kubernetes::filter::pod_label;

/// Outcome of discovery: the dialect that claimed the namespace and the
/// pods that matched it (post leader-refinement).
#[derive(Debug, Clone)]
pub struct DatabaseMatch {
    pub dialect: Dialect,
    pub pods: Vec<Pod>,
}

impl DatabaseMatch {
    /// The elected target pod.
    pub fn primary(&self) -> &Pod {
        &self.pods[0]
    }
}

/// Find the database in `namespace`. With `dialect_override` only that
/// dialect's filters are consulted.
pub async fn find_database(
    client: &Client,
    namespace: &str,
    dialect_override: Option<Dialect>,
) -> Result<DatabaseMatch> {
    let pods = super::client::list_pods(client, namespace).await?;

    let dialects = match dialect_override {
        Some(dialect) => vec![dialect],
        None => Dialect::all(),
    };

    for dialect in dialects {
        let filters = dialect.info().pod_filters();
        let matched: Vec<Pod> = pods
            .iter()
            .filter(|pod| filters.matches_pod(pod))
            .cloned()
            .collect();
        if matched.is_empty() {
            continue;
        }

        info!(
            dialect = dialect.info().name(),
            pods = matched.len(),
            "matched database pods"
        );

        let refined = refine_leader(client, namespace, dialect, matched).await;
        return Ok(DatabaseMatch {
            dialect,
            pods: refined,
        });
    }

    Err(Error::DatabaseNotFound {
        namespace: namespace.to_string(),
    }
    .into())
}

/// Narrow a multi-pod match to the primary. Falls back to the original set
/// when the topology gives no answer.
async fn refine_leader(
    client: &Client,
    namespace: &str,
    dialect: Dialect,
    pods: Vec<Pod>,
) -> Vec<Pod> {
    if pods.len() < 2 {
        return pods;
    }

    let Some(hint) = dialect.info().leader_hint(&pods) else {
        return pods;
    };

    match hint {
        LeaderHint::Label { name, value } => {
            let primary: Vec<Pod> = pods
                .iter()
                .filter(|pod| pod_label(pod, name) == Some(value))
                .cloned()
                .collect();
            if primary.is_empty() {
                warn!(label = name, "no pod carries the primary label; using all matches");
                pods
            } else {
                primary
            }
        }
        LeaderHint::RepmgrCsv => match repmgr_primary(client, namespace, &pods).await {
            Ok(Some(name)) => {
                let primary: Vec<Pod> = pods
                    .iter()
                    .filter(|pod| pod.metadata.name.as_deref() == Some(name.as_str()))
                    .cloned()
                    .collect();
                if primary.is_empty() {
                    warn!(primary = %name, "repmgr primary is not among matched pods");
                    pods
                } else {
                    primary
                }
            }
            Ok(None) => {
                warn!("repmgr reported no primary; using all matches");
                pods
            }
            Err(e) => {
                warn!(error = %e, "repmgr status query failed; using all matches");
                pods
            }
        },
    }
}

/// Ask repmgr inside any matched pod which node is the primary.
async fn repmgr_primary(
    client: &Client,
    namespace: &str,
    pods: &[Pod],
) -> Result<Option<String>> {
    let pod_name = pods[0]
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("matched pod has no name"))?;

    let csv = exec_capture(client, namespace, pod_name, "repmgr service status --csv").await?;
    debug!(pod = %pod_name, "repmgr service status");
    Ok(parse_repmgr_primary(&csv))
}

/// Parse `repmgr service status --csv` output. Rows are
/// `id,name,status,...`; the primary is the row whose status is "primary".
fn parse_repmgr_primary(csv: &str) -> Option<String> {
    for line in csv.lines() {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();
        if fields.len() < 3 {
            continue;
        }
        if fields[2].eq_ignore_ascii_case("primary") {
            return Some(fields[1].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectInfo, Postgres};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_repmgr_primary() {
        let csv = "1,pg-ha-postgresql-0,primary,running\n2,pg-ha-postgresql-1,standby,running\n";
        assert_eq!(
            parse_repmgr_primary(csv),
            Some("pg-ha-postgresql-0".to_string())
        );
    }

    #[test]
    fn test_parse_repmgr_primary_quoted_and_mixed_case() {
        let csv = "1,\"node-a\",standby\n2,\"node-b\",PRIMARY\n";
        assert_eq!(parse_repmgr_primary(csv), Some("node-b".to_string()));
    }

    #[test]
    fn test_parse_repmgr_no_primary() {
        assert_eq!(parse_repmgr_primary("1,node-a,standby\n"), None);
        assert_eq!(parse_repmgr_primary(""), None);
        assert_eq!(parse_repmgr_primary("garbage\n"), None);
    }

    #[test]
    fn test_dialect_filters_shortlist() {
        let pods = [
            pod("web-0", &[("app", "nginx")]),
            pod("db-0", &[("app.kubernetes.io/name", "postgresql")]),
        ];
        let filters = Postgres.pod_filters();
        let matched: Vec<&Pod> = pods.iter().filter(|p| filters.matches_pod(p)).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].metadata.name.as_deref(), Some("db-0"));
    }

    #[test]
    fn test_cnpg_label_refinement_shape() {
        // leader-hint selection is pure; the label filter applied by
        // refine_leader reduces to this predicate
        let pods = [
            pod(
                "cluster-1",
                &[("cnpg.io/cluster", "mydb"), ("cnpg.io/instanceRole", "replica")],
            ),
            pod(
                "cluster-2",
                &[("cnpg.io/cluster", "mydb"), ("cnpg.io/instanceRole", "primary")],
            ),
        ];
        let hint = Postgres.leader_hint(&pods).unwrap();
        let LeaderHint::Label { name, value } = hint else {
            panic!("expected label hint");
        };
        let primary: Vec<&Pod> = pods
            .iter()
            .filter(|p| pod_label(p, name) == Some(value))
            .collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].metadata.name.as_deref(), Some("cluster-2"));
    }

    #[test]
    fn test_pod_fixture_helper() {
        let p = pod("db-0", &[("spilo-role", "master")]);
        assert_eq!(pod_label(&p, "spilo-role"), Some("master"));
    }
}
