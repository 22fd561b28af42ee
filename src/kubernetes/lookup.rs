// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Connection-parameter lookup.
//!
//! Dialects describe *where* a value (port, database, username, password)
//! can live; the engine walks the strategies in order against the live pod
//! spec and the cluster's secrets. The first strategy that resolves wins.
//! If none do, the per-strategy failures are joined into one error so the
//! operator sees everything that was tried.

use anyhow::{Context, Result, anyhow};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::{Api, Client};
use tracing::debug;

use crate::errors::Error;

/// One way of extracting a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLookup {
    /// Container env vars, by name, including `valueFrom` and `envFrom`
    /// indirection through Secrets and ConfigMaps.
    Env(Vec<String>),
    /// A secret mounted as a volume, addressed by volume name or secret name.
    SecretVolume { volume: String, key: String },
    /// A secret addressed directly by name.
    NamedSecret { name: String, key: String },
    /// A literal fallback. Always succeeds; place it last.
    Default(String),
}

impl ConfigLookup {
    pub fn env<const N: usize>(names: [&str; N]) -> Self {
        ConfigLookup::Env(names.iter().map(|s| s.to_string()).collect())
    }

    pub fn secret_volume(volume: impl Into<String>, key: impl Into<String>) -> Self {
        ConfigLookup::SecretVolume {
            volume: volume.into(),
            key: key.into(),
        }
    }

    pub fn named_secret(name: impl Into<String>, key: impl Into<String>) -> Self {
        ConfigLookup::NamedSecret {
            name: name.into(),
            key: key.into(),
        }
    }

    pub fn default_value(value: impl Into<String>) -> Self {
        ConfigLookup::Default(value.into())
    }
}

/// Ordered list of strategies for one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLookups(pub Vec<ConfigLookup>);

impl ConfigLookups {
    pub fn new(lookups: impl IntoIterator<Item = ConfigLookup>) -> Self {
        Self(lookups.into_iter().collect())
    }

    /// Try each strategy in order; first success wins.
    pub async fn search<S: SecretSource>(
        &self,
        pod: &Pod,
        secrets: &S,
        what: &str,
    ) -> Result<String> {
        let mut causes = Vec::new();
        for lookup in &self.0 {
            match resolve(lookup, pod, secrets).await {
                Ok(value) => {
                    debug!(what, strategy = ?lookup, "resolved");
                    return Ok(value);
                }
                Err(e) => causes.push(format!("{e:#}")),
            }
        }
        Err(Error::LookupExhausted {
            what: what.to_string(),
            causes: causes.join("; "),
        }
        .into())
    }
}

/// Where secret and configmap values come from. The cluster-backed
/// implementation fetches them through the API; tests supply a map.
pub trait SecretSource {
    fn secret_value(
        &self,
        name: &str,
        key: &str,
    ) -> impl Future<Output = Result<String>> + Send;
    fn config_map_value(
        &self,
        name: &str,
        key: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Secrets and ConfigMaps fetched from the target namespace.
pub struct ClusterSecrets {
    client: Client,
    namespace: String,
}

impl ClusterSecrets {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

impl SecretSource for ClusterSecrets {
    async fn secret_value(&self, name: &str, key: &str) -> Result<String> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let secret = api
            .get(name)
            .await
            .with_context(|| format!("secret \"{name}\" not found"))?;
        let data = secret
            .data
            .ok_or_else(|| anyhow!("secret \"{name}\" has no data"))?;
        let bytes = data
            .get(key)
            .ok_or_else(|| anyhow!("secret \"{name}\" has no key \"{key}\""))?;
        String::from_utf8(bytes.0.clone())
            .with_context(|| format!("secret \"{name}\" key \"{key}\" is not UTF-8"))
    }

    async fn config_map_value(&self, name: &str, key: &str) -> Result<String> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let cm = api
            .get(name)
            .await
            .with_context(|| format!("configmap \"{name}\" not found"))?;
        cm.data
            .as_ref()
            .and_then(|data| data.get(key))
            .cloned()
            .ok_or_else(|| anyhow!("configmap \"{name}\" has no key \"{key}\""))
    }
}

async fn resolve<S: SecretSource>(
    lookup: &ConfigLookup,
    pod: &Pod,
    secrets: &S,
) -> Result<String> {
    match lookup {
        ConfigLookup::Env(names) => resolve_env(names, pod, secrets).await,
        ConfigLookup::SecretVolume { volume, key } => {
            let secret_name = find_volume_secret(pod, volume)
                .ok_or_else(|| anyhow!("no secret volume \"{volume}\" on pod"))?;
            secrets.secret_value(&secret_name, key).await
        }
        ConfigLookup::NamedSecret { name, key } => secrets.secret_value(name, key).await,
        ConfigLookup::Default(value) => Ok(value.clone()),
    }
}

/// Walk every container's env and envFrom declarations for the first of
/// `names` that resolves.
async fn resolve_env<S: SecretSource>(names: &[String], pod: &Pod, secrets: &S) -> Result<String> {
    let spec = pod.spec.as_ref().ok_or_else(|| anyhow!("pod has no spec"))?;

    for name in names {
        for container in &spec.containers {
            if let Some(env) = &container.env {
                for var in env {
                    if &var.name != name {
                        continue;
                    }
                    if let Some(value) = &var.value {
                        return Ok(value.clone());
                    }
                    if let Some(from) = &var.value_from {
                        if let Some(sel) = &from.secret_key_ref {
                            return secrets.secret_value(&sel.name, &sel.key).await;
                        }
                        if let Some(sel) = &from.config_map_key_ref {
                            return secrets.config_map_value(&sel.name, &sel.key).await;
                        }
                    }
                }
            }

            if let Some(env_from) = &container.env_from {
                for source in env_from {
                    let prefix = source.prefix.as_deref().unwrap_or("");
                    let Some(key) = name.strip_prefix(prefix) else {
                        continue;
                    };
                    if let Some(secret_ref) = &source.secret_ref {
                        if let Ok(value) = secrets.secret_value(&secret_ref.name, key).await {
                            return Ok(value);
                        }
                    }
                    if let Some(cm_ref) = &source.config_map_ref {
                        if let Ok(value) = secrets.config_map_value(&cm_ref.name, key).await {
                            return Ok(value);
                        }
                    }
                }
            }
        }
    }

    Err(anyhow!("no env var {:?} on pod", names))
}

/// Resolve a `SecretVolume` reference to the backing secret's name. Matches
/// the volume's own name first, then the secretName it mounts.
fn find_volume_secret(pod: &Pod, volume: &str) -> Option<String> {
    let volumes = pod.spec.as_ref()?.volumes.as_ref()?;
    volumes
        .iter()
        .filter_map(|v| {
            let secret_name = v.secret.as_ref()?.secret_name.as_ref()?;
            if v.name == volume || secret_name == volume {
                Some(secret_name.clone())
            } else {
                None
            }
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Container, EnvFromSource, EnvVar, EnvVarSource, PodSpec, SecretEnvSource,
        SecretKeySelector, SecretVolumeSource, Volume,
    };
    use std::collections::HashMap;

    /// In-memory secret source for lookup tests.
    struct MapSecrets {
        secrets: HashMap<(String, String), String>,
    }

    impl MapSecrets {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self {
                secrets: entries
                    .iter()
                    .map(|(n, k, v)| ((n.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            }
        }
    }

    impl SecretSource for MapSecrets {
        async fn secret_value(&self, name: &str, key: &str) -> Result<String> {
            self.secrets
                .get(&(name.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| anyhow!("secret \"{name}\" has no key \"{key}\""))
        }

        async fn config_map_value(&self, name: &str, key: &str) -> Result<String> {
            self.secret_value(name, key).await
        }
    }

    fn pod_with(spec: PodSpec) -> Pod {
        Pod {
            spec: Some(spec),
            ..Default::default()
        }
    }

    fn container(env: Vec<EnvVar>, env_from: Vec<EnvFromSource>) -> Container {
        Container {
            name: "db".to_string(),
            env: Some(env),
            env_from: Some(env_from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_env_direct_value() {
        let pod = pod_with(PodSpec {
            containers: vec![container(
                vec![EnvVar {
                    name: "POSTGRES_USER".to_string(),
                    value: Some("app".to_string()),
                    ..Default::default()
                }],
                vec![],
            )],
            ..Default::default()
        });
        let lookups = ConfigLookups::new([ConfigLookup::env(["POSTGRES_USER"])]);
        let value = lookups
            .search(&pod, &MapSecrets::new(&[]), "username")
            .await
            .unwrap();
        assert_eq!(value, "app");
    }

    #[tokio::test]
    async fn test_env_secret_key_ref() {
        let pod = pod_with(PodSpec {
            containers: vec![container(
                vec![EnvVar {
                    name: "POSTGRES_PASSWORD".to_string(),
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(SecretKeySelector {
                            name: "pg-creds".to_string(),
                            key: "password".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                vec![],
            )],
            ..Default::default()
        });
        let secrets = MapSecrets::new(&[("pg-creds", "password", "hunter2")]);
        let lookups = ConfigLookups::new([ConfigLookup::env(["POSTGRES_PASSWORD"])]);
        let value = lookups.search(&pod, &secrets, "password").await.unwrap();
        assert_eq!(value, "hunter2");
    }

    #[tokio::test]
    async fn test_env_from_with_prefix() {
        let pod = pod_with(PodSpec {
            containers: vec![container(
                vec![],
                vec![EnvFromSource {
                    prefix: Some("DB_".to_string()),
                    secret_ref: Some(SecretEnvSource {
                        name: "bundle".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
            )],
            ..Default::default()
        });
        let secrets = MapSecrets::new(&[("bundle", "PASSWORD", "s3cret")]);
        let lookups = ConfigLookups::new([ConfigLookup::env(["DB_PASSWORD"])]);
        let value = lookups.search(&pod, &secrets, "password").await.unwrap();
        assert_eq!(value, "s3cret");
    }

    #[tokio::test]
    async fn test_falls_through_to_secret_volume() {
        // Only credential source is a mounted secret volume: the env
        // strategy fails and the volume strategy must win.
        let pod = pod_with(PodSpec {
            containers: vec![container(vec![], vec![])],
            volumes: Some(vec![Volume {
                name: "credentials".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some("mariadb-secret".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        });
        let secrets = MapSecrets::new(&[("mariadb-secret", "mariadb-root-password", "toor")]);
        let lookups = ConfigLookups::new([
            ConfigLookup::env(["MARIADB_ROOT_PASSWORD"]),
            ConfigLookup::secret_volume("credentials", "mariadb-root-password"),
        ]);
        let value = lookups.search(&pod, &secrets, "password").await.unwrap();
        assert_eq!(value, "toor");
    }

    #[tokio::test]
    async fn test_volume_matched_by_secret_name() {
        let pod = pod_with(PodSpec {
            containers: vec![container(vec![], vec![])],
            volumes: Some(vec![Volume {
                name: "creds-vol".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some("db-secret".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        });
        let secrets = MapSecrets::new(&[("db-secret", "password", "pw")]);
        let lookups = ConfigLookups::new([ConfigLookup::secret_volume("db-secret", "password")]);
        let value = lookups.search(&pod, &secrets, "password").await.unwrap();
        assert_eq!(value, "pw");
    }

    #[tokio::test]
    async fn test_default_wins_last() {
        let pod = pod_with(PodSpec {
            containers: vec![container(vec![], vec![])],
            ..Default::default()
        });
        let lookups = ConfigLookups::new([
            ConfigLookup::env(["POSTGRES_PORT"]),
            ConfigLookup::default_value("5432"),
        ]);
        let value = lookups
            .search(&pod, &MapSecrets::new(&[]), "port")
            .await
            .unwrap();
        assert_eq!(value, "5432");
    }

    #[tokio::test]
    async fn test_all_strategies_exhausted() {
        let pod = pod_with(PodSpec {
            containers: vec![container(vec![], vec![])],
            ..Default::default()
        });
        let lookups = ConfigLookups::new([
            ConfigLookup::env(["MISSING"]),
            ConfigLookup::named_secret("absent", "key"),
        ]);
        let err = lookups
            .search(&pod, &MapSecrets::new(&[]), "password")
            .await
            .unwrap_err();
        let domain = err.downcast_ref::<Error>().unwrap();
        assert!(matches!(domain, Error::LookupExhausted { .. }));
        // both causes are surfaced
        let msg = format!("{domain}");
        assert!(msg.contains("MISSING"));
        assert!(msg.contains("absent"));
    }
}
