// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Database dialects and their capability model.
//!
//! A dialect describes one engine: its identity, the label signatures of the
//! chart/operator topologies that deploy it, and how to build client-binary
//! invocations for it. Capabilities are optional facets expressed as small
//! traits; callers ask `dialect.as_dumper()` and friends instead of assuming
//! every engine can do everything. The `Dialect` enum is the closed registry,
//! walked in priority order during pod discovery.

mod mariadb;
mod meilisearch;
mod mongodb;
mod postgres;
mod redis;

pub use mariadb::MariaDb;
pub use meilisearch::Meilisearch;
pub use mongodb::MongoDb;
pub use postgres::Postgres;
pub use redis::Redis;

use k8s_openapi::api::core::v1::Pod;

use crate::command::CommandBuilder;
use crate::config::Global;
use crate::errors::Error;
use crate::format::Format;
use crate::kubernetes::filter::LabelFilter;
use crate::kubernetes::lookup::ConfigLookups;

/// Identity and discovery contract every dialect implements.
pub trait DialectInfo {
    fn name(&self) -> &'static str;
    fn pretty_name(&self) -> &'static str;

    /// Alternative names accepted by --dialect.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Tie-break when several dialects match the same pods; higher wins.
    fn priority(&self) -> u8 {
        50
    }

    /// Label signature used to shortlist candidate pods.
    fn pod_filters(&self) -> LabelFilter;

    /// Whether a disposable job pod may host the client binaries. Engines
    /// whose dump/restore must run against the live instance return false.
    fn create_job(&self) -> bool {
        true
    }

    fn format_extensions(&self) -> &'static [(Format, &'static str)] {
        &[]
    }

    fn default_format(&self) -> Format {
        Format::Gzip
    }

    /// How to pick the primary among multiple matched pods, judged from the
    /// matched set's labels. None means any matched pod will do.
    fn leader_hint(&self, _pods: &[Pod]) -> Option<LeaderHint> {
        None
    }
}

/// Dialect-specific leader/primary discovery, applied only when more than
/// one pod matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderHint {
    /// Keep pods carrying this label value.
    Label {
        name: &'static str,
        value: &'static str,
    },
    /// Exec `repmgr service status --csv` in a matched pod and keep the pod
    /// named in the row whose status is "primary".
    RepmgrCsv,
}

/// Options shaping a dump invocation.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub format: Format,
    pub clean: bool,
    pub no_owner: bool,
    pub if_exists: bool,
    pub tables: Vec<String>,
    pub exclude_table: Vec<String>,
    pub exclude_table_data: Vec<String>,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            format: Format::Gzip,
            clean: false,
            no_owner: false,
            if_exists: false,
            tables: Vec::new(),
            exclude_table: Vec::new(),
            exclude_table_data: Vec::new(),
        }
    }
}

/// Options shaping a restore invocation.
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub no_owner: bool,
}

pub trait Dumper {
    fn dump_command(&self, global: &Global, opts: &DumpOptions) -> CommandBuilder;
}

pub trait Restorer {
    /// Command the payload is streamed into. `format` is the wire format
    /// arriving on stdin (gzip already stripped locally when remote gzip is
    /// disabled).
    fn restore_command(
        &self,
        global: &Global,
        format: Format,
        opts: &RestoreOptions,
    ) -> CommandBuilder;

    /// Statement run after a successful restore, if the engine benefits.
    fn analyze_query(&self) -> Option<&'static str> {
        None
    }
}

pub trait Execer {
    /// Interactive client shell.
    fn exec_command(&self, global: &Global) -> CommandBuilder;
}

pub trait HasPort {
    fn default_port(&self) -> u16;
    fn port_lookups(&self) -> ConfigLookups;
}

pub trait HasUser {
    fn default_user(&self) -> &'static str;
    fn user_lookups(&self) -> ConfigLookups;
}

pub trait HasPassword {
    /// Lookup set for the password. Depends on the already-resolved
    /// username (superuser secrets differ from application-user secrets)
    /// and on the elected pod (operator topologies use named secrets).
    fn password_lookups(&self, username: &str, pod: &Pod) -> ConfigLookups;
}

pub trait HasDatabase {
    fn database_lookups(&self) -> ConfigLookups;
}

pub trait DatabaseLister {
    fn database_list_command(&self, global: &Global) -> CommandBuilder;
}

pub trait TableLister {
    fn table_list_command(&self, global: &Global) -> CommandBuilder;
}

pub trait DatabaseDropper {
    /// Script streamed as the restore clean step.
    fn drop_query(&self, database: &str) -> String;
}

/// The closed set of supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres(Postgres),
    MariaDb(MariaDb),
    MongoDb(MongoDb),
    Meilisearch(Meilisearch),
    Redis(Redis),
}

impl Dialect {
    /// All dialects, highest detection priority first.
    pub fn all() -> Vec<Dialect> {
        let mut dialects = vec![
            Dialect::Postgres(Postgres),
            Dialect::MariaDb(MariaDb),
            Dialect::MongoDb(MongoDb),
            Dialect::Meilisearch(Meilisearch),
            Dialect::Redis(Redis),
        ];
        dialects.sort_by_key(|d| std::cmp::Reverse(d.info().priority()));
        dialects
    }

    /// Resolve a --dialect argument by name or alias.
    pub fn from_name(name: &str) -> Result<Dialect, Error> {
        let needle = name.to_lowercase();
        Self::all()
            .into_iter()
            .find(|d| {
                d.info().name() == needle || d.info().aliases().contains(&needle.as_str())
            })
            .ok_or(Error::UnknownDialect(name.to_string()))
    }

    pub fn info(&self) -> &dyn DialectInfo {
        match self {
            Dialect::Postgres(d) => d,
            Dialect::MariaDb(d) => d,
            Dialect::MongoDb(d) => d,
            Dialect::Meilisearch(d) => d,
            Dialect::Redis(d) => d,
        }
    }

    pub fn as_dumper(&self) -> Option<&dyn Dumper> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(_) | Dialect::Redis(_) => None,
        }
    }

    pub fn as_restorer(&self) -> Option<&dyn Restorer> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(_) | Dialect::Redis(_) => None,
        }
    }

    pub fn as_execer(&self) -> Option<&dyn Execer> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(d) => Some(d),
            Dialect::Redis(d) => Some(d),
        }
    }

    pub fn as_port(&self) -> Option<&dyn HasPort> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(d) => Some(d),
            Dialect::Redis(d) => Some(d),
        }
    }

    pub fn as_user(&self) -> Option<&dyn HasUser> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(_) | Dialect::Redis(_) => None,
        }
    }

    pub fn as_password(&self) -> Option<&dyn HasPassword> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(d) => Some(d),
            Dialect::Redis(d) => Some(d),
        }
    }

    pub fn as_database(&self) -> Option<&dyn HasDatabase> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(_) | Dialect::Redis(_) => None,
        }
    }

    pub fn as_database_lister(&self) -> Option<&dyn DatabaseLister> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(_) | Dialect::Redis(_) => None,
        }
    }

    pub fn as_table_lister(&self) -> Option<&dyn TableLister> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(_) | Dialect::Meilisearch(_) | Dialect::Redis(_) => None,
        }
    }

    pub fn as_dropper(&self) -> Option<&dyn DatabaseDropper> {
        match self {
            Dialect::Postgres(d) => Some(d),
            Dialect::MariaDb(d) => Some(d),
            Dialect::MongoDb(d) => Some(d),
            Dialect::Meilisearch(_) | Dialect::Redis(_) => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A fully resolved Global for command-construction tests.
    pub fn test_global(dialect: Dialect) -> Global {
        Global {
            context: None,
            namespace: "default".to_string(),
            dialect,
            pod_name: "db-0".to_string(),
            job_pod_name: None,
            host: "127.0.0.1".to_string(),
            port: None,
            database: Some("appdb".to_string()),
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            remote_gzip: true,
            quiet: false,
        }
    }
}
