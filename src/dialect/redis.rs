// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Redis dialect.
//!
//! Exec and port-forward only; RDB snapshots are not something redis-cli
//! streams over stdin/stdout, so dump and restore are not advertised.

use k8s_openapi::api::core::v1::Pod;

use super::{DialectInfo, Execer, HasPassword, HasPort};
use crate::command::{CommandBuilder, env, lit};
use crate::config::Global;
use crate::kubernetes::filter::LabelFilter;
use crate::kubernetes::lookup::{ConfigLookup, ConfigLookups};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redis;

impl DialectInfo for Redis {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn pretty_name(&self) -> &'static str {
        "Redis"
    }

    fn priority(&self) -> u8 {
        45
    }

    fn pod_filters(&self) -> LabelFilter {
        LabelFilter::or([
            LabelFilter::label("app.kubernetes.io/name", "redis"),
            LabelFilter::label("app", "redis"),
        ])
    }
}

impl Execer for Redis {
    fn exec_command(&self, global: &Global) -> CommandBuilder {
        let mut cmd = CommandBuilder::default();
        if let Some(password) = &global.password {
            cmd = cmd.push([env("REDISCLI_AUTH", password.clone())]);
        }
        cmd = cmd.push([lit("redis-cli"), lit("-h"), lit(global.host.clone())]);
        if let Some(port) = global.port {
            cmd = cmd.push([lit("-p"), lit(port.to_string())]);
        }
        cmd
    }
}

impl HasPort for Redis {
    fn default_port(&self) -> u16 {
        6379
    }

    fn port_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["REDIS_PORT_NUMBER", "REDIS_PORT"]),
            ConfigLookup::default_value("6379"),
        ])
    }
}

impl HasPassword for Redis {
    fn password_lookups(&self, _username: &str, _pod: &Pod) -> ConfigLookups {
        ConfigLookups::new([ConfigLookup::env(["REDIS_PASSWORD"])])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::dialect::test_support::test_global;

    #[test]
    fn test_exec_command() {
        let mut g = test_global(Dialect::Redis(Redis));
        g.port = Some(6379);
        assert_eq!(
            Redis.exec_command(&g).render(),
            "REDISCLI_AUTH=hunter2 redis-cli -h 127.0.0.1 -p 6379"
        );
    }

    #[test]
    fn test_exec_without_password() {
        let mut g = test_global(Dialect::Redis(Redis));
        g.password = None;
        assert_eq!(Redis.exec_command(&g).render(), "redis-cli -h 127.0.0.1");
    }
}
