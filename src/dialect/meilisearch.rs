// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Meilisearch dialect.
//!
//! Thin: exec and port-forward only. Dump/restore go through the live
//! instance's HTTP API, so a disposable job pod would be useless here and
//! `create_job` is disabled.

use k8s_openapi::api::core::v1::Pod;

use super::{DialectInfo, Execer, HasPassword, HasPort};
use crate::command::{CommandBuilder, lit};
use crate::config::Global;
use crate::kubernetes::filter::LabelFilter;
use crate::kubernetes::lookup::{ConfigLookup, ConfigLookups};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meilisearch;

impl DialectInfo for Meilisearch {
    fn name(&self) -> &'static str {
        "meilisearch"
    }

    fn pretty_name(&self) -> &'static str {
        "Meilisearch"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["meili"]
    }

    fn priority(&self) -> u8 {
        60
    }

    fn pod_filters(&self) -> LabelFilter {
        LabelFilter::or([
            LabelFilter::label("app.kubernetes.io/name", "meilisearch"),
            LabelFilter::label("app", "meilisearch"),
        ])
    }

    fn create_job(&self) -> bool {
        false
    }
}

impl Execer for Meilisearch {
    fn exec_command(&self, _global: &Global) -> CommandBuilder {
        // no engine shell; drop the operator into sh next to the instance
        CommandBuilder::new([lit("sh")])
    }
}

impl HasPort for Meilisearch {
    fn default_port(&self) -> u16 {
        7700
    }

    fn port_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["MEILI_PORT"]),
            ConfigLookup::default_value("7700"),
        ])
    }
}

impl HasPassword for Meilisearch {
    fn password_lookups(&self, _username: &str, _pod: &Pod) -> ConfigLookups {
        ConfigLookups::new([ConfigLookup::env(["MEILI_MASTER_KEY"])])
    }
}
