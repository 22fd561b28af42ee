// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! MariaDB/MySQL dialect.
//!
//! The two packagings ship differently named client binaries, so every
//! invocation resolves the binary defensively with
//! `"$(which mariadb-dump || which mysqldump)"`. The password travels in
//! `MYSQL_PWD`, never as a CLI flag.

use k8s_openapi::api::core::v1::Pod;

use super::{
    DatabaseDropper, DatabaseLister, DialectInfo, DumpOptions, Dumper, Execer, HasDatabase,
    HasPassword, HasPort, HasUser, RestoreOptions, Restorer, TableLister,
};
use crate::command::{CommandBuilder, Segment, env, lit, raw};
use crate::config::Global;
use crate::format::Format;
use crate::kubernetes::filter::LabelFilter;
use crate::kubernetes::lookup::{ConfigLookup, ConfigLookups};

const SUPERUSER: &str = "root";

const DUMP_BINARY: &str = "\"$(which mariadb-dump || which mysqldump)\"";
const CLIENT_BINARY: &str = "\"$(which mariadb || which mysql)\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MariaDb;

impl DialectInfo for MariaDb {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn pretty_name(&self) -> &'static str {
        "MariaDB"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["mysql", "maria"]
    }

    fn priority(&self) -> u8 {
        90
    }

    fn pod_filters(&self) -> LabelFilter {
        LabelFilter::or([
            LabelFilter::label("app.kubernetes.io/name", "mariadb"),
            LabelFilter::label("app.kubernetes.io/name", "mysql"),
            LabelFilter::label("app", "mariadb"),
            LabelFilter::label("app", "mysql"),
        ])
    }

    fn format_extensions(&self) -> &'static [(Format, &'static str)] {
        &[(Format::Plain, ".sql"), (Format::Gzip, ".sql.gz")]
    }
}

fn connection_args(global: &Global) -> Vec<Segment> {
    let mut args = vec![
        lit(format!("--host={}", global.host)),
        lit(format!(
            "--user={}",
            global.username.as_deref().unwrap_or(SUPERUSER)
        )),
    ];
    if let Some(port) = global.port {
        args.push(lit(format!("--port={port}")));
    }
    args
}

fn client(global: &Global) -> CommandBuilder {
    CommandBuilder::new([env(
        "MYSQL_PWD",
        global.password.clone().unwrap_or_default(),
    )])
    .push([raw(CLIENT_BINARY)])
    .push(connection_args(global))
}

/// Quote an identifier for interpolation into SQL: backticks around it,
/// embedded backticks doubled.
fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

impl Dumper for MariaDb {
    fn dump_command(&self, global: &Global, opts: &DumpOptions) -> CommandBuilder {
        let database = global.database.clone().unwrap_or_default();
        let mut cmd = CommandBuilder::new([env(
            "MYSQL_PWD",
            global.password.clone().unwrap_or_default(),
        )])
        .push([raw(DUMP_BINARY)])
        .push(connection_args(global));

        if !global.quiet {
            cmd = cmd.push([lit("--verbose")]);
        }
        // mysqldump has no data-only exclusion; both exclusion lists map to
        // --ignore-table
        for table in opts.exclude_table.iter().chain(&opts.exclude_table_data) {
            cmd = cmd.push([lit(format!("--ignore-table={database}.{table}"))]);
        }

        cmd = cmd.push([lit(database)]);
        for table in &opts.tables {
            cmd = cmd.push([lit(table.clone())]);
        }

        if opts.format.is_wire_gzipped() && global.remote_gzip {
            cmd = cmd.pipe([lit("gzip"), lit("--force")]);
        }
        cmd
    }
}

impl Restorer for MariaDb {
    fn restore_command(
        &self,
        global: &Global,
        format: Format,
        _opts: &RestoreOptions,
    ) -> CommandBuilder {
        let mut cmd = client(global);
        if let Some(database) = &global.database {
            cmd = cmd.push([lit(format!("--database={database}"))]);
        }
        if format == Format::Gzip && global.remote_gzip {
            cmd = cmd.unshift([lit("gunzip"), lit("--force"), Segment::Pipe]);
        }
        cmd
    }
}

impl Execer for MariaDb {
    fn exec_command(&self, global: &Global) -> CommandBuilder {
        let mut cmd = client(global);
        if let Some(database) = &global.database {
            cmd = cmd.push([lit(format!("--database={database}"))]);
        }
        cmd
    }
}

impl HasPort for MariaDb {
    fn default_port(&self) -> u16 {
        3306
    }

    fn port_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["MARIADB_PORT_NUMBER", "MYSQL_PORT"]),
            ConfigLookup::default_value("3306"),
        ])
    }
}

impl HasUser for MariaDb {
    fn default_user(&self) -> &'static str {
        SUPERUSER
    }

    fn user_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["MARIADB_USER", "MYSQL_USER"]),
            ConfigLookup::default_value(SUPERUSER),
        ])
    }
}

impl HasPassword for MariaDb {
    fn password_lookups(&self, username: &str, _pod: &Pod) -> ConfigLookups {
        if username == SUPERUSER {
            ConfigLookups::new([
                ConfigLookup::env(["MARIADB_ROOT_PASSWORD", "MYSQL_ROOT_PASSWORD"]),
                ConfigLookup::secret_volume("mariadb-credentials", "mariadb-root-password"),
            ])
        } else {
            ConfigLookups::new([ConfigLookup::env(["MARIADB_PASSWORD", "MYSQL_PASSWORD"])])
        }
    }
}

impl HasDatabase for MariaDb {
    fn database_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([ConfigLookup::env(["MARIADB_DATABASE", "MYSQL_DATABASE"])])
    }
}

impl DatabaseLister for MariaDb {
    fn database_list_command(&self, global: &Global) -> CommandBuilder {
        client(global).push([lit("--skip-column-names"), lit("--execute=SHOW DATABASES")])
    }
}

impl TableLister for MariaDb {
    fn table_list_command(&self, global: &Global) -> CommandBuilder {
        let mut cmd = client(global);
        if let Some(database) = &global.database {
            cmd = cmd.push([lit(format!("--database={database}"))]);
        }
        cmd.push([lit("--skip-column-names"), lit("--execute=SHOW TABLES")])
    }
}

impl DatabaseDropper for MariaDb {
    fn drop_query(&self, database: &str) -> String {
        format!(
            "SET FOREIGN_KEY_CHECKS=0; CREATE OR REPLACE DATABASE {}; SET FOREIGN_KEY_CHECKS=1;",
            quote_identifier(database)
        )
    }
}
