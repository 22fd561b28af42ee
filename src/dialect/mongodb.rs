// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! MongoDB dialect.
//!
//! Dumps and restores flow through `mongodump`/`mongorestore --archive`.
//! The authentication database defaults to `admin` only for the built-in
//! superuser; application users authenticate against the target database.

use k8s_openapi::api::core::v1::Pod;

use super::{
    DatabaseDropper, DatabaseLister, DialectInfo, DumpOptions, Dumper, Execer, HasDatabase,
    HasPassword, HasPort, HasUser, RestoreOptions, Restorer,
};
use crate::command::{CommandBuilder, Segment, lit, raw};
use crate::config::Global;
use crate::format::Format;
use crate::kubernetes::filter::LabelFilter;
use crate::kubernetes::lookup::{ConfigLookup, ConfigLookups};

const SUPERUSER: &str = "root";

const SHELL_BINARY: &str = "\"$(which mongosh || which mongo)\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MongoDb;

impl DialectInfo for MongoDb {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn pretty_name(&self) -> &'static str {
        "MongoDB"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["mongo"]
    }

    fn priority(&self) -> u8 {
        80
    }

    fn pod_filters(&self) -> LabelFilter {
        LabelFilter::or([
            LabelFilter::label("app.kubernetes.io/name", "mongodb"),
            LabelFilter::label("app", "mongodb"),
        ])
    }

    fn format_extensions(&self) -> &'static [(Format, &'static str)] {
        &[(Format::Plain, ".archive"), (Format::Gzip, ".archive.gz")]
    }
}

/// The authentication database: `admin` for the superuser, the target
/// database for everyone else.
fn auth_database(global: &Global) -> String {
    if global.username.as_deref() == Some(SUPERUSER) {
        "admin".to_string()
    } else {
        global.database.clone().unwrap_or_else(|| "admin".to_string())
    }
}

fn connection_args(global: &Global) -> Vec<Segment> {
    let mut args = vec![lit(format!("--host={}", global.host))];
    if let Some(port) = global.port {
        args.push(lit(format!("--port={port}")));
    }
    args.push(lit(format!(
        "--username={}",
        global.username.as_deref().unwrap_or(SUPERUSER)
    )));
    if let Some(password) = &global.password {
        args.push(lit(format!("--password={password}")));
    }
    args.push(lit(format!(
        "--authenticationDatabase={}",
        auth_database(global)
    )));
    args
}

impl Dumper for MongoDb {
    fn dump_command(&self, global: &Global, opts: &DumpOptions) -> CommandBuilder {
        let mut cmd = CommandBuilder::new([lit("mongodump"), lit("--archive")])
            .push(connection_args(global));
        if let Some(database) = &global.database {
            cmd = cmd.push([lit(format!("--db={database}"))]);
        }
        if global.quiet {
            cmd = cmd.push([lit("--quiet")]);
        }
        if opts.format.is_wire_gzipped() && global.remote_gzip {
            cmd = cmd.pipe([lit("gzip"), lit("--force")]);
        }
        cmd
    }
}

impl Restorer for MongoDb {
    fn restore_command(
        &self,
        global: &Global,
        format: Format,
        _opts: &RestoreOptions,
    ) -> CommandBuilder {
        let mut cmd = CommandBuilder::new([lit("mongorestore"), lit("--archive")])
            .push(connection_args(global));
        if let Some(database) = &global.database {
            cmd = cmd.push([lit(format!("--db={database}"))]);
        }
        if global.quiet {
            cmd = cmd.push([lit("--quiet")]);
        }
        if format == Format::Gzip && global.remote_gzip {
            cmd = cmd.unshift([lit("gunzip"), lit("--force"), Segment::Pipe]);
        }
        cmd
    }
}

impl Execer for MongoDb {
    fn exec_command(&self, global: &Global) -> CommandBuilder {
        let mut cmd = CommandBuilder::new([raw(SHELL_BINARY)]).push(connection_args(global));
        if let Some(database) = &global.database {
            cmd = cmd.push([lit(database.clone())]);
        }
        cmd
    }
}

impl HasPort for MongoDb {
    fn default_port(&self) -> u16 {
        27017
    }

    fn port_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["MONGODB_PORT_NUMBER"]),
            ConfigLookup::default_value("27017"),
        ])
    }
}

impl HasUser for MongoDb {
    fn default_user(&self) -> &'static str {
        SUPERUSER
    }

    fn user_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["MONGODB_ROOT_USER", "MONGODB_EXTRA_USERNAMES"]),
            ConfigLookup::default_value(SUPERUSER),
        ])
    }
}

impl HasPassword for MongoDb {
    fn password_lookups(&self, username: &str, _pod: &Pod) -> ConfigLookups {
        if username == SUPERUSER {
            ConfigLookups::new([ConfigLookup::env(["MONGODB_ROOT_PASSWORD"])])
        } else {
            ConfigLookups::new([ConfigLookup::env([
                "MONGODB_PASSWORD",
                "MONGODB_EXTRA_PASSWORDS",
            ])])
        }
    }
}

impl HasDatabase for MongoDb {
    fn database_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([ConfigLookup::env([
            "MONGODB_DATABASE",
            "MONGODB_EXTRA_DATABASES",
        ])])
    }
}

impl DatabaseLister for MongoDb {
    fn database_list_command(&self, global: &Global) -> CommandBuilder {
        let mut no_db = global.clone();
        no_db.database = None;
        CommandBuilder::new([raw(SHELL_BINARY)])
            .push(connection_args(&no_db))
            .push([
                lit("--quiet"),
                lit("--eval=db.getMongo().getDBNames().join(\"\\n\")"),
            ])
    }
}

impl DatabaseDropper for MongoDb {
    fn drop_query(&self, _database: &str) -> String {
        // mongorestore connects to --db, so the script runs in the target
        // database already
        "db.dropDatabase()".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::dialect::test_support::test_global;

    fn global() -> Global {
        test_global(Dialect::MongoDb(MongoDb))
    }

    #[test]
    fn test_auth_database_app_user() {
        // username "admin" != superuser, so auth against the target db
        let cmd = MongoDb.dump_command(&global(), &DumpOptions::default());
        assert_eq!(
            cmd.render(),
            "mongodump --archive --host=127.0.0.1 --username=admin --password=hunter2 \
             --authenticationDatabase=appdb --db=appdb | gzip --force"
        );
    }

    #[test]
    fn test_auth_database_superuser() {
        let mut g = global();
        g.username = Some("root".to_string());
        let rendered = MongoDb.dump_command(&g, &DumpOptions::default()).render();
        assert!(rendered.contains("--authenticationDatabase=admin"));
    }

    #[test]
    fn test_restore_uses_archive() {
        let cmd = MongoDb.restore_command(&global(), Format::Gzip, &RestoreOptions::default());
        let rendered = cmd.render();
        assert!(rendered.starts_with("gunzip --force | mongorestore --archive"));
        assert!(rendered.contains("--db=appdb"));
    }

    #[test]
    fn test_exec_falls_back_to_legacy_shell() {
        let rendered = MongoDb.exec_command(&global()).render();
        assert!(rendered.starts_with("\"$(which mongosh || which mongo)\""));
        assert!(rendered.ends_with("appdb"));
    }

    #[test]
    fn test_password_lookup_depends_on_username() {
        let pod = Pod::default();
        assert_eq!(
            MongoDb.password_lookups("root", &pod).0,
            vec![ConfigLookup::env(["MONGODB_ROOT_PASSWORD"])]
        );
        assert_eq!(
            MongoDb.password_lookups("app", &pod).0,
            vec![ConfigLookup::env([
                "MONGODB_PASSWORD",
                "MONGODB_EXTRA_PASSWORDS"
            ])]
        );
    }
}
