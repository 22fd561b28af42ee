// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! PostgreSQL dialect.
//!
//! Covers the bitnami `postgresql` and `postgresql-ha` charts, CloudNativePG
//! and Zalando/Spilo operators, and plain `app=postgresql` deployments.
//! Dump and restore shell out to `pg_dump`/`psql`/`pg_restore` inside the
//! target pod, with the password carried in `PGPASSWORD`.

use k8s_openapi::api::core::v1::Pod;

use super::{
    DatabaseDropper, DatabaseLister, DialectInfo, DumpOptions, Dumper, Execer, HasDatabase,
    HasPassword, HasPort, HasUser, LeaderHint, RestoreOptions, Restorer, TableLister,
};
use crate::command::{CommandBuilder, env, lit};
use crate::config::Global;
use crate::format::Format;
use crate::kubernetes::filter::{LabelFilter, pod_label};
use crate::kubernetes::lookup::{ConfigLookup, ConfigLookups};

const SUPERUSER: &str = "postgres";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Postgres;

impl DialectInfo for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn pretty_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["postgresql", "psql", "pg"]
    }

    fn priority(&self) -> u8 {
        100
    }

    fn pod_filters(&self) -> LabelFilter {
        LabelFilter::or([
            LabelFilter::label("app.kubernetes.io/name", "postgresql"),
            LabelFilter::label("app.kubernetes.io/name", "postgresql-ha"),
            LabelFilter::exists("cnpg.io/cluster"),
            LabelFilter::label("application", "spilo"),
            LabelFilter::label("app", "postgresql"),
        ])
    }

    fn format_extensions(&self) -> &'static [(Format, &'static str)] {
        &[
            (Format::Plain, ".sql"),
            (Format::Gzip, ".sql.gz"),
            (Format::Custom, ".dmp"),
        ]
    }

    fn leader_hint(&self, pods: &[Pod]) -> Option<LeaderHint> {
        if pods.iter().any(|p| pod_label(p, "cnpg.io/cluster").is_some()) {
            return Some(LeaderHint::Label {
                name: "cnpg.io/instanceRole",
                value: "primary",
            });
        }
        if pods.iter().any(|p| pod_label(p, "spilo-role").is_some()) {
            return Some(LeaderHint::Label {
                name: "spilo-role",
                value: "master",
            });
        }
        if pods
            .iter()
            .any(|p| pod_label(p, "app.kubernetes.io/name") == Some("postgresql-ha"))
        {
            return Some(LeaderHint::RepmgrCsv);
        }
        None
    }
}

/// Quote a pg_dump table pattern: each part between `*` wildcards is wrapped
/// in double quotes (embedded quotes doubled), the wildcards themselves stay
/// bare so pg_dump's own glob handling still sees them.
fn quote_table_pattern(pattern: &str) -> String {
    pattern
        .split('*')
        .map(|part| {
            if part.is_empty() {
                String::new()
            } else {
                format!("\"{}\"", part.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join("*")
}

/// Connection arguments shared by every client invocation.
fn connection_args(global: &Global) -> Vec<crate::command::Segment> {
    let mut args = vec![
        lit(format!("--host={}", global.host)),
        lit(format!(
            "--username={}",
            global.username.as_deref().unwrap_or(SUPERUSER)
        )),
    ];
    if let Some(port) = global.port {
        args.push(lit(format!("--port={port}")));
    }
    args
}

fn psql(global: &Global) -> CommandBuilder {
    let mut cmd = CommandBuilder::new([env(
        "PGPASSWORD",
        global.password.clone().unwrap_or_default(),
    )]);
    if global.quiet {
        cmd = cmd.push([env("PGOPTIONS", "-c client_min_messages=warning")]);
    }
    cmd = cmd.push([lit("psql")]).push(connection_args(global));
    if let Some(database) = &global.database {
        cmd = cmd.push([lit(format!("--dbname={database}"))]);
    }
    cmd
}

impl Dumper for Postgres {
    fn dump_command(&self, global: &Global, opts: &DumpOptions) -> CommandBuilder {
        let mut cmd = CommandBuilder::new([env(
            "PGPASSWORD",
            global.password.clone().unwrap_or_default(),
        )])
        .push([lit("pg_dump")])
        .push(connection_args(global));

        if let Some(database) = &global.database {
            cmd = cmd.push([lit(format!("--dbname={database}"))]);
        }
        if opts.clean {
            cmd = cmd.push([lit("--clean")]);
        }
        if opts.no_owner {
            cmd = cmd.push([lit("--no-owner")]);
        }
        if opts.if_exists {
            cmd = cmd.push([lit("--if-exists")]);
        }
        for table in &opts.tables {
            cmd = cmd.push([lit(format!("--table={}", quote_table_pattern(table)))]);
        }
        for table in &opts.exclude_table {
            cmd = cmd.push([lit(format!(
                "--exclude-table={}",
                quote_table_pattern(table)
            ))]);
        }
        for table in &opts.exclude_table_data {
            cmd = cmd.push([lit(format!(
                "--exclude-table-data={}",
                quote_table_pattern(table)
            ))]);
        }
        if opts.format == Format::Custom {
            cmd = cmd.push([lit("--format=c")]);
        }
        if !global.quiet {
            cmd = cmd.push([lit("--verbose")]);
        }
        if opts.format.is_wire_gzipped() && global.remote_gzip {
            cmd = cmd.pipe([lit("gzip"), lit("--force")]);
        }
        cmd
    }
}

impl Restorer for Postgres {
    fn restore_command(
        &self,
        global: &Global,
        format: Format,
        opts: &RestoreOptions,
    ) -> CommandBuilder {
        match format {
            Format::Custom => {
                let mut cmd = CommandBuilder::new([env(
                    "PGPASSWORD",
                    global.password.clone().unwrap_or_default(),
                )])
                .push([lit("pg_restore")])
                .push(connection_args(global));
                if let Some(database) = &global.database {
                    cmd = cmd.push([lit(format!("--dbname={database}"))]);
                }
                cmd = cmd.push([
                    lit("--format=custom"),
                    lit("--clean"),
                    lit("--exit-on-error"),
                ]);
                if opts.no_owner {
                    cmd = cmd.push([lit("--no-owner")]);
                }
                if !global.quiet {
                    cmd = cmd.push([lit("--verbose")]);
                }
                cmd
            }
            Format::Plain | Format::Gzip => {
                let mut cmd = psql(global);
                if global.quiet {
                    cmd = cmd.push([lit("--quiet"), lit("--output=/dev/null")]);
                }
                cmd = cmd.push([lit("--set=ON_ERROR_STOP=1")]);
                if format == Format::Gzip && global.remote_gzip {
                    cmd = cmd.unshift([lit("gunzip"), lit("--force"), crate::command::Segment::Pipe]);
                }
                cmd
            }
        }
    }

    fn analyze_query(&self) -> Option<&'static str> {
        Some("ANALYZE;")
    }
}

impl Execer for Postgres {
    fn exec_command(&self, global: &Global) -> CommandBuilder {
        psql(global)
    }
}

impl HasPort for Postgres {
    fn default_port(&self) -> u16 {
        5432
    }

    fn port_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["POSTGRESQL_PORT_NUMBER", "PGPORT"]),
            ConfigLookup::default_value("5432"),
        ])
    }
}

impl HasUser for Postgres {
    fn default_user(&self) -> &'static str {
        SUPERUSER
    }

    fn user_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["POSTGRES_USER", "PGUSER"]),
            ConfigLookup::default_value(SUPERUSER),
        ])
    }
}

impl HasPassword for Postgres {
    fn password_lookups(&self, username: &str, pod: &Pod) -> ConfigLookups {
        let mut lookups = Vec::new();

        // CloudNativePG keeps credentials in per-cluster named secrets.
        if let Some(cluster) = pod_label(pod, "cnpg.io/cluster") {
            let secret = if username == SUPERUSER {
                format!("{cluster}-superuser")
            } else {
                format!("{cluster}-app")
            };
            lookups.push(ConfigLookup::named_secret(secret, "password"));
        }

        if username == SUPERUSER {
            // bitnami exposes a distinct secret key for the superuser when
            // an application user is also configured.
            lookups.push(ConfigLookup::env([
                "POSTGRES_POSTGRES_PASSWORD",
                "POSTGRES_PASSWORD",
                "PGPASSWORD",
            ]));
        } else {
            lookups.push(ConfigLookup::env(["POSTGRES_PASSWORD", "PGPASSWORD"]));
        }

        ConfigLookups::new(lookups)
    }
}

impl HasDatabase for Postgres {
    fn database_lookups(&self) -> ConfigLookups {
        ConfigLookups::new([
            ConfigLookup::env(["POSTGRES_DATABASE", "POSTGRES_DB", "PGDATABASE"]),
            ConfigLookup::default_value(SUPERUSER),
        ])
    }
}

impl DatabaseLister for Postgres {
    fn database_list_command(&self, global: &Global) -> CommandBuilder {
        let mut no_db = global.clone();
        no_db.database = None;
        psql(&no_db).push([
            lit("--tuples-only"),
            lit("--no-align"),
            lit("--command=SELECT datname FROM pg_database WHERE NOT datistemplate ORDER BY datname"),
        ])
    }
}

impl TableLister for Postgres {
    fn table_list_command(&self, global: &Global) -> CommandBuilder {
        psql(global).push([
            lit("--tuples-only"),
            lit("--no-align"),
            lit("--command=SELECT tablename FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename"),
        ])
    }
}

impl DatabaseDropper for Postgres {
    fn drop_query(&self, _database: &str) -> String {
        // restores connect to the target database, so cleaning means
        // recreating the public schema rather than dropping the database
        "DROP SCHEMA IF EXISTS public CASCADE; CREATE SCHEMA public;".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::dialect::test_support::test_global;

    fn global() -> Global {
        test_global(Dialect::Postgres(Postgres))
    }

    #[test]
    fn test_dump_flag_matrix() {
        let opts = DumpOptions {
            format: Format::Gzip,
            clean: true,
            no_owner: true,
            if_exists: true,
            tables: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        let cmd = Postgres.dump_command(&global(), &opts);
        assert_eq!(
            cmd.render(),
            "PGPASSWORD=hunter2 pg_dump --host=127.0.0.1 --username=admin --dbname=appdb \
             --clean --no-owner --if-exists '--table=\"a\"' '--table=\"b\"' --verbose \
             | gzip --force"
        );
    }

    #[test]
    fn test_dump_custom_format_never_gzipped() {
        let opts = DumpOptions {
            format: Format::Custom,
            ..Default::default()
        };
        let rendered = Postgres.dump_command(&global(), &opts).render();
        assert!(rendered.contains("--format=c"));
        assert!(!rendered.contains("gzip"));
    }

    #[test]
    fn test_dump_quiet_drops_verbose() {
        let mut g = global();
        g.quiet = true;
        let rendered = Postgres
            .dump_command(&g, &DumpOptions::default())
            .render();
        assert!(!rendered.contains("--verbose"));
    }

    #[test]
    fn test_dump_exclusions_and_port() {
        let mut g = global();
        g.port = Some(5433);
        let opts = DumpOptions {
            exclude_table: vec!["log*".to_string()],
            exclude_table_data: vec!["audit".to_string()],
            ..Default::default()
        };
        let rendered = Postgres.dump_command(&g, &opts).render();
        assert!(rendered.contains("--port=5433"));
        assert!(rendered.contains("'--exclude-table=\"log\"*'"));
        assert!(rendered.contains("'--exclude-table-data=\"audit\"'"));
    }

    #[test]
    fn test_restore_gzip_pipes_through_gunzip() {
        let cmd = Postgres.restore_command(&global(), Format::Gzip, &RestoreOptions::default());
        assert_eq!(
            cmd.render(),
            "gunzip --force | PGPASSWORD=hunter2 psql --host=127.0.0.1 --username=admin \
             --dbname=appdb --set=ON_ERROR_STOP=1"
        );
    }

    #[test]
    fn test_restore_plain_has_no_gunzip() {
        let rendered = Postgres
            .restore_command(&global(), Format::Plain, &RestoreOptions::default())
            .render();
        assert!(!rendered.contains("gunzip"));
        assert!(rendered.contains("--set=ON_ERROR_STOP=1"));
    }

    #[test]
    fn test_restore_quiet_adds_pgoptions() {
        let mut g = global();
        g.quiet = true;
        let rendered = Postgres
            .restore_command(&g, Format::Plain, &RestoreOptions::default())
            .render();
        assert!(rendered.contains("PGOPTIONS='-c client_min_messages=warning'"));
        assert!(rendered.contains("--quiet"));
        assert!(rendered.contains("--output=/dev/null"));
    }

    #[test]
    fn test_restore_custom_uses_pg_restore() {
        let opts = RestoreOptions { no_owner: true };
        let cmd = Postgres.restore_command(&global(), Format::Custom, &opts);
        assert_eq!(
            cmd.render(),
            "PGPASSWORD=hunter2 pg_restore --host=127.0.0.1 --username=admin --dbname=appdb \
             --format=custom --clean --exit-on-error --no-owner --verbose"
        );
    }

    #[test]
    fn test_quote_table_pattern() {
        assert_eq!(quote_table_pattern("users"), "\"users\"");
        assert_eq!(quote_table_pattern("a*b"), "\"a\"*\"b\"");
        assert_eq!(quote_table_pattern("*"), "*");
        assert_eq!(quote_table_pattern("log*"), "\"log\"*");
        assert_eq!(quote_table_pattern("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_leader_hint_topologies() {
        use k8s_openapi::api::core::v1::Pod;
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

        let pod = |labels: &[(&str, &str)]| Pod {
            metadata: ObjectMeta {
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };

        let cnpg = vec![pod(&[("cnpg.io/cluster", "mydb")])];
        assert_eq!(
            Postgres.leader_hint(&cnpg),
            Some(LeaderHint::Label {
                name: "cnpg.io/instanceRole",
                value: "primary"
            })
        );

        let spilo = vec![pod(&[("spilo-role", "replica")])];
        assert_eq!(
            Postgres.leader_hint(&spilo),
            Some(LeaderHint::Label {
                name: "spilo-role",
                value: "master"
            })
        );

        let ha = vec![pod(&[("app.kubernetes.io/name", "postgresql-ha")])];
        assert_eq!(Postgres.leader_hint(&ha), Some(LeaderHint::RepmgrCsv));

        let plain = vec![pod(&[("app", "postgresql")])];
        assert_eq!(Postgres.leader_hint(&plain), None);
    }

    #[test]
    fn test_password_lookup_depends_on_username() {
        let pod = Pod::default();
        let superuser = Postgres.password_lookups("postgres", &pod);
        assert_eq!(
            superuser.0[0],
            ConfigLookup::env([
                "POSTGRES_POSTGRES_PASSWORD",
                "POSTGRES_PASSWORD",
                "PGPASSWORD"
            ])
        );

        let app = Postgres.password_lookups("app", &pod);
        assert_eq!(
            app.0[0],
            ConfigLookup::env(["POSTGRES_PASSWORD", "PGPASSWORD"])
        );
    }

    #[test]
    fn test_password_lookup_cnpg_named_secret() {
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
        let pod = Pod {
            metadata: ObjectMeta {
                labels: Some(
                    [("cnpg.io/cluster".to_string(), "mydb".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        let lookups = Postgres.password_lookups("app", &pod);
        assert_eq!(
            lookups.0[0],
            ConfigLookup::named_secret("mydb-app", "password")
        );
        let lookups = Postgres.password_lookups("postgres", &pod);
        assert_eq!(
            lookups.0[0],
            ConfigLookup::named_secret("mydb-superuser", "password")
        );
    }
}
