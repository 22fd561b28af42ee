// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! CLI front door: resolves a `Global` from flags, discovery, and lookups,
//! then dispatches to the requested action.

pub mod args;

pub use args::{Args, Command};

use anyhow::{Context, Result, anyhow};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::info;

use crate::actions;
use crate::actions::dump::DumpArgs;
use crate::actions::exec::ExecArgs;
use crate::actions::port_forward::PortForwardArgs;
use crate::actions::restore::RestoreArgs;
use crate::config::{Config, Global};
use crate::dialect::Dialect;
use crate::errors::Error;
use crate::kubernetes::discovery::{DatabaseMatch, find_database};
use crate::kubernetes::exec::exec_capture;
use crate::kubernetes::lookup::ClusterSecrets;
use crate::kubernetes::{create_client, job};
use crate::session::Session;
use crate::transfer::progress::create_spinner;

pub async fn run(args: Args, session: &Session) -> Result<()> {
    let config = Config::load().unwrap_or_default();

    let context = args.context.clone().or_else(|| config.context.clone());
    let (client, namespace) = create_client(context.as_deref(), args.namespace.as_deref()).await?;

    let spinner = create_spinner("Locating database...");
    let resolved = resolve_global(&client, &namespace, &args, &config, session).await;
    spinner.finish_and_clear();
    let global = resolved?;

    info!(
        dialect = global.dialect.info().pretty_name(),
        pod = %global.pod_name,
        namespace = %global.namespace,
        "resolved target"
    );

    match args.command {
        Command::Dump {
            filename,
            format,
            clean,
            no_owner,
            if_exists,
            tables,
            exclude_table,
            exclude_table_data,
        } => {
            actions::dump::run(
                &client,
                &global,
                session,
                DumpArgs {
                    filename,
                    format,
                    clean,
                    no_owner,
                    if_exists,
                    tables,
                    exclude_table,
                    exclude_table_data,
                },
            )
            .await
        }
        Command::Restore {
            filename,
            clean,
            no_owner,
            force,
            no_analyze,
        } => {
            actions::restore::run(
                &client,
                &global,
                session,
                RestoreArgs {
                    filename,
                    clean,
                    no_owner,
                    force,
                    no_analyze,
                },
            )
            .await
        }
        Command::Exec { command } => {
            actions::exec::run(&client, &global, session, ExecArgs { command }).await
        }
        Command::PortForward {
            local_port,
            address,
        } => {
            actions::port_forward::run(
                &client,
                &global,
                PortForwardArgs {
                    local_port,
                    address,
                },
            )
            .await
        }
        Command::Databases => {
            let lister = global
                .dialect
                .as_database_lister()
                .ok_or(Error::CapabilityMissing {
                    dialect: global.dialect.info().pretty_name(),
                    operation: "listing databases",
                })?;
            print_lines(&client, &global, &lister.database_list_command(&global).render()).await
        }
        Command::Tables => {
            let lister = global
                .dialect
                .as_table_lister()
                .ok_or(Error::CapabilityMissing {
                    dialect: global.dialect.info().pretty_name(),
                    operation: "listing tables",
                })?;
            print_lines(&client, &global, &lister.table_list_command(&global).render()).await
        }
        Command::Status => {
            print_status(&global);
            Ok(())
        }
    }
}

/// Assemble the invocation's Global: elect the pod, optionally stand up a
/// job pod, and resolve every connection parameter the dialect advertises.
/// Any unresolvable parameter fails the whole invocation here, before a
/// single byte is streamed.
async fn resolve_global(
    client: &Client,
    namespace: &str,
    args: &Args,
    config: &Config,
    session: &Session,
) -> Result<Global> {
    let dialect_override = args
        .dialect
        .as_deref()
        .map(Dialect::from_name)
        .transpose()?;

    let matched = match &args.pod {
        Some(pod_name) => {
            let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
            let pod = pods
                .get(pod_name)
                .await
                .with_context(|| format!("pod \"{pod_name}\" not found"))?;
            let dialect = match dialect_override {
                Some(dialect) => dialect,
                None => Dialect::all()
                    .into_iter()
                    .find(|d| d.info().pod_filters().matches_pod(&pod))
                    .ok_or_else(|| {
                        anyhow!("could not detect a dialect for pod \"{pod_name}\"; pass --dialect")
                    })?,
            };
            DatabaseMatch {
                dialect,
                pods: vec![pod],
            }
        }
        None => find_database(client, namespace, dialect_override).await?,
    };

    let dialect = matched.dialect;
    let pod = matched.primary().clone();
    let pod_name = pod
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow!("elected pod has no name"))?;

    let needs_exec = !matches!(args.command, Command::PortForward { .. } | Command::Status);
    let use_job = args.job && needs_exec && dialect.info().create_job();
    let (job_pod_name, host) = if use_job {
        let image = job::pod_image(&pod)
            .ok_or_else(|| anyhow!("pod \"{pod_name}\" has no container image"))?;
        let job_pod =
            job::create_job_pod(client, namespace, &image, dialect.info().name(), session).await?;
        let host = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.clone())
            .ok_or_else(|| anyhow!("pod \"{pod_name}\" has no IP"))?;
        (Some(job_pod), host)
    } else {
        (None, "127.0.0.1".to_string())
    };

    let secrets = ClusterSecrets::new(client.clone(), namespace);

    let port = match (args.port, dialect.as_port()) {
        (Some(port), _) => Some(port),
        (None, Some(has_port)) => {
            let raw = has_port
                .port_lookups()
                .search(&pod, &secrets, "port")
                .await?;
            Some(
                raw.parse()
                    .with_context(|| format!("invalid port \"{raw}\""))?,
            )
        }
        (None, None) => None,
    };

    let username = match (args.username.clone(), dialect.as_user()) {
        (Some(username), _) => Some(username),
        (None, Some(has_user)) => Some(
            has_user
                .user_lookups()
                .search(&pod, &secrets, "username")
                .await?,
        ),
        (None, None) => None,
    };

    let database = match (args.database.clone(), dialect.as_database()) {
        (Some(database), _) => Some(database),
        (None, Some(has_database)) => Some(
            has_database
                .database_lookups()
                .search(&pod, &secrets, "database")
                .await?,
        ),
        (None, None) => None,
    };

    let password = match (args.password.clone(), dialect.as_password()) {
        (Some(password), _) => Some(password),
        (None, Some(has_password)) => Some(
            has_password
                .password_lookups(username.as_deref().unwrap_or_default(), &pod)
                .search(&pod, &secrets, "password")
                .await?,
        ),
        (None, None) => None,
    };
    if let Some(password) = &password {
        session.masks.add(password.clone());
    }

    let remote_gzip = if args.local_gzip {
        false
    } else {
        config.remote_gzip.unwrap_or(true)
    };

    Ok(Global {
        context: args.context.clone().or_else(|| config.context.clone()),
        namespace: namespace.to_string(),
        dialect,
        pod_name,
        job_pod_name,
        host,
        port,
        database,
        username,
        password,
        remote_gzip,
        quiet: args.quiet,
    })
}

/// Run a lister command and print its non-empty output lines.
async fn print_lines(client: &Client, global: &Global, command: &str) -> Result<()> {
    let output = exec_capture(client, &global.namespace, global.exec_target(), command).await?;
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        println!("{line}");
    }
    Ok(())
}

fn print_status(global: &Global) {
    println!("context:   {}", global.context.as_deref().unwrap_or("(current)"));
    println!("namespace: {}", global.namespace);
    println!("dialect:   {}", global.dialect.info().pretty_name());
    println!("pod:       {}", global.pod_name);
    if let Some(port) = global.port {
        println!("port:      {port}");
    }
    if let Some(database) = &global.database {
        println!("database:  {database}");
    }
    if let Some(username) = &global.username {
        println!("username:  {username}");
    }
    println!(
        "password:  {}",
        if global.password.is_some() {
            "********"
        } else {
            "(none)"
        }
    );
}
