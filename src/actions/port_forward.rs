// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Port-forward action.
//!
//! Binds a local TCP listener and bridges each accepted connection to the
//! database port on the elected pod. Always targets the database pod itself,
//! never a job pod.

use anyhow::{Context, Result, anyhow};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Global;
use crate::errors::Error;

pub struct PortForwardArgs {
    pub local_port: Option<u16>,
    pub address: String,
}

pub async fn run(client: &Client, global: &Global, args: PortForwardArgs) -> Result<()> {
    let remote_port = global.port.ok_or(Error::CapabilityMissing {
        dialect: global.dialect.info().pretty_name(),
        operation: "port-forward",
    })?;
    let local_port = args.local_port.unwrap_or(remote_port);

    let listener = TcpListener::bind((args.address.as_str(), local_port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.address, local_port))?;
    info!(
        "forwarding {}:{} -> {}:{}",
        args.address, local_port, global.pod_name, remote_port
    );

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let pods: Api<Pod> = Api::namespaced(client.clone(), &global.namespace);
        let pod_name = global.pod_name.clone();

        tokio::spawn(async move {
            let result = async {
                let mut forwarder = pods.portforward(&pod_name, &[remote_port]).await?;
                let mut upstream = forwarder
                    .take_stream(remote_port)
                    .ok_or_else(|| anyhow!("no stream for port {remote_port}"))?;
                tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
                drop(upstream);
                forwarder.join().await?;
                Ok::<_, anyhow::Error>(())
            }
            .await;

            if let Err(e) = result {
                warn!(peer = %peer, error = %e, "forwarded connection failed");
            }
        });
    }
}
