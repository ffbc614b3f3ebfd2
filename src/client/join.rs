use super::driver::Client;
use crate::storage::directory::LocalFileDirectory;
use crate::storage::types::ServerNode;

use anyhow::{Context, Result};
use std::net::IpAddr;
use tokio::net::UdpSocket;

/// Any routable address works; no packet is sent.
const ROUTE_PROBE: &str = "8.8.8.8:80";

/// The local address the OS would use for outbound traffic.
pub async fn discover_local_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to open probe socket")?;
    socket
        .connect(ROUTE_PROBE)
        .await
        .context("no route to determine the local address")?;
    Ok(socket.local_addr()?.ip())
}

/// Announces `port` on this machine, plus every file in `files`, to `primary`.
///
/// Uses `advertise` as the announced address when given, otherwise the detected one.
pub async fn join_cluster(
    primary: &str,
    advertise: Option<&str>,
    port: u16,
    files: &LocalFileDirectory,
) -> Result<ServerNode> {
    let address = match advertise {
        Some(address) => address.to_string(),
        None => discover_local_ip().await?.to_string(),
    };
    let node = ServerNode::new(address, port);
    let names = files.list_all();

    tracing::info!(
        "Joining {} as {} with {} file(s)",
        primary,
        node,
        names.len()
    );
    Client::new(primary)
        .add_server(&node, &names)
        .await
        .with_context(|| format!("failed to register with {}", primary))?;
    Ok(node)
}
