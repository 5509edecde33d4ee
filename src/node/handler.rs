//! Connection Handler
//!
//! One request per connection: decode, execute, reply, and on the master
//! broadcast the operation once the reply has been written.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{Role, ServerConfig};
use crate::error::{Error, Result};
use crate::executor::{Executed, OperationExecutor};
use crate::network::{read_message, write_message, Reply, Request};
use crate::replication::{Broadcaster, Continuity, SequenceTracker};

/// State shared by every connection on a node
pub struct NodeContext {
    pub node_id: String,
    pub executor: OperationExecutor,
    /// Present on the master only
    pub broadcaster: Option<Broadcaster>,
    /// Replica only: highest master sequence seen
    pub sequence: SequenceTracker,
    pub server: ServerConfig,
    /// Replica only: whether clients may send mutations directly
    pub accept_client_writes: bool,
    /// Replica only: hosts allowed to send replicated operations
    pub masters: Vec<IpAddr>,
}

impl NodeContext {
    fn role(&self) -> Role {
        self.executor.role()
    }

    /// Whether `peer` may send replicated operations to this replica
    ///
    /// With no configured masters, only a replica that accepts client
    /// writes anyway trusts every peer.
    fn trusts(&self, peer: &SocketAddr) -> bool {
        if self.masters.is_empty() {
            self.accept_client_writes
        } else {
            self.masters.contains(&peer.ip())
        }
    }

    /// Apply the node's authority rules, then execute
    ///
    /// On the master the returned sequence is the one reserved for the
    /// operation's broadcast.
    pub async fn process(&self, request: &Request, peer: &SocketAddr) -> Result<Executed> {
        let operation = request.operation();

        match (self.role(), request) {
            (Role::Master, Request::Replicate { .. }) => {
                return Err(Error::Authority(
                    "the master does not accept replicated operations".into(),
                ));
            }
            (Role::Replica, Request::Replicate { .. }) if !self.trusts(peer) => {
                return Err(Error::Authority(format!(
                    "{} is not a configured master of this replica",
                    peer.ip()
                )));
            }
            (Role::Replica, Request::Replicate { sequence, .. }) => {
                match self.sequence.observe(*sequence) {
                    Continuity::Gap { missed } => tracing::warn!(
                        "Replication gap on {}: {} broadcast(s) before seq {} not received",
                        self.node_id,
                        missed,
                        sequence
                    ),
                    Continuity::Behind { highest } => tracing::warn!(
                        "Replicated seq {} arrived after seq {} (reordered, or the master restarted)",
                        sequence,
                        highest
                    ),
                    Continuity::First | Continuity::InOrder => {
                        tracing::debug!("Replicated seq {}", sequence)
                    }
                }
            }
            (Role::Replica, Request::Client { .. }) if operation.kind().is_mutation() => {
                if !self.accept_client_writes {
                    return Err(Error::Authority(format!(
                        "{} must be sent to the master; this replica serves only SEARCH to clients",
                        operation.kind()
                    )));
                }
                tracing::debug!(
                    "Client {} applied on replica {} only; it will not reach other nodes",
                    operation.kind(),
                    self.node_id
                );
            }
            _ => {}
        }

        self.executor.execute_sequenced(operation).await
    }
}

/// Handle a single connection
pub async fn handle_connection(
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    context: Arc<NodeContext>,
) -> Result<()> {
    let (mut reader, mut writer) = socket.split();
    let server = &context.server;

    let decoded = timeout(
        server.read_timeout(),
        read_message::<Request, _>(&mut reader, server.max_frame_bytes),
    )
    .await
    .map_err(|_| Error::ConnectionTimeout(peer_addr.to_string()))?;

    let request = match decoded {
        Ok(request) => request,
        Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            tracing::debug!("Connection from {} closed before a full request", peer_addr);
            return Ok(());
        }
        Err(e) => {
            tracing::warn!("Failed to decode request from {}: {}", peer_addr, e);
            let reply = Reply::failure(&e);
            timeout(server.write_timeout(), write_message(&mut writer, &reply))
                .await
                .map_err(|_| Error::ConnectionTimeout(peer_addr.to_string()))??;
            return Ok(());
        }
    };

    let operation = request.operation();
    tracing::info!(
        "Received {} operation {} from {}: database={:?} table={:?}",
        request.type_name(),
        operation.kind(),
        peer_addr,
        operation.database(),
        operation.table()
    );
    tracing::debug!(
        "  data={:?} condition={:?}",
        operation.data(),
        operation.condition()
    );

    let result = context.process(&request, &peer_addr).await;
    let (reply, broadcast_sequence) = match result {
        Ok(executed) => {
            tracing::info!("Processed operation {} successfully", operation.kind());
            (Reply::from(executed.outcome), executed.sequence)
        }
        Err(e) => {
            tracing::warn!("Operation {} failed: {}", operation.kind(), e);
            (Reply::failure(&e), None)
        }
    };

    match timeout(server.write_timeout(), write_message(&mut writer, &reply)).await {
        Ok(Ok(())) => {
            if let Reply::Rows { rows } = &reply {
                tracing::debug!("Sent SEARCH result with {} records to {}", rows.len(), peer_addr);
            }
        }
        Ok(Err(e)) => tracing::debug!("Failed to send reply to {}: {}", peer_addr, e),
        Err(_) => tracing::warn!("Timed out sending reply to {}", peer_addr),
    }

    // the client is done once it has its reply
    drop(socket);

    if let (Some(broadcaster), Some(sequence), Request::Client { operation }) =
        (&context.broadcaster, broadcast_sequence, &request)
    {
        let report = broadcaster.broadcast(sequence, operation).await;
        if !report.failed.is_empty() {
            tracing::warn!(
                "Broadcast seq {} reached {}/{} replicas",
                report.sequence,
                report.delivered.len(),
                broadcaster.replicas().len()
            );
        }
    }

    Ok(())
}
