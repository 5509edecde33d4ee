//! Node
//!
//! A master or replica process: the listening socket, the accept loop and
//! the shared state every connection handler works against.

mod handler;

pub use handler::{handle_connection, NodeContext};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};

use crate::backend::Backend;
use crate::config::{ReplidbConfig, Role};
use crate::error::Result;
use crate::executor::OperationExecutor;
use crate::replication::{Broadcaster, SequenceTracker};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound master or replica node
pub struct Node {
    listener: TcpListener,
    context: Arc<NodeContext>,
    /// Caps concurrently handled connections
    limits: Arc<Semaphore>,
    /// Shutdown signal
    shutdown: watch::Sender<bool>,
}

impl Node {
    /// Bind the node's address and build its executor and broadcaster
    ///
    /// Failing to bind is fatal for the process.
    pub async fn bind(config: &ReplidbConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        let role = config.role();
        let listener = TcpListener::bind(&config.node.bind_address).await?;

        let broadcaster = match role {
            Role::Master => Some(Broadcaster::new(&config.replication)),
            Role::Replica => None,
        };

        let context = Arc::new(NodeContext {
            node_id: config.node.id.clone(),
            executor: OperationExecutor::new(backend, role),
            broadcaster,
            sequence: SequenceTracker::new(),
            server: config.server.clone(),
            accept_client_writes: config.replication.accept_client_writes,
            masters: config.replication.masters.clone(),
        });

        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            "{} node {} listening on {}",
            role,
            config.node.id,
            listener.local_addr()?
        );
        if let Some(broadcaster) = &context.broadcaster {
            tracing::info!("Broadcasting to replicas: {:?}", broadcaster.replicas());
        }

        Ok(Self {
            listener,
            limits: Arc::new(Semaphore::new(config.server.max_connections)),
            context,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn role(&self) -> Role {
        self.context.executor.role()
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.context
    }

    /// Accept connections until [`Node::stop`] is called
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            let permit = tokio::select! {
                permit = self.limits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            };

            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            let context = self.context.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, peer_addr, context).await {
                                    tracing::warn!("Connection error from {}: {}", peer_addr, e);
                                }
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            // usually descriptor exhaustion; give handlers time to finish
                            tracing::error!("Accept error: {}", e);
                            drop(permit);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Node {} stopped accepting connections", self.context.node_id);
        Ok(())
    }

    /// Stop the accept loop; in-flight connections run to completion
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}
