//! Replication Broadcaster
//!
//! Runs on the master only. After an operation succeeds there, an exact
//! copy is pushed to every configured replica over a fresh connection,
//! one replica after another.

use crate::config::ReplicationConfig;
use crate::network::{NetworkClient, Request};
use crate::operation::Operation;

/// Per-replica delivery result of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sequence: u64,
    /// Replicas the frame was written to
    pub delivered: Vec<String>,
    /// Replicas that could not be reached, with the failure message
    pub failed: Vec<(String, String)>,
}

/// Fire-and-forget fan-out to a static replica list
pub struct Broadcaster {
    replicas: Vec<String>,
    client: NetworkClient,
}

impl Broadcaster {
    /// Create a broadcaster for the configured replica addresses
    pub fn new(config: &ReplicationConfig) -> Self {
        Self {
            replicas: config.replicas.clone(),
            client: NetworkClient::new(config.connect_timeout(), config.write_timeout()),
        }
    }

    pub fn replicas(&self) -> &[String] {
        &self.replicas
    }

    /// Deliver the operation to each replica independently
    ///
    /// `sequence` is the number the executor reserved for this operation
    /// under the master lock. A failure is logged and the next replica is
    /// tried; nothing is retried and no failure reaches the caller as an
    /// error.
    pub async fn broadcast(&self, sequence: u64, operation: &Operation) -> BroadcastReport {
        let request = Request::Replicate {
            sequence,
            operation: operation.clone(),
        };

        let mut report = BroadcastReport {
            sequence,
            ..Default::default()
        };

        for replica in &self.replicas {
            match self.client.send_oneway(replica, &request).await {
                Ok(()) => {
                    tracing::info!(
                        "Sent operation {} (seq {}) to replica {}",
                        operation.kind(),
                        sequence,
                        replica
                    );
                    report.delivered.push(replica.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to send operation {} (seq {}) to replica {}: {}",
                        operation.kind(),
                        sequence,
                        replica,
                        e
                    );
                    report.failed.push((replica.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
