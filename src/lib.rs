//! Replidb - Master/Replica Relational Data Coordinator
//!
//! Clients send structured data operations (create/drop database, create
//! table, insert, update, delete, search) to a node over TCP. The node turns
//! them into parameterised SQL against a relational backend and replies.
//!
//! # Architecture
//!
//! One master executes client operations one at a time and, after each
//! success, pushes a copy to every configured replica. Replicas execute what
//! they receive concurrently. Delivery is fire-and-forget: there is no
//! acknowledgment, retry or catch-up.
//!
//! # Features
//!
//! - Typed operation model with identifier validation
//! - MariaDB (sqlx) and embedded SQLite (rusqlite) backends
//! - Length-prefixed, checksummed JSON frames
//! - Sequence-numbered broadcasts with gap detection on replicas

pub mod config;
pub mod error;
pub mod operation;
pub mod backend;
pub mod executor;
pub mod network;
pub mod replication;
pub mod node;

pub use config::ReplidbConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ReplidbConfig, Role};
    pub use crate::error::{Error, ErrorClass, Result};
    pub use crate::executor::{Executed, OperationExecutor, Outcome};
    pub use crate::network::{NetworkClient, Reply, Request};
    pub use crate::node::Node;
    pub use crate::operation::{Operation, OperationKind, Value};
}
