//! Relational Backend Module
//!
//! The capability surface the executor depends on. The backend owns the
//! actual table data and its own concurrency discipline (a connection pool
//! for MariaDB, a single serialised connection for SQLite).

mod mariadb;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

pub use mariadb::MariaDbBackend;
pub use sqlite::SqliteBackend;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;
use crate::executor::Statement;
use crate::operation::{Identifier, Value};

/// Relational store capabilities
#[async_trait]
pub trait Backend: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &'static str;

    /// Execute a non-query statement, returning the number of affected rows
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    /// Execute a query, returning each row's values in projection order
    async fn query(&self, statement: &Statement) -> Result<Vec<Vec<Value>>>;

    /// Whether the catalog knows this database
    async fn database_exists(&self, database: &Identifier) -> Result<bool>;

    /// Column names of a table in ordinal order; empty when nothing is found
    async fn list_columns(&self, database: &Identifier, table: &Identifier) -> Result<Vec<String>>;

    /// Direct table existence check, independent of the column catalog
    async fn table_exists(&self, database: &Identifier, table: &Identifier) -> Result<bool>;

    async fn create_database(&self, database: &Identifier) -> Result<()>;

    /// Drop a database; a missing database is not an error
    async fn drop_database(&self, database: &Identifier) -> Result<()>;

    async fn health_check(&self) -> Result<bool>;

    async fn close(&self) {}
}

/// Connect to the configured backend
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn Backend>> {
    match config.kind {
        BackendKind::MariaDb => Ok(Arc::new(MariaDbBackend::connect(config).await?)),
        BackendKind::Sqlite => {
            let backend = match &config.data_dir {
                Some(dir) => SqliteBackend::open(dir.clone())?,
                None => SqliteBackend::open_in_memory()?,
            };
            Ok(Arc::new(backend))
        }
    }
}
