//! Operation Executor Module
//!
//! Maps one operation to backend effects. Master and replicas run the same
//! logic; the role decides whether execution is serialised behind the
//! master's exclusive lock and whether DROP_DB is permitted.

pub mod statement;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use statement::Statement;

use crate::backend::Backend;
use crate::config::Role;
use crate::error::{Error, Result};
use crate::operation::{Command, Identifier, Operation, OperationKind, Row, Value};

/// Result of a successful execution
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Mutation or DDL completed; nothing to return
    Completed,
    /// Search result rows, possibly empty
    Rows(Vec<Row>),
}

/// A successful execution and, on the master, its broadcast sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub outcome: Outcome,
    pub sequence: Option<u64>,
}

/// Executes operations against a relational backend
pub struct OperationExecutor {
    backend: Arc<dyn Backend>,
    role: Role,
    /// Master only: held for the whole backend interaction, guards the
    /// last broadcast sequence handed out
    exec_lock: Option<Mutex<u64>>,
}

impl OperationExecutor {
    pub fn new(backend: Arc<dyn Backend>, role: Role) -> Self {
        let exec_lock = match role {
            Role::Master => Some(Mutex::new(0)),
            Role::Replica => None,
        };

        Self {
            backend,
            role,
            exec_lock,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Validate and execute one operation
    ///
    /// Invalid operations and DROP_DB on a replica fail before the backend
    /// is touched. Backend failures carry the operation kind.
    pub async fn execute(&self, operation: &Operation) -> Result<Outcome> {
        self.execute_sequenced(operation)
            .await
            .map(|executed| executed.outcome)
    }

    /// Execute and, on the master, reserve the operation's broadcast sequence
    ///
    /// The number is taken before the exclusive lock is released, so
    /// sequence order is execution order. Failed operations take none.
    pub async fn execute_sequenced(&self, operation: &Operation) -> Result<Executed> {
        if self.role == Role::Replica && operation.kind() == OperationKind::DropDatabase {
            return Err(Error::Authority(format!(
                "{} is only permitted on the master",
                OperationKind::DropDatabase
            )));
        }

        let command = operation.validate()?;

        match &self.exec_lock {
            Some(lock) => {
                let mut last_sequence = lock.lock().await;
                let outcome = self
                    .dispatch(&command)
                    .await
                    .map_err(|e| Error::during(command.kind(), e))?;
                *last_sequence += 1;
                Ok(Executed {
                    outcome,
                    sequence: Some(*last_sequence),
                })
            }
            None => {
                let outcome = self
                    .dispatch(&command)
                    .await
                    .map_err(|e| Error::during(command.kind(), e))?;
                Ok(Executed {
                    outcome,
                    sequence: None,
                })
            }
        }
    }

    async fn dispatch(&self, command: &Command) -> Result<Outcome> {
        match command {
            Command::CreateDatabase { database } => {
                self.backend.create_database(database).await?;
                tracing::info!("Created database {}", database);
            }
            Command::DropDatabase { database } => {
                self.backend.drop_database(database).await?;
                tracing::info!("Dropped database {} (if it existed)", database);
            }
            Command::CreateTable {
                database,
                table,
                columns,
            } => {
                self.run(&statement::create_table(database, table, columns))
                    .await?;
            }
            Command::Insert {
                database,
                table,
                values,
            } => {
                self.run(&statement::insert(database, table, values)).await?;
            }
            Command::Update {
                database,
                table,
                assignments,
                condition,
            } => {
                self.run(&statement::update(database, table, assignments, condition))
                    .await?;
            }
            Command::Delete {
                database,
                table,
                condition,
            } => {
                self.run(&statement::delete(database, table, condition))
                    .await?;
            }
            Command::Search {
                database,
                table,
                condition,
            } => {
                let rows = self.search(database, table, condition).await?;
                return Ok(Outcome::Rows(rows));
            }
        }

        Ok(Outcome::Completed)
    }

    async fn run(&self, statement: &Statement) -> Result<u64> {
        let affected = self.backend.execute(statement).await?;
        tracing::info!("Executed SQL: {} ({} rows affected)", statement, affected);
        tracing::debug!("  with values {:?}", statement.params);
        Ok(affected)
    }

    async fn search(
        &self,
        database: &Identifier,
        table: &Identifier,
        condition: &[(Identifier, Value)],
    ) -> Result<Vec<Row>> {
        let columns = self.resolve_columns(database, table).await?;
        let statement = statement::select(database, table, &columns, condition);

        tracing::info!("Executing SEARCH query: {}", statement);
        tracing::debug!("  with values {:?}", statement.params);

        let records = self.backend.query(&statement).await?;
        let rows = records
            .into_iter()
            .map(|values| project(&columns, values))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("SEARCH returned {} records", rows.len());
        Ok(rows)
    }

    /// Resolve a table's column list from the backend catalog
    ///
    /// Distinguishes a missing database, a missing table and a table with no
    /// columns. Re-derived on every call.
    async fn resolve_columns(
        &self,
        database: &Identifier,
        table: &Identifier,
    ) -> Result<Vec<Identifier>> {
        if !self.backend.database_exists(database).await? {
            return Err(Error::DatabaseNotFound(database.to_string()));
        }

        let columns = self.backend.list_columns(database, table).await?;
        if columns.is_empty() {
            if !self.backend.table_exists(database, table).await? {
                return Err(Error::TableNotFound {
                    database: database.to_string(),
                    table: table.to_string(),
                });
            }
            return Err(Error::NoColumns {
                database: database.to_string(),
                table: table.to_string(),
            });
        }

        tracing::debug!("Found columns for table {}: {:?}", table, columns);
        columns
            .iter()
            .map(|c| {
                Identifier::parse(c).map_err(|_| {
                    Error::Backend(format!(
                        "column '{}' of table {}.{} cannot be selected by name",
                        c, database, table
                    ))
                })
            })
            .collect()
    }
}

fn project(columns: &[Identifier], values: Vec<Value>) -> Result<Row> {
    if values.len() != columns.len() {
        return Err(Error::Backend(format!(
            "row has {} values for {} columns",
            values.len(),
            columns.len()
        )));
    }

    Ok(columns
        .iter()
        .map(|c| c.to_string())
        .zip(values)
        .collect())
}
