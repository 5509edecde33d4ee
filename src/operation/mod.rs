//! Operation Model
//!
//! An [`Operation`] is the only unit of work exchanged between clients,
//! the master and its replicas. It is decoded from the wire as-is and then
//! validated into a [`Command`], the typed form the executor dispatches on.

mod identifier;
mod value;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use identifier::{Identifier, MAX_IDENTIFIER_LEN};
pub use value::Value;

use crate::error::{Error, Result};

/// Column name to value mapping, iterated in sorted key order
pub type ValueMap = BTreeMap<String, Value>;

/// Result row projected onto the table's column names
pub type Row = BTreeMap<String, Value>;

/// Operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    #[serde(rename = "CREATE_DB")]
    CreateDatabase,
    CreateTable,
    Insert,
    Update,
    Delete,
    Search,
    #[serde(rename = "DROP_DB")]
    DropDatabase,
}

impl OperationKind {
    /// Wire tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateDatabase => "CREATE_DB",
            OperationKind::CreateTable => "CREATE_TABLE",
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Search => "SEARCH",
            OperationKind::DropDatabase => "DROP_DB",
        }
    }

    /// Whether this kind changes backend state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, OperationKind::Search)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client or inter-node request, exactly as decoded from the wire
///
/// Fields are private; an operation never changes after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    table: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    data: ValueMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    condition: ValueMap,
}

impl Operation {
    /// Create a bare operation of the given kind
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            database: None,
            table: None,
            data: ValueMap::new(),
            condition: ValueMap::new(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_data<K, V>(mut self, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn with_condition<K, V>(mut self, condition: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.condition = condition
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn create_database(database: impl Into<String>) -> Self {
        Self::new(OperationKind::CreateDatabase).with_database(database)
    }

    pub fn drop_database(database: impl Into<String>) -> Self {
        Self::new(OperationKind::DropDatabase).with_database(database)
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn data(&self) -> &ValueMap {
        &self.data
    }

    pub fn condition(&self) -> &ValueMap {
        &self.condition
    }

    /// Check the kind-specific preconditions and produce the typed command
    pub fn validate(&self) -> Result<Command> {
        let kind = self.kind;

        let database = self.require_database()?;

        let command = match kind {
            OperationKind::CreateDatabase => Command::CreateDatabase { database },
            OperationKind::DropDatabase => Command::DropDatabase { database },
            OperationKind::CreateTable => {
                let table = self.require_table()?;
                if self.data.is_empty() {
                    return Err(Error::Validation(format!(
                        "column definitions are required for {}",
                        kind
                    )));
                }
                let columns = self
                    .data
                    .iter()
                    .map(|(name, tag)| Ok((Identifier::parse(name)?, ColumnType::from_tag(tag))))
                    .collect::<Result<Vec<_>>>()?;
                Command::CreateTable {
                    database,
                    table,
                    columns,
                }
            }
            OperationKind::Insert => {
                let table = self.require_table()?;
                if self.data.is_empty() {
                    return Err(Error::Validation(format!("data is required for {}", kind)));
                }
                Command::Insert {
                    database,
                    table,
                    values: bind_list(&self.data)?,
                }
            }
            OperationKind::Update => {
                let table = self.require_table()?;
                if self.data.is_empty() || self.condition.is_empty() {
                    return Err(Error::Validation(format!(
                        "data and condition are required for {}",
                        kind
                    )));
                }
                Command::Update {
                    database,
                    table,
                    assignments: bind_list(&self.data)?,
                    condition: bind_list(&self.condition)?,
                }
            }
            OperationKind::Delete => {
                let table = self.require_table()?;
                if self.condition.is_empty() {
                    return Err(Error::Validation(format!(
                        "condition is required for {}",
                        kind
                    )));
                }
                Command::Delete {
                    database,
                    table,
                    condition: bind_list(&self.condition)?,
                }
            }
            OperationKind::Search => Command::Search {
                database,
                table: self.require_table()?,
                condition: bind_list(&self.condition)?,
            },
        };

        Ok(command)
    }

    fn require_database(&self) -> Result<Identifier> {
        match self.database.as_deref() {
            Some(name) if !name.is_empty() => Identifier::parse(name),
            _ => Err(Error::Validation(format!(
                "database name is required for {}",
                self.kind
            ))),
        }
    }

    fn require_table(&self) -> Result<Identifier> {
        match self.table.as_deref() {
            Some(name) if !name.is_empty() => Identifier::parse(name),
            _ => Err(Error::Validation(format!(
                "table name is required for {}",
                self.kind
            ))),
        }
    }
}

/// Validate column names of a map, keeping its sorted key order
fn bind_list(map: &ValueMap) -> Result<Vec<(Identifier, Value)>> {
    map.iter()
        .map(|(name, value)| Ok((Identifier::parse(name)?, value.clone())))
        .collect()
}

/// Declared column type for CREATE_TABLE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    /// `"int"` declares an integer column; every other tag declares text
    pub fn from_tag(tag: &Value) -> Self {
        match tag.as_text() {
            Some("int") => ColumnType::Integer,
            _ => ColumnType::Text,
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INT",
            ColumnType::Text => "VARCHAR(255)",
        }
    }
}

/// A validated operation
///
/// Column lists are in sorted column-name order; parameter binding follows
/// the same order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateDatabase {
        database: Identifier,
    },
    CreateTable {
        database: Identifier,
        table: Identifier,
        columns: Vec<(Identifier, ColumnType)>,
    },
    Insert {
        database: Identifier,
        table: Identifier,
        values: Vec<(Identifier, Value)>,
    },
    Update {
        database: Identifier,
        table: Identifier,
        assignments: Vec<(Identifier, Value)>,
        condition: Vec<(Identifier, Value)>,
    },
    Delete {
        database: Identifier,
        table: Identifier,
        condition: Vec<(Identifier, Value)>,
    },
    Search {
        database: Identifier,
        table: Identifier,
        condition: Vec<(Identifier, Value)>,
    },
    DropDatabase {
        database: Identifier,
    },
}

impl Command {
    pub fn kind(&self) -> OperationKind {
        match self {
            Command::CreateDatabase { .. } => OperationKind::CreateDatabase,
            Command::CreateTable { .. } => OperationKind::CreateTable,
            Command::Insert { .. } => OperationKind::Insert,
            Command::Update { .. } => OperationKind::Update,
            Command::Delete { .. } => OperationKind::Delete,
            Command::Search { .. } => OperationKind::Search,
            Command::DropDatabase { .. } => OperationKind::DropDatabase,
        }
    }

    pub fn database(&self) -> &Identifier {
        match self {
            Command::CreateDatabase { database }
            | Command::CreateTable { database, .. }
            | Command::Insert { database, .. }
            | Command::Update { database, .. }
            | Command::Delete { database, .. }
            | Command::Search { database, .. }
            | Command::DropDatabase { database } => database,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_validation(op: Operation, expected: &str) {
        match op.validate() {
            Err(Error::Validation(msg)) => assert_eq!(msg, expected),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_wire_format() {
        let json = r#"{"type":"INSERT","database":"d","table":"t","data":{"name":"Alice","id":1}}"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert_eq!(op.kind(), OperationKind::Insert);
        assert_eq!(op.database(), Some("d"));
        assert_eq!(op.table(), Some("t"));
        assert_eq!(op.data().get("id"), Some(&Value::Int(1)));
        assert!(op.condition().is_empty());
    }

    #[test]
    fn test_decode_rejects_unknown_kind_and_bad_values() {
        assert!(serde_json::from_str::<Operation>(r#"{"type":"TRUNCATE","database":"d"}"#).is_err());
        assert!(serde_json::from_str::<Operation>(
            r#"{"type":"INSERT","database":"d","table":"t","data":{"flag":true}}"#
        )
        .is_err());
    }

    #[test]
    fn test_missing_fields_per_kind() {
        assert_validation(
            Operation::new(OperationKind::CreateDatabase),
            "database name is required for CREATE_DB",
        );
        assert_validation(
            Operation::create_database(""),
            "database name is required for CREATE_DB",
        );
        assert_validation(
            Operation::new(OperationKind::DropDatabase),
            "database name is required for DROP_DB",
        );
        assert_validation(
            Operation::new(OperationKind::CreateTable).with_database("d"),
            "table name is required for CREATE_TABLE",
        );
        assert_validation(
            Operation::new(OperationKind::CreateTable)
                .with_database("d")
                .with_table("t"),
            "column definitions are required for CREATE_TABLE",
        );
        assert_validation(
            Operation::new(OperationKind::Insert).with_database("d").with_table("t"),
            "data is required for INSERT",
        );
        assert_validation(
            Operation::new(OperationKind::Insert)
                .with_table("t")
                .with_data([("a", 1)]),
            "database name is required for INSERT",
        );
        assert_validation(
            Operation::new(OperationKind::Update)
                .with_database("d")
                .with_table("t")
                .with_data([("a", 1)]),
            "data and condition are required for UPDATE",
        );
        assert_validation(
            Operation::new(OperationKind::Delete).with_database("d").with_table("t"),
            "condition is required for DELETE",
        );
        assert_validation(
            Operation::new(OperationKind::Search).with_database("d"),
            "table name is required for SEARCH",
        );
    }

    #[test]
    fn test_identifiers_checked_everywhere() {
        let op = Operation::new(OperationKind::Insert)
            .with_database("d")
            .with_table("t")
            .with_data([("name) VALUES (1); --", 1)]);
        assert!(matches!(op.validate(), Err(Error::InvalidIdentifier(_))));

        let op = Operation::new(OperationKind::Search)
            .with_database("d")
            .with_table("t; DROP TABLE t");
        assert!(matches!(op.validate(), Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn test_sorted_binding_order() {
        let op = Operation::new(OperationKind::Update)
            .with_database("d")
            .with_table("t")
            .with_data([("b", 2), ("a", 1)])
            .with_condition([("z", 9), ("y", 8)]);

        match op.validate().unwrap() {
            Command::Update {
                assignments,
                condition,
                ..
            } => {
                let names: Vec<_> = assignments.iter().map(|(c, _)| c.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
                let names: Vec<_> = condition.iter().map(|(c, _)| c.as_str()).collect();
                assert_eq!(names, vec!["y", "z"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_column_type_tags() {
        assert_eq!(ColumnType::from_tag(&Value::from("int")), ColumnType::Integer);
        assert_eq!(ColumnType::from_tag(&Value::from("string")), ColumnType::Text);
        assert_eq!(ColumnType::from_tag(&Value::from("INT")), ColumnType::Text);
        assert_eq!(ColumnType::from_tag(&Value::Int(3)), ColumnType::Text);
    }

    #[test]
    fn test_search_condition_optional() {
        let op = Operation::new(OperationKind::Search)
            .with_database("d")
            .with_table("t");
        let command = op.validate().unwrap();
        assert_eq!(command.kind(), OperationKind::Search);
        assert_eq!(command.database().as_str(), "d");
    }
}
