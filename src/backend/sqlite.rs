//! SQLite Backend
//!
//! Embedded backend built on rusqlite. Every database is a schema attached
//! to one connection: a `<data_dir>/<name>.sqlite` file when a data
//! directory is configured, an in-memory schema otherwise. Access to the
//! connection is serialised through a mutex.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ToSql};
use tokio::sync::Mutex;

use super::Backend;
use crate::error::{Error, Result};
use crate::executor::Statement;
use crate::operation::{Identifier, Value};

/// Schemas SQLite reserves for itself
const RESERVED_SCHEMAS: [&str; 2] = ["main", "temp"];

const FILE_EXTENSION: &str = "sqlite";

/// SQLite backend
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    data_dir: Option<PathBuf>,
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

impl SqliteBackend {
    /// Open a backend whose databases live only in memory
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            data_dir: None,
        })
    }

    /// Open a file-backed backend, re-attaching databases left by a previous run
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let conn = Connection::open_in_memory()?;

        for entry in std::fs::read_dir(&data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Identifier::parse(stem) {
                Ok(name) if !RESERVED_SCHEMAS.contains(&name.as_str()) => {
                    attach(&conn, &path.to_string_lossy(), &name)?;
                    tracing::info!("Attached existing database {} from {:?}", name, path);
                }
                _ => tracing::warn!("Ignoring {:?}: not a valid database name", path),
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            data_dir: Some(data_dir),
        })
    }

    fn database_path(&self, database: &Identifier) -> Option<PathBuf> {
        self.data_dir
            .as_deref()
            .map(|dir| dir.join(format!("{}.{}", database, FILE_EXTENSION)))
    }
}

fn attach(conn: &Connection, location: &str, database: &Identifier) -> Result<()> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", database.quoted()),
        params![location],
    )?;
    Ok(())
}

fn attached(conn: &Connection, database: &Identifier) -> Result<bool> {
    if RESERVED_SCHEMAS.contains(&database.as_str()) {
        return Ok(false);
    }
    let mut stmt = conn.prepare("SELECT name FROM pragma_database_list")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    for name in names {
        if name? == database.as_str() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
        Ok(affected as u64)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Vec<Value>>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&statement.sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    async fn database_exists(&self, database: &Identifier) -> Result<bool> {
        let conn = self.conn.lock().await;
        attached(&conn, database)
    }

    async fn list_columns(&self, database: &Identifier, table: &Identifier) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "PRAGMA {}.table_info({})",
            database.quoted(),
            table.quoted()
        ))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>("name"))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    async fn table_exists(&self, database: &Identifier, table: &Identifier) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
                database.quoted()
            ),
            params![table.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn create_database(&self, database: &Identifier) -> Result<()> {
        let conn = self.conn.lock().await;
        if RESERVED_SCHEMAS.contains(&database.as_str()) || attached(&conn, database)? {
            return Err(Error::Backend(format!(
                "Can't create database '{}'; database exists",
                database
            )));
        }

        match self.database_path(database) {
            Some(path) => attach(&conn, &path.to_string_lossy(), database),
            None => attach(&conn, ":memory:", database),
        }
    }

    async fn drop_database(&self, database: &Identifier) -> Result<()> {
        let conn = self.conn.lock().await;
        if !attached(&conn, database)? {
            return Ok(());
        }

        conn.execute(&format!("DETACH DATABASE {}", database.quoted()), [])?;
        if let Some(path) = self.database_path(database) {
            remove_file_if_present(&path)?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let conn = self.conn.lock().await;
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(one == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    fn stmt(sql: &str, params: Vec<Value>) -> Statement {
        Statement {
            sql: sql.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_in_memory_catalog() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert!(backend.health_check().await.unwrap());
        assert!(!backend.database_exists(&id("d")).await.unwrap());
        assert!(!backend.database_exists(&id("main")).await.unwrap());

        backend.create_database(&id("d")).await.unwrap();
        assert!(backend.database_exists(&id("d")).await.unwrap());
        assert!(backend.create_database(&id("d")).await.is_err());

        backend
            .execute(&stmt("CREATE TABLE `d`.`t` (`id` INT, `name` VARCHAR(255))", vec![]))
            .await
            .unwrap();
        assert_eq!(
            backend.list_columns(&id("d"), &id("t")).await.unwrap(),
            vec!["id".to_string(), "name".to_string()]
        );
        assert!(backend.table_exists(&id("d"), &id("t")).await.unwrap());
        assert!(!backend.table_exists(&id("d"), &id("missing")).await.unwrap());
        assert!(backend.list_columns(&id("d"), &id("missing")).await.unwrap().is_empty());

        backend.drop_database(&id("d")).await.unwrap();
        assert!(!backend.database_exists(&id("d")).await.unwrap());
        // dropping again is a no-op
        backend.drop_database(&id("d")).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_and_read_values() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.create_database(&id("d")).await.unwrap();
        backend
            .execute(&stmt("CREATE TABLE `d`.`t` (`a` INT, `b` VARCHAR(255), `c` REAL)", vec![]))
            .await
            .unwrap();

        let affected = backend
            .execute(&stmt(
                "INSERT INTO `d`.`t` (`a`, `b`, `c`) VALUES (?, ?, ?)",
                vec![Value::Int(7), Value::from("seven"), Value::Real(7.5)],
            ))
            .await
            .unwrap();
        assert_eq!(affected, 1);
        backend
            .execute(&stmt(
                "INSERT INTO `d`.`t` (`a`, `b`, `c`) VALUES (?, ?, ?)",
                vec![Value::Int(8), Value::Null, Value::Null],
            ))
            .await
            .unwrap();

        let rows = backend
            .query(&stmt("SELECT `a`, `b`, `c` FROM `d`.`t` WHERE `a` = ?", vec![Value::Int(7)]))
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int(7), Value::from("seven"), Value::Real(7.5)]]);

        let rows = backend
            .query(&stmt("SELECT `b` FROM `d`.`t` WHERE `a` = ?", vec![Value::Int(8)]))
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Null]]);
    }

    #[tokio::test]
    async fn test_file_backed_databases_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = SqliteBackend::open(dir.path().to_path_buf()).unwrap();
            backend.create_database(&id("shop")).await.unwrap();
            backend
                .execute(&stmt("CREATE TABLE `shop`.`items` (`sku` INT)", vec![]))
                .await
                .unwrap();
            backend
                .execute(&stmt("INSERT INTO `shop`.`items` (`sku`) VALUES (?)", vec![Value::Int(42)]))
                .await
                .unwrap();
        }
        assert!(dir.path().join("shop.sqlite").exists());

        let backend = SqliteBackend::open(dir.path().to_path_buf()).unwrap();
        assert!(backend.database_exists(&id("shop")).await.unwrap());
        let rows = backend
            .query(&stmt("SELECT `sku` FROM `shop`.`items`", vec![]))
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int(42)]]);

        backend.drop_database(&id("shop")).await.unwrap();
        assert!(!dir.path().join("shop.sqlite").exists());
    }
}
