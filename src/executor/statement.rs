//! Statement Construction
//!
//! Turns validated commands into parameterised SQL. Identifiers are already
//! validated and are backtick-quoted; every value is bound as a `?`
//! parameter, in the sorted column order the command carries.

use crate::operation::{ColumnType, Identifier, Value};

/// A SQL statement with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

fn qualified(database: &Identifier, table: &Identifier) -> String {
    format!("{}.{}", database.quoted(), table.quoted())
}

/// Equality-AND predicate; NULL conditions compare with IS NULL
fn predicate(condition: &[(Identifier, Value)], params: &mut Vec<Value>) -> String {
    condition
        .iter()
        .map(|(column, value)| {
            if value.is_null() {
                format!("{} IS NULL", column.quoted())
            } else {
                params.push(value.clone());
                format!("{} = ?", column.quoted())
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn create_table(
    database: &Identifier,
    table: &Identifier,
    columns: &[(Identifier, ColumnType)],
) -> Statement {
    let definitions: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", name.quoted(), ty.sql_type()))
        .collect();

    Statement::new(
        format!(
            "CREATE TABLE {} ({})",
            qualified(database, table),
            definitions.join(", ")
        ),
        Vec::new(),
    )
}

pub fn insert(database: &Identifier, table: &Identifier, values: &[(Identifier, Value)]) -> Statement {
    let columns: Vec<String> = values.iter().map(|(c, _)| c.quoted()).collect();
    let placeholders = vec!["?"; values.len()];

    Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified(database, table),
            columns.join(", "),
            placeholders.join(", ")
        ),
        values.iter().map(|(_, v)| v.clone()).collect(),
    )
}

pub fn update(
    database: &Identifier,
    table: &Identifier,
    assignments: &[(Identifier, Value)],
    condition: &[(Identifier, Value)],
) -> Statement {
    let mut params: Vec<Value> = Vec::with_capacity(assignments.len() + condition.len());
    let set: Vec<String> = assignments
        .iter()
        .map(|(column, value)| {
            params.push(value.clone());
            format!("{} = ?", column.quoted())
        })
        .collect();
    let filter = predicate(condition, &mut params);

    Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {}",
            qualified(database, table),
            set.join(", "),
            filter
        ),
        params,
    )
}

pub fn delete(database: &Identifier, table: &Identifier, condition: &[(Identifier, Value)]) -> Statement {
    let mut params = Vec::with_capacity(condition.len());
    let filter = predicate(condition, &mut params);

    Statement::new(
        format!("DELETE FROM {} WHERE {}", qualified(database, table), filter),
        params,
    )
}

/// SELECT of the resolved column list, optionally filtered
pub fn select(
    database: &Identifier,
    table: &Identifier,
    columns: &[Identifier],
    condition: &[(Identifier, Value)],
) -> Statement {
    let projection: Vec<String> = columns.iter().map(|c| c.quoted()).collect();
    let mut sql = format!(
        "SELECT {} FROM {}",
        projection.join(", "),
        qualified(database, table)
    );

    let mut params = Vec::with_capacity(condition.len());
    if !condition.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate(condition, &mut params));
    }

    Statement::new(sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    #[test]
    fn test_create_table() {
        let stmt = create_table(
            &id("d"),
            &id("t"),
            &[(id("id"), ColumnType::Integer), (id("name"), ColumnType::Text)],
        );
        assert_eq!(stmt.sql, "CREATE TABLE `d`.`t` (`id` INT, `name` VARCHAR(255))");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_insert_binds_in_given_order() {
        let stmt = insert(
            &id("d"),
            &id("t"),
            &[(id("a"), Value::Int(1)), (id("b"), Value::Int(2))],
        );
        assert_eq!(stmt.sql, "INSERT INTO `d`.`t` (`a`, `b`) VALUES (?, ?)");
        assert_eq!(stmt.params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_update_sets_before_condition() {
        let stmt = update(
            &id("d"),
            &id("t"),
            &[(id("name"), Value::from("Bob"))],
            &[(id("id"), Value::Int(1)), (id("org"), Value::from("x"))],
        );
        assert_eq!(
            stmt.sql,
            "UPDATE `d`.`t` SET `name` = ? WHERE `id` = ? AND `org` = ?"
        );
        assert_eq!(
            stmt.params,
            vec![Value::from("Bob"), Value::Int(1), Value::from("x")]
        );
    }

    #[test]
    fn test_null_condition() {
        let stmt = delete(
            &id("d"),
            &id("t"),
            &[(id("a"), Value::Null), (id("b"), Value::Int(3))],
        );
        assert_eq!(stmt.sql, "DELETE FROM `d`.`t` WHERE `a` IS NULL AND `b` = ?");
        assert_eq!(stmt.params, vec![Value::Int(3)]);
    }

    #[test]
    fn test_select_with_and_without_filter() {
        let columns = [id("id"), id("name")];
        let all = select(&id("d"), &id("t"), &columns, &[]);
        assert_eq!(all.sql, "SELECT `id`, `name` FROM `d`.`t`");
        assert!(all.params.is_empty());

        let filtered = select(&id("d"), &id("t"), &columns, &[(id("id"), Value::Int(1))]);
        assert_eq!(filtered.sql, "SELECT `id`, `name` FROM `d`.`t` WHERE `id` = ?");
        assert_eq!(filtered.params, vec![Value::Int(1)]);
    }
}
