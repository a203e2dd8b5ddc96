//! Full schema rebuild: drop everything, then create everything.
//!
//! Drops are `IF EXISTS` and creates are `IF NOT EXISTS`, so both halves are
//! individually re-runnable. Existing data is destroyed on every rebuild;
//! the pipeline has no incremental mode.

use tracing::info;

use super::{execute_batch, Statement, StatementReport};
use crate::schema::{Dialect, ALL_TABLES};
use crate::warehouse::{Warehouse, WarehouseError};

pub fn drop_statements() -> Vec<Statement> {
    ALL_TABLES
        .iter()
        .map(|table| Statement {
            label: table.name,
            sql: table.drop_sql(),
        })
        .collect()
}

pub fn create_statements(dialect: Dialect) -> Vec<Statement> {
    ALL_TABLES
        .iter()
        .map(|table| Statement {
            label: table.name,
            sql: table.create_sql(dialect),
        })
        .collect()
}

pub fn drop_all(warehouse: &mut dyn Warehouse) -> Result<Vec<StatementReport>, WarehouseError> {
    info!("dropping all tables");
    execute_batch(warehouse, &drop_statements())
}

pub fn create_all(warehouse: &mut dyn Warehouse) -> Result<Vec<StatementReport>, WarehouseError> {
    info!("creating all tables");
    let statements = create_statements(warehouse.dialect());
    execute_batch(warehouse, &statements)
}

/// Drop and recreate the whole schema, the entry point of every pipeline run.
pub fn recreate_all(warehouse: &mut dyn Warehouse) -> Result<(), WarehouseError> {
    drop_all(warehouse)?;
    create_all(warehouse)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::SqliteWarehouse;

    fn table_names(warehouse: &mut SqliteWarehouse) -> Vec<String> {
        let conn = warehouse.connection();
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        names
    }

    #[test]
    fn create_twice_is_a_no_op() {
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        create_all(&mut warehouse).unwrap();
        let first = table_names(&mut warehouse);
        create_all(&mut warehouse).unwrap();
        assert_eq!(first, table_names(&mut warehouse));
        assert_eq!(first.len(), ALL_TABLES.len());
    }

    #[test]
    fn drop_twice_raises_no_error_and_leaves_nothing() {
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        create_all(&mut warehouse).unwrap();
        drop_all(&mut warehouse).unwrap();
        drop_all(&mut warehouse).unwrap();
        assert!(table_names(&mut warehouse).is_empty());
    }

    #[test]
    fn recreate_discards_existing_data() {
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        create_all(&mut warehouse).unwrap();
        warehouse
            .execute(
                "seed",
                "INSERT INTO users (user_id, first_name, last_name, gender, level) \
                 VALUES (1, 'Lily', 'Koch', 'F', 'paid')",
            )
            .unwrap();
        recreate_all(&mut warehouse).unwrap();
        let count: i64 = warehouse
            .connection()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
