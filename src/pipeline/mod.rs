//! The ETL stages: schema rebuild, staging load, star-schema transform.
//!
//! Every stage is a sequential batch of independent statements. A stage never
//! starts before the previous one's statements have all committed, and each
//! statement commits on its own, so a mid-batch failure leaves a partially
//! applied stage that is repaired by re-running it.

pub mod loader;
pub mod schema_manager;
pub mod transformer;

use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::warehouse::{ErrorClass, Warehouse, WarehouseError};

/// One SQL statement plus the label it is reported under.
#[derive(Debug, Clone)]
pub struct Statement {
    pub label: &'static str,
    pub sql: String,
}

/// Structured result of one executed statement.
#[derive(Debug, Clone)]
pub struct StatementReport {
    pub label: &'static str,
    pub rows: u64,
    pub elapsed: Duration,
    /// True when the statement was skipped because its target already
    /// existed.
    pub skipped: bool,
}

/// Run a batch of statements in order. Already-exists failures are logged
/// and skipped; anything else aborts the batch.
pub fn execute_batch(
    warehouse: &mut dyn Warehouse,
    statements: &[Statement],
) -> Result<Vec<StatementReport>, WarehouseError> {
    let mut reports = Vec::with_capacity(statements.len());
    for statement in statements {
        let started = Instant::now();
        match warehouse.execute(statement.label, &statement.sql) {
            Ok(rows) => {
                let elapsed = started.elapsed();
                info!(
                    statement = statement.label,
                    rows,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "statement committed"
                );
                reports.push(StatementReport {
                    label: statement.label,
                    rows,
                    elapsed,
                    skipped: false,
                });
            }
            Err(err) if err.class() == ErrorClass::AlreadyExists => {
                warn!(statement = statement.label, "target already exists, skipping");
                reports.push(StatementReport {
                    label: statement.label,
                    rows: 0,
                    elapsed: started.elapsed(),
                    skipped: true,
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::SqliteWarehouse;

    fn statement(label: &'static str, sql: &str) -> Statement {
        Statement {
            label,
            sql: sql.to_string(),
        }
    }

    #[test]
    fn batch_runs_in_order_and_reports_rows() {
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        let reports = execute_batch(
            &mut warehouse,
            &[
                statement("create t", "CREATE TABLE t (x INTEGER)"),
                statement("fill t", "INSERT INTO t (x) VALUES (1), (2)"),
            ],
        )
        .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].rows, 2);
        assert!(!reports[1].skipped);
    }

    #[test]
    fn already_exists_is_skipped_not_fatal() {
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        let reports = execute_batch(
            &mut warehouse,
            &[
                statement("create t", "CREATE TABLE t (x INTEGER)"),
                statement("create t again", "CREATE TABLE t (x INTEGER)"),
            ],
        )
        .unwrap();
        assert!(reports[1].skipped);
    }

    #[test]
    fn fatal_statement_aborts_the_batch() {
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        let result = execute_batch(
            &mut warehouse,
            &[
                statement("bad", "SYNTAX ERROR"),
                statement("never runs", "CREATE TABLE t (x INTEGER)"),
            ],
        );
        assert!(result.is_err());
        // The second statement never ran.
        let err = warehouse
            .execute("check", "INSERT INTO t (x) VALUES (1)")
            .unwrap_err();
        assert_eq!(err.class(), crate::warehouse::ErrorClass::Fatal);
    }
}
