//! SQL execution backends.
//!
//! The pipeline talks to a [`Warehouse`]: one statement in flight at a time,
//! each committing independently. [`PostgresWarehouse`] speaks the PostgreSQL
//! wire protocol to a Redshift cluster; [`SqliteWarehouse`] backs the local
//! development mode and the test suite.

mod postgres;
mod sqlite;

pub use self::postgres::PostgresWarehouse;
pub use self::sqlite::SqliteWarehouse;

use crate::schema::Dialect;
use thiserror::Error;

/// How a failed external call should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The object the statement would create is already there. Safe to skip.
    AlreadyExists,
    /// Transient connection or network failure; re-running the stage is the
    /// expected remedy.
    Retryable,
    /// Credential, permission, or malformed-input failure. Abort.
    Fatal,
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("failed to connect to warehouse")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("statement '{label}' failed")]
    Statement {
        label: String,
        class: ErrorClass,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl WarehouseError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WarehouseError::Connect(_) => ErrorClass::Retryable,
            WarehouseError::Statement { class, .. } => *class,
        }
    }
}

/// A single sequential SQL connection. Every statement blocks until the
/// warehouse acknowledges it and commits on its own.
pub trait Warehouse {
    fn dialect(&self) -> Dialect;

    /// Execute one statement, returning the number of affected rows. `label`
    /// names the statement in logs and errors.
    fn execute(&mut self, label: &str, sql: &str) -> Result<u64, WarehouseError>;
}
