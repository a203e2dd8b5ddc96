//! Local SQLite backend, used for development runs and tests.

use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use super::{ErrorClass, Warehouse, WarehouseError};
use crate::schema::Dialect;

pub struct SqliteWarehouse {
    conn: Connection,
}

impl SqliteWarehouse {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, WarehouseError> {
        let conn = Connection::open(db_path.as_ref())
            .map_err(|err| WarehouseError::Connect(Box::new(err)))?;
        info!(path = %db_path.as_ref().display(), "opened local warehouse database");
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, WarehouseError> {
        let conn =
            Connection::open_in_memory().map_err(|err| WarehouseError::Connect(Box::new(err)))?;
        Ok(Self { conn })
    }

    /// Direct access for the local loader's parameterized inserts and for
    /// test assertions.
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn classify(err: &rusqlite::Error) -> ErrorClass {
    match err {
        // Duplicate DDL targets fail at prepare time and surface as
        // SqlInputError; SqliteFailure covers the runtime-reported case.
        rusqlite::Error::SqlInputError { msg, .. } if msg.contains("already exists") => {
            ErrorClass::AlreadyExists
        }
        rusqlite::Error::SqliteFailure(_, Some(message)) if message.contains("already exists") => {
            ErrorClass::AlreadyExists
        }
        _ => ErrorClass::Fatal,
    }
}

impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, label: &str, sql: &str) -> Result<u64, WarehouseError> {
        match self.conn.execute(sql, []) {
            Ok(rows) => Ok(rows as u64),
            Err(err) => Err(WarehouseError::Statement {
                label: label.to_string(),
                class: classify(&err),
                source: Box::new(err),
            }),
        }
    }
}
