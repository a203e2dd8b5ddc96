//! Redshift backend over the PostgreSQL wire protocol.

use postgres::error::SqlState;
use postgres::{Client, NoTls};
use tracing::info;

use super::{ErrorClass, Warehouse, WarehouseError};
use crate::config::ClusterSettings;
use crate::schema::Dialect;

pub struct PostgresWarehouse {
    client: Client,
}

impl PostgresWarehouse {
    /// Connect to the cluster endpoint with the credentials from the
    /// configuration. Blocks until the connection is established.
    ///
    /// The connection is plaintext; clusters with `require_SSL` enabled
    /// in their parameter group are not supported.
    pub fn connect(
        host: &str,
        port: u16,
        cluster: &ClusterSettings,
    ) -> Result<Self, WarehouseError> {
        let mut config = postgres::Config::new();
        config
            .host(host)
            .port(port)
            .dbname(&cluster.db)
            .user(&cluster.user)
            .password(&cluster.password);
        let client = config
            .connect(NoTls)
            .map_err(|err| WarehouseError::Connect(Box::new(err)))?;
        info!(host, port, db = %cluster.db, "connected to warehouse");
        Ok(Self { client })
    }
}

fn classify(err: &postgres::Error) -> ErrorClass {
    match err.code() {
        Some(state)
            if *state == SqlState::DUPLICATE_TABLE || *state == SqlState::DUPLICATE_OBJECT =>
        {
            ErrorClass::AlreadyExists
        }
        // No SQLSTATE means the failure happened below the protocol layer
        // (connection reset, timeout), not in the statement itself.
        None => ErrorClass::Retryable,
        Some(_) => ErrorClass::Fatal,
    }
}

impl Warehouse for PostgresWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    fn execute(&mut self, label: &str, sql: &str) -> Result<u64, WarehouseError> {
        self.client
            .execute(sql, &[])
            .map_err(|err| WarehouseError::Statement {
                label: label.to_string(),
                class: classify(&err),
                source: Box::new(err),
            })
    }
}
