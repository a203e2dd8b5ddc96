//! Crescendo: provision an Amazon Redshift warehouse and ETL raw song-play
//! events from object storage into a star schema for analytics.
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod pipeline;
pub mod provision;
pub mod schema;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use provision::{AwsProvisioner, Provisioner};
pub use schema::Dialect;
pub use warehouse::{PostgresWarehouse, SqliteWarehouse, Warehouse};
