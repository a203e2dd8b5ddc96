//! Configuration: a TOML file with `[aws]`, `[cluster]` and `[storage]`
//! sections, resolved into typed settings. Sections are optional at parse
//! time; a command that needs a missing section fails with a pointed error
//! instead of a deserialization trace.

mod file_config;

pub use file_config::{AwsConfig, ClusterConfig, FileConfig, StorageConfig};

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Credentials and region for the cloud control API.
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub key: String,
    pub secret: String,
    pub region: String,
}

/// Identity, sizing and database credentials of the warehouse cluster.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub identifier: String,
    pub cluster_type: String,
    pub node_type: String,
    pub num_nodes: i32,
    pub db: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub iam_role_name: String,
    /// Role ARN for COPY credentials. When absent it is resolved from the
    /// role name via the control API.
    pub iam_role_arn: Option<String>,
    /// Endpoint override. When absent the endpoint is looked up from the
    /// cluster description.
    pub host: Option<String>,
}

/// Object-storage locations of the raw data.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub region: String,
    pub log_data: String,
    pub log_jsonpath: String,
    pub song_data: String,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    aws: Option<AwsSettings>,
    cluster: Option<ClusterSettings>,
    storage: Option<StorageSettings>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = FileConfig::load(path)?;
        Self::resolve(file)
    }

    /// Turn the raw file sections into typed settings. Individual sections
    /// may be absent (the local mode needs none of them); fields within a
    /// present section are all required.
    pub fn resolve(file: FileConfig) -> Result<Self> {
        let aws = match file.aws {
            Some(section) => Some(AwsSettings {
                key: required("aws.key", section.key)?,
                secret: required("aws.secret", section.secret)?,
                region: section.region.unwrap_or_else(|| "us-west-2".to_string()),
            }),
            None => None,
        };

        let cluster = match file.cluster {
            Some(section) => {
                let cluster_type = section
                    .cluster_type
                    .unwrap_or_else(|| "multi-node".to_string());
                if cluster_type != "multi-node" && cluster_type != "single-node" {
                    bail!(
                        "cluster.cluster_type must be 'multi-node' or 'single-node', got '{}'",
                        cluster_type
                    );
                }
                Some(ClusterSettings {
                    identifier: required("cluster.identifier", section.identifier)?,
                    cluster_type,
                    node_type: required("cluster.node_type", section.node_type)?,
                    num_nodes: section.num_nodes.unwrap_or(4),
                    db: required("cluster.db", section.db)?,
                    user: required("cluster.user", section.user)?,
                    password: required("cluster.password", section.password)?,
                    port: section.port.unwrap_or(5439),
                    iam_role_name: required("cluster.iam_role_name", section.iam_role_name)?,
                    iam_role_arn: section.iam_role_arn,
                    host: section.host,
                })
            }
            None => None,
        };

        let storage = match file.storage {
            Some(section) => Some(StorageSettings {
                region: section.region.unwrap_or_else(|| "us-west-2".to_string()),
                log_data: required("storage.log_data", section.log_data)?,
                log_jsonpath: required("storage.log_jsonpath", section.log_jsonpath)?,
                song_data: required("storage.song_data", section.song_data)?,
            }),
            None => None,
        };

        Ok(Self {
            aws,
            cluster,
            storage,
        })
    }

    pub fn aws(&self) -> Result<&AwsSettings> {
        self.aws
            .as_ref()
            .context("missing [aws] section in config file")
    }

    pub fn cluster(&self) -> Result<&ClusterSettings> {
        self.cluster
            .as_ref()
            .context("missing [cluster] section in config file")
    }

    pub fn storage(&self) -> Result<&StorageSettings> {
        self.storage
            .as_ref()
            .context("missing [storage] section in config file")
    }
}

fn required(key: &str, value: Option<String>) -> Result<String> {
    value.with_context(|| format!("missing required config value '{}'", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> FileConfig {
        toml::from_str(
            r#"
            [aws]
            key = "AKIA_TEST"
            secret = "shhh"

            [cluster]
            identifier = "crescendo-dwh"
            node_type = "dc2.large"
            num_nodes = 4
            db = "songplays"
            user = "dwh_admin"
            password = "hunter2"
            iam_role_name = "crescendoDwhRole"

            [storage]
            log_data = "s3://udacity-dend/log_data"
            log_jsonpath = "s3://udacity-dend/log_json_path.json"
            song_data = "s3://udacity-dend/song_data"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_full_config_with_defaults() {
        let config = AppConfig::resolve(full_config()).unwrap();
        let cluster = config.cluster().unwrap();
        assert_eq!(cluster.identifier, "crescendo-dwh");
        assert_eq!(cluster.cluster_type, "multi-node");
        assert_eq!(cluster.port, 5439);
        assert!(cluster.host.is_none());
        assert_eq!(config.aws().unwrap().region, "us-west-2");
        assert_eq!(
            config.storage().unwrap().log_jsonpath,
            "s3://udacity-dend/log_json_path.json"
        );
    }

    #[test]
    fn missing_section_errors_only_when_accessed() {
        let config = AppConfig::resolve(FileConfig::default()).unwrap();
        assert!(config.aws().is_err());
        assert!(config.cluster().is_err());
        assert!(config.storage().is_err());
    }

    #[test]
    fn missing_required_value_is_fatal_at_resolve_time() {
        let file: FileConfig = toml::from_str(
            r#"
            [cluster]
            identifier = "crescendo-dwh"
            "#,
        )
        .unwrap();
        let err = AppConfig::resolve(file).unwrap_err();
        assert!(err.to_string().contains("cluster.node_type"));
    }

    #[test]
    fn rejects_unknown_cluster_type() {
        let file: FileConfig = toml::from_str(
            r#"
            [cluster]
            identifier = "c"
            cluster_type = "mega-node"
            node_type = "dc2.large"
            db = "d"
            user = "u"
            password = "p"
            iam_role_name = "r"
            "#,
        )
        .unwrap();
        assert!(AppConfig::resolve(file).is_err());
    }
}
