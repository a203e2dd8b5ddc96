//! Warehouse provisioning: IAM role and Redshift cluster lifecycle.
//!
//! The ETL stages treat all of this as an external collaborator that
//! eventually yields a connectable `{host, port}` endpoint for an available
//! cluster. Nothing here polls for availability; the `status` command lets an
//! operator check before running the later stages.

mod aws;

pub use aws::AwsProvisioner;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("cluster '{identifier}' has no endpoint yet (status: {status})")]
    EndpointNotReady { identifier: String, status: String },

    #[error("cloud API call failed: {0}")]
    Api(anyhow::Error),
}

impl ProvisionError {
    pub(crate) fn api<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ProvisionError::Api(anyhow::Error::new(err))
    }
}

/// A connectable warehouse endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// The fields of a cluster description the pipeline cares about, extracted
/// from the control API's structured response by field name.
#[derive(Debug, Clone)]
pub struct ClusterDescription {
    pub identifier: String,
    pub status: String,
    pub node_type: String,
    pub db_name: String,
    pub master_username: String,
    pub endpoint: Option<Endpoint>,
    pub vpc_id: Option<String>,
}

impl ClusterDescription {
    /// The endpoint of an available cluster, or `EndpointNotReady` while the
    /// cluster is still creating.
    pub fn endpoint(&self) -> Result<&Endpoint, ProvisionError> {
        self.endpoint
            .as_ref()
            .ok_or_else(|| ProvisionError::EndpointNotReady {
                identifier: self.identifier.clone(),
                status: self.status.clone(),
            })
    }
}

/// Control-plane operations the pipeline consumes.
pub trait Provisioner {
    /// Create the warehouse access role (skipping if it already exists),
    /// attach the object-storage read policy and the warehouse policy, and
    /// return the role ARN.
    fn ensure_role(&self, role_name: &str) -> Result<String, ProvisionError>;

    /// Look up the ARN of an existing role.
    fn role_arn(&self, role_name: &str) -> Result<String, ProvisionError>;

    /// Create the cluster (skipping if it already exists). Returns without
    /// waiting for the cluster to become available.
    fn create_cluster(
        &self,
        cluster: &crate::config::ClusterSettings,
        role_arn: &str,
    ) -> Result<(), ProvisionError>;

    fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescription, ProvisionError>;

    /// Delete the cluster without a final snapshot. Deleting an absent
    /// cluster is a no-op.
    fn delete_cluster(&self, identifier: &str) -> Result<(), ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(endpoint: Option<Endpoint>, status: &str) -> ClusterDescription {
        ClusterDescription {
            identifier: "crescendo-dwh".to_string(),
            status: status.to_string(),
            node_type: "dc2.large".to_string(),
            db_name: "songplays".to_string(),
            master_username: "dwh_admin".to_string(),
            endpoint,
            vpc_id: None,
        }
    }

    #[test]
    fn available_cluster_yields_endpoint() {
        let desc = description(
            Some(Endpoint {
                host: "crescendo-dwh.abc.us-west-2.redshift.amazonaws.com".to_string(),
                port: 5439,
            }),
            "available",
        );
        let endpoint = desc.endpoint().unwrap();
        assert_eq!(endpoint.port, 5439);
    }

    #[test]
    fn creating_cluster_reports_not_ready() {
        let desc = description(None, "creating");
        let err = desc.endpoint().unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::EndpointNotReady { ref status, .. } if status == "creating"
        ));
    }
}
