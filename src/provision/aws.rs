//! AWS implementation of the provisioner.
//!
//! The SDK is async; calls run on a private current-thread runtime so the
//! rest of the pipeline stays synchronous.

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_iam::config::Credentials;
use tracing::{info, warn};

use super::{ClusterDescription, Endpoint, Provisioner, ProvisionError};
use crate::config::{AwsSettings, ClusterSettings};

/// Trust policy allowing Redshift to assume the access role.
const ASSUME_ROLE_POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Action":"sts:AssumeRole","Effect":"Allow","Principal":{"Service":"redshift.amazonaws.com"}}]}"#;

const ATTACHED_POLICY_ARNS: &[&str] = &[
    "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess",
    "arn:aws:iam::aws:policy/AmazonRedshiftFullAccess",
];

pub struct AwsProvisioner {
    runtime: tokio::runtime::Runtime,
    iam: aws_sdk_iam::Client,
    redshift: aws_sdk_redshift::Client,
}

impl AwsProvisioner {
    pub fn new(aws: &AwsSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start runtime for AWS clients")?;
        let credentials = Credentials::new(
            aws.key.clone(),
            aws.secret.clone(),
            None,
            None,
            "crescendo-config",
        );
        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(aws.region.clone()))
                .credentials_provider(credentials)
                .load(),
        );
        Ok(Self {
            iam: aws_sdk_iam::Client::new(&sdk_config),
            redshift: aws_sdk_redshift::Client::new(&sdk_config),
            runtime,
        })
    }
}

impl Provisioner for AwsProvisioner {
    fn ensure_role(&self, role_name: &str) -> Result<String, ProvisionError> {
        let created = self.runtime.block_on(
            self.iam
                .create_role()
                .path("/")
                .role_name(role_name)
                .description("Allows Redshift clusters to call AWS services on your behalf.")
                .assume_role_policy_document(ASSUME_ROLE_POLICY)
                .send(),
        );
        match created {
            Ok(_) => info!(role = role_name, "created IAM role"),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_entity_already_exists_exception())
                    .unwrap_or(false) =>
            {
                warn!(role = role_name, "IAM role already exists, skipping")
            }
            Err(err) => return Err(ProvisionError::api(err)),
        }

        // Attaching an already-attached managed policy is a no-op on the API
        // side, so no already-exists handling is needed here.
        for policy_arn in ATTACHED_POLICY_ARNS {
            self.runtime
                .block_on(
                    self.iam
                        .attach_role_policy()
                        .role_name(role_name)
                        .policy_arn(*policy_arn)
                        .send(),
                )
                .map_err(ProvisionError::api)?;
            info!(role = role_name, policy = policy_arn, "attached policy");
        }

        self.role_arn(role_name)
    }

    fn role_arn(&self, role_name: &str) -> Result<String, ProvisionError> {
        let output = self
            .runtime
            .block_on(self.iam.get_role().role_name(role_name).send())
            .map_err(ProvisionError::api)?;
        let arn = output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| {
                ProvisionError::Api(anyhow::anyhow!("get-role returned no role for {role_name}"))
            })?;
        Ok(arn)
    }

    fn create_cluster(
        &self,
        cluster: &ClusterSettings,
        role_arn: &str,
    ) -> Result<(), ProvisionError> {
        let mut request = self
            .redshift
            .create_cluster()
            .cluster_type(cluster.cluster_type.as_str())
            .node_type(cluster.node_type.as_str())
            .db_name(cluster.db.as_str())
            .cluster_identifier(cluster.identifier.as_str())
            .master_username(cluster.user.as_str())
            .master_user_password(cluster.password.as_str())
            .iam_roles(role_arn.to_string());
        // NumberOfNodes must be omitted for single-node clusters.
        if cluster.cluster_type == "multi-node" {
            request = request.number_of_nodes(cluster.num_nodes);
        }

        match self.runtime.block_on(request.send()) {
            Ok(_) => {
                info!(
                    cluster = %cluster.identifier,
                    node_type = %cluster.node_type,
                    "cluster creation started"
                );
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_cluster_already_exists_fault())
                    .unwrap_or(false) =>
            {
                warn!(cluster = %cluster.identifier, "cluster already exists, skipping");
                Ok(())
            }
            Err(err) => Err(ProvisionError::api(err)),
        }
    }

    fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescription, ProvisionError> {
        let output = self
            .runtime
            .block_on(
                self.redshift
                    .describe_clusters()
                    .cluster_identifier(identifier)
                    .send(),
            )
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|e| e.is_cluster_not_found_fault())
                    .unwrap_or(false)
                {
                    ProvisionError::ClusterNotFound(identifier.to_string())
                } else {
                    ProvisionError::api(err)
                }
            })?;

        let cluster = output
            .clusters()
            .first()
            .ok_or_else(|| ProvisionError::ClusterNotFound(identifier.to_string()))?;

        let endpoint = cluster.endpoint().and_then(|ep| {
            let host = ep.address()?.to_string();
            let port = ep.port()? as u16;
            Some(Endpoint { host, port })
        });

        Ok(ClusterDescription {
            identifier: cluster
                .cluster_identifier()
                .unwrap_or(identifier)
                .to_string(),
            status: cluster.cluster_status().unwrap_or("unknown").to_string(),
            node_type: cluster.node_type().unwrap_or_default().to_string(),
            db_name: cluster.db_name().unwrap_or_default().to_string(),
            master_username: cluster.master_username().unwrap_or_default().to_string(),
            endpoint,
            vpc_id: cluster.vpc_id().map(|id| id.to_string()),
        })
    }

    fn delete_cluster(&self, identifier: &str) -> Result<(), ProvisionError> {
        let result = self.runtime.block_on(
            self.redshift
                .delete_cluster()
                .cluster_identifier(identifier)
                .skip_final_cluster_snapshot(true)
                .send(),
        );
        match result {
            Ok(_) => {
                info!(cluster = identifier, "cluster deletion started");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_cluster_not_found_fault())
                    .unwrap_or(false) =>
            {
                warn!(cluster = identifier, "cluster not found, nothing to delete");
                Ok(())
            }
            Err(err) => Err(ProvisionError::api(err)),
        }
    }
}
