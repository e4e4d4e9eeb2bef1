//! Provider trait surface.
//!
//! Each trait covers one provisioning concern. The methods are deliberately
//! fine-grained: a provisioner composes them into a step, and the fakes used
//! in tests record them call by call.

use crate::error::Result;
use async_trait::async_trait;

/// One ingress rule on a security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    pub cidr: String,
}

impl IngressRule {
    /// TCP rule over a single port.
    pub fn tcp(port: i32, cidr: impl Into<String>) -> Self {
        Self {
            protocol: "tcp".into(),
            from_port: port,
            to_port: port,
            cidr: cidr.into(),
        }
    }

    /// SSH access restricted to the given CIDR.
    pub fn ssh(cidr: impl Into<String>) -> Self {
        Self::tcp(22, cidr)
    }
}

/// Security group listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Parameters for launching a compute instance.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub security_group_ids: Vec<String>,
    /// Startup script, passed verbatim; the provider encodes it as needed.
    pub user_data: Option<String>,
}

/// Parameters for creating a managed database instance.
#[derive(Debug, Clone)]
pub struct DbInstanceSpec {
    pub identifier: String,
    pub db_name: String,
    pub instance_class: String,
    pub engine: String,
    pub engine_version: String,
    pub allocated_storage: i32,
    pub master_username: String,
    pub master_password: String,
    pub port: i32,
    pub multi_az: bool,
    pub license_model: String,
    pub iops: i32,
    pub publicly_accessible: bool,
    pub storage_type: String,
    pub security_groups: Vec<String>,
}

/// Parameters for creating a replication instance.
#[derive(Debug, Clone)]
pub struct ReplicationInstanceSpec {
    pub identifier: String,
    pub instance_class: String,
    pub allocated_storage: i32,
    pub engine_version: String,
    pub publicly_accessible: bool,
    pub subnet_group: String,
    pub security_group_ids: Vec<String>,
}

/// Which end of the replication pipe an endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSide {
    Source,
    Target,
}

impl EndpointSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointSide::Source => "source",
            EndpointSide::Target => "target",
        }
    }
}

/// Parameters for creating a replication endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub identifier: String,
    pub side: EndpointSide,
    pub engine: String,
    pub server: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    pub database: String,
    pub extra_connection_attributes: String,
}

/// Parameters for creating a replication task.
#[derive(Debug, Clone)]
pub struct ReplicationTaskSpec {
    pub identifier: String,
    pub source_endpoint_arn: String,
    pub target_endpoint_arn: String,
    pub replication_instance_arn: String,
    pub migration_type: String,
    pub table_mappings: String,
    pub task_settings: String,
}

/// VPC-level networking operations.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Create a VPC with the given CIDR block; returns the VPC id.
    async fn create_vpc(&self, cidr: &str) -> Result<String>;

    /// Create a subnet in the VPC; returns the subnet id.
    async fn create_subnet(&self, vpc_id: &str, cidr: &str, az: Option<&str>) -> Result<String>;

    /// Create an internet gateway; returns its id.
    async fn create_internet_gateway(&self) -> Result<String>;

    async fn attach_internet_gateway(&self, igw_id: &str, vpc_id: &str) -> Result<()>;

    /// Create a route table in the VPC; returns its id.
    async fn create_route_table(&self, vpc_id: &str) -> Result<String>;

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> Result<()>;

    /// Add a route for the destination CIDR through the gateway.
    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        igw_id: &str,
    ) -> Result<()>;

    /// Id of the default security group created alongside the VPC.
    async fn default_security_group(&self, vpc_id: &str) -> Result<String>;

    /// Apply a `Name` tag to any taggable resource.
    async fn create_name_tag(&self, resource_id: &str, name: &str) -> Result<()>;
}

/// Compute (instance and key/security-group) operations.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Create a key pair; returns the private key material.
    async fn create_key_pair(&self, name: &str) -> Result<String>;

    async fn list_key_pairs(&self) -> Result<Vec<String>>;

    /// Create a security group; returns its id.
    async fn create_security_group(&self, name: &str, description: &str) -> Result<String>;

    async fn list_security_groups(&self) -> Result<Vec<SecurityGroupInfo>>;

    /// Resolve a security group name to an id, if one exists.
    async fn find_security_group_id(&self, name: &str) -> Result<Option<String>> {
        let groups = self.list_security_groups().await?;
        Ok(groups.into_iter().find(|g| g.name == name).map(|g| g.id))
    }

    /// Authorize one ingress rule. Returns `CloudError::DuplicateRule` when
    /// the rule already exists; callers decide whether that is fatal.
    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<()>;

    /// Launch a single instance; returns the instance id.
    async fn run_instance(&self, spec: &InstanceSpec) -> Result<String>;

    /// Combined instance status, e.g. `ok` once both system and instance
    /// checks pass, or `does-not-exist` when the provider has no record yet.
    async fn instance_status(&self, instance_id: &str) -> Result<String>;

    async fn instance_public_ip(&self, instance_id: &str) -> Result<Option<String>>;

    async fn instance_public_dns(&self, instance_id: &str) -> Result<Option<String>>;

    /// Description of the image the instance was launched from, used to
    /// pick the login user for SSH.
    async fn instance_image_description(&self, instance_id: &str) -> Result<String>;

    async fn create_name_tag(&self, resource_id: &str, name: &str) -> Result<()>;
}

/// Managed database operations.
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    /// Create a database instance; returns its identifier.
    async fn create_db_instance(&self, spec: &DbInstanceSpec) -> Result<String>;

    async fn db_instance_status(&self, identifier: &str) -> Result<String>;

    /// `host:port` of the instance endpoint once the instance is available.
    async fn db_endpoint(&self, identifier: &str) -> Result<(String, i32)>;
}

/// Replication (DMS-style) operations.
#[async_trait]
pub trait ReplicationApi: Send + Sync {
    async fn create_subnet_group(
        &self,
        name: &str,
        description: &str,
        subnet_ids: &[String],
    ) -> Result<()>;

    /// Create a replication instance; returns its ARN.
    async fn create_replication_instance(&self, spec: &ReplicationInstanceSpec) -> Result<String>;

    async fn replication_instance_status(&self, identifier: &str) -> Result<String>;

    /// Create a source or target endpoint; returns its ARN.
    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<String>;

    /// Kick off a connection test between an instance and an endpoint.
    async fn test_connection(&self, instance_arn: &str, endpoint_arn: &str) -> Result<()>;

    async fn connection_status(&self, instance_arn: &str, endpoint_arn: &str) -> Result<String>;

    /// Create a replication task; returns its ARN.
    async fn create_replication_task(&self, spec: &ReplicationTaskSpec) -> Result<String>;

    async fn start_replication_task(&self, task_arn: &str) -> Result<()>;

    async fn replication_task_status(&self, task_arn: &str) -> Result<String>;
}

/// Resolves the caller's public address, used to scope SSH ingress.
#[async_trait]
pub trait PublicIpProbe: Send + Sync {
    /// Public address of this machine as a /32 CIDR.
    async fn public_cidr(&self) -> Result<String>;
}
