//! Handles for created cloud resources.

use serde::{Deserialize, Serialize};

/// Logical kind of a created resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    InternetGateway,
    RouteTable,
    SecurityGroup,
    KeyPair,
    Instance,
    DbInstance,
    ReplicationInstance,
    Endpoint,
    ReplicationTask,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::KeyPair => "key-pair",
            ResourceKind::Instance => "instance",
            ResourceKind::DbInstance => "db-instance",
            ResourceKind::ReplicationInstance => "replication-instance",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::ReplicationTask => "replication-task",
        };
        write!(f, "{name}")
    }
}

/// Identifies a created cloud resource. Owned by the step that created it;
/// later steps reference it through the provisioning context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: String,
    pub arn: Option<String>,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            arn: None,
        }
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = Some(arn.into());
        self
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
