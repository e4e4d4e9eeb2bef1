//! DMS-backed replication operations.

use async_trait::async_trait;
use aws_sdk_databasemigration::types::{
    Filter, MigrationTypeValue, ReplicationEndpointTypeValue, StartReplicationTaskTypeValue,
};
use aws_sdk_databasemigration::Client;
use dbferry_cloud::{
    CloudError, EndpointSide, EndpointSpec, ReplicationApi, ReplicationInstanceSpec,
    ReplicationTaskSpec, Result,
};
use tracing::debug;

pub struct DmsService {
    client: Client,
}

impl DmsService {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

fn filter(name: &str, value: &str) -> Result<Filter> {
    Filter::builder()
        .name(name)
        .values(value)
        .build()
        .map_err(|e| CloudError::api("Filter", e))
}

fn endpoint_type(side: EndpointSide) -> ReplicationEndpointTypeValue {
    match side {
        EndpointSide::Source => ReplicationEndpointTypeValue::Source,
        EndpointSide::Target => ReplicationEndpointTypeValue::Target,
    }
}

#[async_trait]
impl ReplicationApi for DmsService {
    async fn create_subnet_group(
        &self,
        name: &str,
        description: &str,
        subnet_ids: &[String],
    ) -> Result<()> {
        let mut req = self
            .client
            .create_replication_subnet_group()
            .replication_subnet_group_identifier(name)
            .replication_subnet_group_description(description);
        for subnet_id in subnet_ids {
            req = req.subnet_ids(subnet_id);
        }
        req.send()
            .await
            .map_err(|e| CloudError::api("CreateReplicationSubnetGroup", e.into_service_error()))?;
        Ok(())
    }

    async fn create_replication_instance(&self, spec: &ReplicationInstanceSpec) -> Result<String> {
        let mut req = self
            .client
            .create_replication_instance()
            .replication_instance_identifier(&spec.identifier)
            .replication_instance_class(&spec.instance_class)
            .allocated_storage(spec.allocated_storage)
            .engine_version(&spec.engine_version)
            .publicly_accessible(spec.publicly_accessible)
            .replication_subnet_group_identifier(&spec.subnet_group);
        for group_id in &spec.security_group_ids {
            req = req.vpc_security_group_ids(group_id);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CloudError::api("CreateReplicationInstance", e.into_service_error()))?;
        let arn = resp
            .replication_instance()
            .and_then(|i| i.replication_instance_arn())
            .ok_or_else(|| {
                CloudError::InvalidResponse("CreateReplicationInstance returned no ARN".into())
            })?;
        debug!(identifier = %spec.identifier, "created replication instance");
        Ok(arn.to_string())
    }

    async fn replication_instance_status(&self, identifier: &str) -> Result<String> {
        let resp = self
            .client
            .describe_replication_instances()
            .filters(filter("replication-instance-id", identifier)?)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeReplicationInstances", e.into_service_error()))?;
        let status = resp
            .replication_instances()
            .first()
            .and_then(|i| i.replication_instance_status())
            .ok_or_else(|| CloudError::NotFound(format!("replication instance {identifier}")))?;
        Ok(status.to_string())
    }

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<String> {
        let resp = self
            .client
            .create_endpoint()
            .endpoint_identifier(&spec.identifier)
            .endpoint_type(endpoint_type(spec.side))
            .engine_name(&spec.engine)
            .server_name(&spec.server)
            .port(spec.port)
            .username(&spec.username)
            .password(&spec.password)
            .database_name(&spec.database)
            .extra_connection_attributes(&spec.extra_connection_attributes)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateEndpoint", e.into_service_error()))?;
        let arn = resp
            .endpoint()
            .and_then(|e| e.endpoint_arn())
            .ok_or_else(|| CloudError::InvalidResponse("CreateEndpoint returned no ARN".into()))?;
        Ok(arn.to_string())
    }

    async fn test_connection(&self, instance_arn: &str, endpoint_arn: &str) -> Result<()> {
        self.client
            .test_connection()
            .replication_instance_arn(instance_arn)
            .endpoint_arn(endpoint_arn)
            .send()
            .await
            .map_err(|e| CloudError::api("TestConnection", e.into_service_error()))?;
        Ok(())
    }

    async fn connection_status(&self, instance_arn: &str, endpoint_arn: &str) -> Result<String> {
        let resp = self
            .client
            .describe_connections()
            .filters(filter("endpoint-arn", endpoint_arn)?)
            .filters(filter("replication-instance-arn", instance_arn)?)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeConnections", e.into_service_error()))?;
        let status = resp
            .connections()
            .first()
            .and_then(|c| c.status())
            .ok_or_else(|| CloudError::NotFound(format!("connection for {endpoint_arn}")))?;
        Ok(status.to_string())
    }

    async fn create_replication_task(&self, spec: &ReplicationTaskSpec) -> Result<String> {
        let resp = self
            .client
            .create_replication_task()
            .replication_task_identifier(&spec.identifier)
            .source_endpoint_arn(&spec.source_endpoint_arn)
            .target_endpoint_arn(&spec.target_endpoint_arn)
            .replication_instance_arn(&spec.replication_instance_arn)
            .migration_type(MigrationTypeValue::from(spec.migration_type.as_str()))
            .table_mappings(&spec.table_mappings)
            .replication_task_settings(&spec.task_settings)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateReplicationTask", e.into_service_error()))?;
        let arn = resp
            .replication_task()
            .and_then(|t| t.replication_task_arn())
            .ok_or_else(|| {
                CloudError::InvalidResponse("CreateReplicationTask returned no ARN".into())
            })?;
        Ok(arn.to_string())
    }

    async fn start_replication_task(&self, task_arn: &str) -> Result<()> {
        self.client
            .start_replication_task()
            .replication_task_arn(task_arn)
            .start_replication_task_type(StartReplicationTaskTypeValue::StartReplication)
            .send()
            .await
            .map_err(|e| CloudError::api("StartReplicationTask", e.into_service_error()))?;
        debug!(%task_arn, "started replication task");
        Ok(())
    }

    async fn replication_task_status(&self, task_arn: &str) -> Result<String> {
        let resp = self
            .client
            .describe_replication_tasks()
            .filters(filter("replication-task-arn", task_arn)?)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeReplicationTasks", e.into_service_error()))?;
        let status = resp
            .replication_tasks()
            .first()
            .and_then(|t| t.status())
            .ok_or_else(|| CloudError::NotFound(format!("replication task {task_arn}")))?;
        Ok(status.to_string())
    }
}
