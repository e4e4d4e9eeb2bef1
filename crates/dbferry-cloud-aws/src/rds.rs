//! RDS-backed managed database operations.

use async_trait::async_trait;
use aws_sdk_rds::types::Filter;
use aws_sdk_rds::Client;
use dbferry_cloud::{CloudError, DatabaseApi, DbInstanceSpec, Result};
use tracing::debug;

pub struct RdsService {
    client: Client,
}

impl RdsService {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    async fn describe(
        &self,
        identifier: &str,
    ) -> Result<aws_sdk_rds::operation::describe_db_instances::DescribeDbInstancesOutput> {
        let filter = Filter::builder()
            .name("db-instance-id")
            .values(identifier)
            .build();
        self.client
            .describe_db_instances()
            .filters(filter)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeDBInstances", e.into_service_error()))
    }
}

#[async_trait]
impl DatabaseApi for RdsService {
    async fn create_db_instance(&self, spec: &DbInstanceSpec) -> Result<String> {
        let mut req = self
            .client
            .create_db_instance()
            .db_name(&spec.db_name)
            .db_instance_identifier(&spec.identifier)
            .allocated_storage(spec.allocated_storage)
            .db_instance_class(&spec.instance_class)
            .engine(&spec.engine)
            .engine_version(&spec.engine_version)
            .master_username(&spec.master_username)
            .master_user_password(&spec.master_password)
            .port(spec.port)
            .multi_az(spec.multi_az)
            .license_model(&spec.license_model)
            .iops(spec.iops)
            .publicly_accessible(spec.publicly_accessible)
            .storage_type(&spec.storage_type);
        for group in &spec.security_groups {
            req = req.db_security_groups(group);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CloudError::api("CreateDBInstance", e.into_service_error()))?;
        let id = resp
            .db_instance()
            .and_then(|db| db.db_instance_identifier())
            .ok_or_else(|| {
                CloudError::InvalidResponse("CreateDBInstance returned no identifier".into())
            })?;
        debug!(identifier = %id, engine = %spec.engine, "created db instance");
        Ok(id.to_string())
    }

    async fn db_instance_status(&self, identifier: &str) -> Result<String> {
        let resp = self.describe(identifier).await?;
        let status = resp
            .db_instances()
            .first()
            .and_then(|db| db.db_instance_status())
            .ok_or_else(|| CloudError::NotFound(format!("db instance {identifier}")))?;
        Ok(status.to_string())
    }

    async fn db_endpoint(&self, identifier: &str) -> Result<(String, i32)> {
        let resp = self.describe(identifier).await?;
        let endpoint = resp
            .db_instances()
            .first()
            .and_then(|db| db.endpoint())
            .ok_or_else(|| CloudError::NotFound(format!("endpoint of db instance {identifier}")))?;
        let address = endpoint.address().ok_or_else(|| {
            CloudError::InvalidResponse("db endpoint carries no address".into())
        })?;
        let port = endpoint.port().ok_or_else(|| {
            CloudError::InvalidResponse("db endpoint carries no port".into())
        })?;
        Ok((address.to_string(), port))
    }
}
