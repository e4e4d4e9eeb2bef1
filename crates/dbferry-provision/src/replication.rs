//! Replication (DMS) provisioning: instance, endpoints and the full-load
//! task.
//!
//! Every lifecycle transition is a distinct operation so the orchestrator
//! can log between them: subnet group → instance requested → available →
//! source endpoint → target endpoint → task created → task ready →
//! connections tested → task started → task running.

use crate::error::{ProvisionError, Result};
use dbferry_cloud::{
    EndpointSide, EndpointSpec, ReplicationApi, ReplicationInstanceSpec, ReplicationTaskSpec,
    ResourceHandle, ResourceKind,
};
use dbferry_core::{PollPolicy, ProvisioningContext, DEFAULT_REGION};
use tracing::info;

const DEFAULT_NAME: &str = "dbferry-dms";
const DEFAULT_INSTANCE_CLASS: &str = "dms.t2.medium";
const DEFAULT_ALLOCATED_STORAGE: i32 = 50;
const DEFAULT_ENGINE_VERSION: &str = "3.1.3";
const DEFAULT_PUBLIC: bool = true;
const DEFAULT_SUBNET_GROUP: &str = "dbferry-replication-subnet-group";
const DEFAULT_MIGRATION_TYPE: &str = "full-load";
const DEFAULT_TASK_NAME: &str = "dbferry-replication-task";
const SOURCE_ENDPOINT_NAME: &str = "dbferry-oracle-source";
const TARGET_ENDPOINT_NAME: &str = "dbferry-mariadb-target";

/// Connection attributes the source engine needs for log-based capture.
const ORACLE_CON_ARGS: &str = "addSupplementalLogging=Y;useLogminerReader=N";
/// Connection attributes for bulk-loading the target engine.
const MARIADB_CON_ARGS: &str =
    "targetDbType=SPECIFIC_DATABASE;initstmt=SET FOREIGN_KEY_CHECKS=0;parallelLoadThreads=1";

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub name: String,
    pub region: String,
    pub instance_class: String,
    pub allocated_storage: i32,
    pub engine_version: String,
    pub publicly_accessible: bool,
    pub subnet_group: String,
    pub migration_type: String,
    pub security_group_id: String,
    pub subnet_ids: Vec<String>,
    pub source: EndpointParams,
    pub target: EndpointParams,
    pub db_name: String,
}

/// Connection parameters for one side of the replication pipe.
#[derive(Debug, Clone)]
pub struct EndpointParams {
    pub server: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl ReplicationConfig {
    /// Resolve the configuration; `subnet` and `vpc_security_groups` must
    /// already have been appended by network provisioning.
    pub fn from_context(ctx: &ProvisioningContext) -> Result<Self> {
        let security_group_id = ctx
            .require_str("vpc_security_groups", "VPC Security Group")?
            .to_string();
        let subnet_ids = ctx.require_list("subnet", "Subnets")?.to_vec();
        let db_name = ctx.require_str("db_name", "Database name")?.to_string();
        let source = EndpointParams {
            server: ctx.require_str("source", "Source")?.to_string(),
            port: require_port(ctx, "s_port", "Source Port")?,
            username: ctx.require_str("s_user", "Source User")?.to_string(),
            password: ctx.require_str("s_password", "Source Password")?.to_string(),
            database: ctx.require_str("service_name", "Service Name")?.to_string(),
        };
        let target = EndpointParams {
            server: ctx.require_str("target", "Target")?.to_string(),
            port: require_port(ctx, "t_port", "Target Port")?,
            username: ctx.require_str("t_user", "Target User")?.to_string(),
            password: ctx.require_str("t_password", "Target Password")?.to_string(),
            database: db_name.clone(),
        };
        Ok(Self {
            name: ctx.get_str("dms_name").unwrap_or(DEFAULT_NAME).to_string(),
            region: ctx.get_str("region").unwrap_or(DEFAULT_REGION).to_string(),
            instance_class: ctx
                .get_str("dms_instance_class")
                .unwrap_or(DEFAULT_INSTANCE_CLASS)
                .to_string(),
            allocated_storage: DEFAULT_ALLOCATED_STORAGE,
            engine_version: ctx
                .get_str("dms_engine_version")
                .unwrap_or(DEFAULT_ENGINE_VERSION)
                .to_string(),
            publicly_accessible: DEFAULT_PUBLIC,
            subnet_group: ctx
                .get_str("subnet_group_name")
                .unwrap_or(DEFAULT_SUBNET_GROUP)
                .to_string(),
            migration_type: ctx
                .get_str("migration_type")
                .unwrap_or(DEFAULT_MIGRATION_TYPE)
                .to_string(),
            security_group_id,
            subnet_ids,
            source,
            target,
            db_name,
        })
    }
}

fn require_port(ctx: &ProvisioningContext, key: &str, what: &str) -> Result<i32> {
    crate::parse_number(ctx.require_str(key, what)?, what)
}

pub struct ReplicationProvisioner<'a> {
    api: &'a dyn ReplicationApi,
    config: ReplicationConfig,
}

impl<'a> ReplicationProvisioner<'a> {
    pub fn new(api: &'a dyn ReplicationApi, config: ReplicationConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub async fn create_subnet_group(&self) -> Result<()> {
        self.api
            .create_subnet_group(&self.config.subnet_group, "default", &self.config.subnet_ids)
            .await?;
        info!(group = %self.config.subnet_group, "created replication subnet group");
        Ok(())
    }

    /// Request the replication instance; appends `replication_instance_arn`.
    pub async fn create_instance(&self, ctx: &mut ProvisioningContext) -> Result<ResourceHandle> {
        let spec = ReplicationInstanceSpec {
            identifier: self.config.name.clone(),
            instance_class: self.config.instance_class.clone(),
            allocated_storage: self.config.allocated_storage,
            engine_version: self.config.engine_version.clone(),
            publicly_accessible: self.config.publicly_accessible,
            subnet_group: self.config.subnet_group.clone(),
            security_group_ids: vec![self.config.security_group_id.clone()],
        };
        let arn = self.api.create_replication_instance(&spec).await?;
        ctx.insert("replication_instance_arn", arn.as_str())?;
        info!(identifier = %self.config.name, "requested replication instance");
        Ok(ResourceHandle::new(ResourceKind::ReplicationInstance, &self.config.name).with_arn(arn))
    }

    pub async fn wait_instance_available(&self, policy: &PollPolicy) -> Result<()> {
        self.wait(policy, "replication instance", "available", || async move {
            self.api.replication_instance_status(&self.config.name).await
        })
        .await
    }

    /// Create the source endpoint; appends `source_endpoint_arn`.
    pub async fn create_source_endpoint(
        &self,
        ctx: &mut ProvisioningContext,
    ) -> Result<ResourceHandle> {
        let arn = self
            .create_endpoint(SOURCE_ENDPOINT_NAME, EndpointSide::Source, "oracle", ORACLE_CON_ARGS, &self.config.source)
            .await?;
        ctx.insert("source_endpoint_arn", arn.as_str())?;
        Ok(ResourceHandle::new(ResourceKind::Endpoint, SOURCE_ENDPOINT_NAME).with_arn(arn))
    }

    /// Create the target endpoint; appends `target_endpoint_arn`.
    pub async fn create_target_endpoint(
        &self,
        ctx: &mut ProvisioningContext,
    ) -> Result<ResourceHandle> {
        let arn = self
            .create_endpoint(TARGET_ENDPOINT_NAME, EndpointSide::Target, "mariadb", MARIADB_CON_ARGS, &self.config.target)
            .await?;
        ctx.insert("target_endpoint_arn", arn.as_str())?;
        Ok(ResourceHandle::new(ResourceKind::Endpoint, TARGET_ENDPOINT_NAME).with_arn(arn))
    }

    async fn create_endpoint(
        &self,
        identifier: &str,
        side: EndpointSide,
        engine: &str,
        extra_connection_attributes: &str,
        params: &EndpointParams,
    ) -> Result<String> {
        let spec = EndpointSpec {
            identifier: identifier.to_string(),
            side,
            engine: engine.to_string(),
            server: params.server.clone(),
            port: params.port,
            username: params.username.clone(),
            password: params.password.clone(),
            database: params.database.clone(),
            extra_connection_attributes: extra_connection_attributes.to_string(),
        };
        let arn = self.api.create_endpoint(&spec).await?;
        info!(%identifier, side = side.as_str(), %engine, "created endpoint");
        Ok(arn)
    }

    /// Create the replication task from the templated table-mapping and
    /// task-settings documents; appends `replication_task_arn`.
    pub async fn create_task(
        &self,
        ctx: &mut ProvisioningContext,
        table_mappings: String,
        task_settings: String,
    ) -> Result<ResourceHandle> {
        let source_arn = ctx
            .require_str("source_endpoint_arn", "Source Endpoint ARN")?
            .to_string();
        let target_arn = ctx
            .require_str("target_endpoint_arn", "Target Endpoint ARN")?
            .to_string();
        let instance_arn = ctx
            .require_str("replication_instance_arn", "Replication Instance ARN")?
            .to_string();
        let spec = ReplicationTaskSpec {
            identifier: DEFAULT_TASK_NAME.to_string(),
            source_endpoint_arn: source_arn,
            target_endpoint_arn: target_arn,
            replication_instance_arn: instance_arn,
            migration_type: self.config.migration_type.clone(),
            table_mappings,
            task_settings,
        };
        let arn = self.api.create_replication_task(&spec).await?;
        ctx.insert("replication_task_arn", arn.as_str())?;
        info!(identifier = DEFAULT_TASK_NAME, "created replication task");
        Ok(ResourceHandle::new(ResourceKind::ReplicationTask, DEFAULT_TASK_NAME).with_arn(arn))
    }

    pub async fn wait_task_ready(&self, ctx: &ProvisioningContext, policy: &PollPolicy) -> Result<()> {
        let arn = ctx.require_str("replication_task_arn", "Replication Task ARN")?;
        self.wait(policy, "replication task ready", "ready", || async move {
            self.api.replication_task_status(arn).await
        })
        .await
    }

    /// Kick off and await the connection test between the instance and both
    /// endpoints.
    pub async fn test_connections(&self, ctx: &ProvisioningContext, policy: &PollPolicy) -> Result<()> {
        let instance_arn = ctx.require_str("replication_instance_arn", "Replication Instance ARN")?;
        for key in ["source_endpoint_arn", "target_endpoint_arn"] {
            let endpoint_arn = ctx.require_str(key, "Endpoint ARN")?;
            self.api.test_connection(instance_arn, endpoint_arn).await?;
            self.wait(policy, "endpoint connection", "successful", || async move {
                self.api.connection_status(instance_arn, endpoint_arn).await
            })
            .await?;
        }
        Ok(())
    }

    pub async fn start_task(&self, ctx: &ProvisioningContext) -> Result<()> {
        let arn = ctx.require_str("replication_task_arn", "Replication Task ARN")?;
        self.api.start_replication_task(arn).await?;
        info!("started replication task");
        Ok(())
    }

    pub async fn wait_task_running(&self, ctx: &ProvisioningContext, policy: &PollPolicy) -> Result<()> {
        let arn = ctx.require_str("replication_task_arn", "Replication Task ARN")?;
        self.wait(policy, "replication task running", "running", || async move {
            self.api.replication_task_status(arn).await
        })
        .await
    }

    async fn wait<F, Fut>(
        &self,
        policy: &PollPolicy,
        what: &str,
        ready_status: &str,
        poll: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = dbferry_cloud::Result<String>>,
    {
        info!(%what, status = %ready_status, timeout = ?policy.timeout, "waiting");
        let ready =
            dbferry_core::await_ready(policy, |status: &String| status.as_str() == ready_status, poll)
                .await?;
        if !ready {
            return Err(ProvisionError::Timeout(what.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCloud;
    use dbferry_core::CoreError;
    use std::time::Duration;

    fn seeded_context() -> ProvisioningContext {
        let mut ctx = ProvisioningContext::new();
        for (key, value) in [
            ("db_name", "sales"),
            ("source", "oracle.example.com"),
            ("s_port", "1521"),
            ("s_user", "scott"),
            ("s_password", "tiger"),
            ("service_name", "ORCL"),
            ("target", "mariadb.example.com"),
            ("t_port", "3306"),
            ("t_user", "admin"),
            ("t_password", "secret"),
            ("vpc_security_groups", "sg-1"),
        ] {
            ctx.insert(key, value).unwrap();
        }
        ctx.insert("subnet", vec!["subnet-a".to_string(), "subnet-b".to_string()])
            .unwrap();
        ctx
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn missing_network_outputs_are_fatal() {
        let ctx = ProvisioningContext::new();
        let err = ReplicationConfig::from_context(&ctx).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Core(CoreError::MissingParameter(m)) if m == "VPC Security Group"
        ));
    }

    #[test]
    fn endpoint_params_resolved_per_side() {
        let config = ReplicationConfig::from_context(&seeded_context()).unwrap();
        assert_eq!(config.source.database, "ORCL");
        assert_eq!(config.source.port, 1521);
        assert_eq!(config.target.database, "sales");
        assert_eq!(config.target.port, 3306);
        assert_eq!(config.subnet_ids.len(), 2);
    }

    #[tokio::test]
    async fn full_lifecycle_appends_arns() {
        let cloud = FakeCloud::new();
        let mut ctx = seeded_context();
        let config = ReplicationConfig::from_context(&ctx).unwrap();
        let provisioner = ReplicationProvisioner::new(&cloud, config);
        let policy = fast_policy();

        provisioner.create_subnet_group().await.unwrap();
        provisioner.create_instance(&mut ctx).await.unwrap();
        provisioner.wait_instance_available(&policy).await.unwrap();
        provisioner.create_source_endpoint(&mut ctx).await.unwrap();
        provisioner.create_target_endpoint(&mut ctx).await.unwrap();
        provisioner
            .create_task(&mut ctx, "{}".to_string(), "{}".to_string())
            .await
            .unwrap();
        provisioner.wait_task_ready(&ctx, &policy).await.unwrap();
        provisioner.test_connections(&ctx, &policy).await.unwrap();
        provisioner.start_task(&ctx).await.unwrap();
        provisioner.wait_task_running(&ctx, &policy).await.unwrap();

        assert!(ctx.get_str("replication_instance_arn").is_some());
        assert!(ctx.get_str("source_endpoint_arn").is_some());
        assert!(ctx.get_str("target_endpoint_arn").is_some());
        assert!(ctx.get_str("replication_task_arn").is_some());
    }

    #[tokio::test]
    async fn task_requires_both_endpoint_arns() {
        let cloud = FakeCloud::new();
        let mut ctx = seeded_context();
        let config = ReplicationConfig::from_context(&ctx).unwrap();
        let provisioner = ReplicationProvisioner::new(&cloud, config);

        let err = provisioner
            .create_task(&mut ctx, "{}".to_string(), "{}".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Core(CoreError::MissingParameter(_))
        ));
    }
}
