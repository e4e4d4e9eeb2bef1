//! Top-level migration sequencer.
//!
//! Phases, in order: ensure a migration target exists (provisioning RDS when
//! none is configured), convert the schema with the external tool, then run
//! the data-replication phase (network first, then the DMS lifecycle). The
//! ordering is load-bearing: replication needs the network resources, and
//! schema conversion must finish — degraded results included — before data
//! starts moving.

use crate::compute::{ComputeConfig, ComputeProvisioner};
use crate::database::{DatabaseConfig, DatabaseProvisioner};
use crate::error::{ProvisionError, Result};
use crate::network::{NetworkConfig, NetworkProvisioner};
use crate::replication::{ReplicationConfig, ReplicationProvisioner};
use crate::schema::{MigrationConfig, MigrationRunner, MigrationSummary};
use crate::StepResult;
use dbferry_cloud::{
    ComputeApi, DatabaseApi, NetworkApi, PublicIpProbe, ReplicationApi, ResourceHandle,
};
use dbferry_core::{PollPolicy, ProvisioningContext, ResourceBundle};
use std::path::Path;
use tracing::{error, info};

/// Subnets the replication subnet group spans; DMS needs two zones.
const REPLICATION_SUBNET_COUNT: usize = 2;

pub struct MigrationOrchestrator<'a> {
    network: &'a dyn NetworkApi,
    compute: &'a dyn ComputeApi,
    database: &'a dyn DatabaseApi,
    replication: &'a dyn ReplicationApi,
    probe: &'a dyn PublicIpProbe,
    bundle: &'a ResourceBundle,
    policy: PollPolicy,
}

impl<'a> MigrationOrchestrator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: &'a dyn NetworkApi,
        compute: &'a dyn ComputeApi,
        database: &'a dyn DatabaseApi,
        replication: &'a dyn ReplicationApi,
        probe: &'a dyn PublicIpProbe,
        bundle: &'a ResourceBundle,
        policy: PollPolicy,
    ) -> Self {
        Self {
            network,
            compute,
            database,
            replication,
            probe,
            bundle,
            policy,
        }
    }

    /// Run the whole migration pipeline.
    pub async fn run(&self, ctx: &mut ProvisioningContext) -> Result<()> {
        let mut created = Vec::new();
        created.extend(Self::check("target", self.ensure_target(ctx).await)?);

        info!("starting schema conversion");
        let summary = self.convert_schema(ctx).await?;
        if summary.is_clean() {
            info!("schema conversion finished cleanly");
        }

        created.extend(Self::check("replication", self.replicate(ctx).await)?);
        info!(
            resources = created.len(),
            "data migration running, check the provider console for progress"
        );
        Ok(())
    }

    fn check(step: &str, result: StepResult) -> Result<Vec<ResourceHandle>> {
        match result {
            StepResult::Success(handles) => {
                info!(%step, created = handles.len(), "phase finished");
                Ok(handles)
            }
            StepResult::Skipped(reason) => {
                info!(%step, %reason, "phase skipped");
                Ok(Vec::new())
            }
            StepResult::Failed(err) => {
                error!(%step, error = %err, "phase failed");
                Err(err)
            }
        }
    }

    /// Make sure a migration target endpoint is known: reuse the configured
    /// one, or provision an RDS instance and capture its endpoint.
    pub async fn ensure_target(&self, ctx: &mut ProvisioningContext) -> StepResult {
        match self.try_ensure_target(ctx).await {
            Ok(step) => step,
            Err(err) => StepResult::Failed(err),
        }
    }

    async fn try_ensure_target(&self, ctx: &mut ProvisioningContext) -> Result<StepResult> {
        if ctx.contains("target") {
            let source = ctx.require_str("source", "Source")?;
            let target = ctx.require_str("target", "Target")?;
            info!(%source, %target, "migrating to the configured target");
            return Ok(StepResult::Skipped("target already configured".to_string()));
        }

        info!("creating database instance for the migration target");
        let db_config = DatabaseConfig::from_context(ctx)?;
        let database = DatabaseProvisioner::new(self.database, db_config);
        let handle = database.create().await?;

        info!(
            group = %database.config().security_group,
            port = database.config().port,
            "opening the database port"
        );
        let compute_config = ComputeConfig::from_context(ctx)?;
        let compute = ComputeProvisioner::new(self.compute, self.probe, compute_config);
        compute
            .allow_inbound(&database.config().security_group, database.config().port)
            .await?;

        database.wait_available(&handle.id, &self.policy).await?;
        let endpoint = database.endpoint(&handle.id).await?;
        info!(%endpoint, "database instance ready, using it as the migration target");
        ctx.insert("target", endpoint.as_str())?;

        Ok(StepResult::Success(vec![handle]))
    }

    /// Run the external schema-conversion tool and report its summary.
    /// Degraded results warn and continue; everything else is fatal.
    pub async fn convert_schema(&self, ctx: &ProvisioningContext) -> Result<MigrationSummary> {
        let config = MigrationConfig::from_context(ctx)?;
        let runner = MigrationRunner::new(config);
        let home = std::env::var("HOME")
            .map_err(|_| ProvisionError::Validation("HOME is not set".to_string()))?;
        let tool = MigrationRunner::find_tool(Path::new(&home))?;
        runner.run(&tool).await?;
        let log_dir = std::env::current_dir()?;
        let summary = runner.parse_summary(&log_dir)?;
        runner.report(&summary);
        Ok(summary)
    }

    /// The data-replication phase: network resources first, then the full
    /// DMS lifecycle.
    pub async fn replicate(&self, ctx: &mut ProvisioningContext) -> StepResult {
        match self.try_replicate(ctx).await {
            Ok(step) => step,
            Err(err) => StepResult::Failed(err),
        }
    }

    async fn try_replicate(&self, ctx: &mut ProvisioningContext) -> Result<StepResult> {
        info!("beginning data migration");

        let mut network_config = NetworkConfig::from_context(ctx);
        network_config.subnet_count = REPLICATION_SUBNET_COUNT;
        let network = NetworkProvisioner::new(self.network, network_config);
        let network_step = network.provision(ctx).await?;
        let mut handles = network_step.handles().to_vec();

        let replication_config = ReplicationConfig::from_context(ctx)?;
        let db_name = replication_config.db_name.clone();
        let replication = ReplicationProvisioner::new(self.replication, replication_config);

        replication.create_subnet_group().await?;
        handles.push(replication.create_instance(ctx).await?);
        info!("waiting for the replication instance");
        replication.wait_instance_available(&self.policy).await?;
        handles.push(replication.create_source_endpoint(ctx).await?);
        handles.push(replication.create_target_endpoint(ctx).await?);

        let table_mappings = self.bundle.table_mappings(&db_name)?;
        let task_settings = self.bundle.task_settings()?;
        handles.push(replication.create_task(ctx, table_mappings, task_settings).await?);

        info!("waiting for the replication task");
        replication.wait_task_ready(ctx, &self.policy).await?;
        info!("testing endpoint connections");
        replication.test_connections(ctx, &self.policy).await?;
        info!("starting the data migration");
        replication.start_task(ctx).await?;
        replication.wait_task_running(ctx, &self.policy).await?;

        Ok(StepResult::Success(handles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCloud;
    use std::fs;
    use std::time::Duration;

    fn bundle() -> (tempfile::TempDir, ResourceBundle) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dms")).unwrap();
        fs::write(
            dir.path().join("dms/table_mappings.json"),
            r#"{"rules": [{"object-locator": {"schema-name": "__SCHEMA__"}}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("dms/task_settings.json"), "{}").unwrap();
        let bundle = ResourceBundle::from_dir(dir.path()).unwrap();
        (dir, bundle)
    }

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_secs(1)).unwrap()
    }

    fn migration_context() -> ProvisioningContext {
        let mut ctx = ProvisioningContext::new();
        for (key, value) in [
            ("name", "mariadb-migration"),
            ("db_name", "sales"),
            ("engine", "mariadb"),
            ("alloc_storage", "200"),
            ("multi_az", "false"),
            ("version", "10.3"),
            ("source", "oracle.example.com"),
            ("service_name", "ORCL"),
            ("s_user", "scott"),
            ("s_password", "tiger"),
            ("s_port", "3306"),
            ("t_user", "admin"),
            ("t_password", "secret"),
            ("t_port", "3306"),
        ] {
            ctx.insert(key, value).unwrap();
        }
        ctx
    }

    fn orchestrator<'a>(cloud: &'a FakeCloud, bundle: &'a ResourceBundle) -> MigrationOrchestrator<'a> {
        MigrationOrchestrator::new(cloud, cloud, cloud, cloud, cloud, bundle, policy())
    }

    #[tokio::test]
    async fn ensure_target_provisions_and_captures_the_endpoint() {
        let cloud = FakeCloud::new();
        cloud.add_security_group("sg-rds", "rds-launch-wizard-2");
        let (_dir, bundle) = bundle();
        let mut ctx = migration_context();

        let step = orchestrator(&cloud, &bundle).ensure_target(&mut ctx).await;
        assert!(step.is_success());
        assert_eq!(
            ctx.get_str("target"),
            Some("mariadb-migration.db.example.amazonaws.com")
        );
        // database port opened on the named group
        let rules = cloud.ingress_rules();
        assert!(rules.iter().any(|(g, r)| g == "sg-rds" && r.from_port == 3306));
    }

    #[tokio::test]
    async fn ensure_target_skips_when_configured() {
        let cloud = FakeCloud::new();
        let (_dir, bundle) = bundle();
        let mut ctx = migration_context();
        ctx.insert("target", "mariadb.example.com").unwrap();

        let step = orchestrator(&cloud, &bundle).ensure_target(&mut ctx).await;
        assert!(matches!(step, StepResult::Skipped(_)));
        // no database was created
        assert!(!cloud.calls().iter().any(|c| c.starts_with("create_db_instance")));
    }

    #[tokio::test]
    async fn replicate_runs_network_then_dms_lifecycle() {
        let cloud = FakeCloud::new();
        let (_dir, bundle) = bundle();
        let mut ctx = migration_context();
        ctx.insert("target", "mariadb.example.com").unwrap();

        let step = orchestrator(&cloud, &bundle).replicate(&mut ctx).await;
        match step {
            StepResult::Success(handles) => assert!(handles.len() >= 9),
            other => panic!("expected success, got {other:?}"),
        }

        // replication gets a two-zone network
        assert_eq!(ctx.get_list("subnet").unwrap().len(), 2);
        assert!(ctx.get_str("replication_instance_arn").is_some());
        assert!(ctx.get_str("source_endpoint_arn").is_some());
        assert!(ctx.get_str("target_endpoint_arn").is_some());
        assert!(ctx.get_str("replication_task_arn").is_some());

        let calls = cloud.calls();
        let position = |prefix: &str| calls.iter().position(|c| c.starts_with(prefix)).unwrap();
        assert!(position("create_vpc") < position("create_subnet_group"));
        assert!(position("create_replication_instance") < position("create_endpoint"));
        assert!(position("create_replication_task") < position("start_replication_task"));
    }

    #[tokio::test]
    async fn replicate_fails_without_a_target() {
        let cloud = FakeCloud::new();
        let (_dir, bundle) = bundle();
        let mut ctx = migration_context();

        let step = orchestrator(&cloud, &bundle).replicate(&mut ctx).await;
        assert!(matches!(step, StepResult::Failed(_)));
    }
}
