//! Managed database (RDS) provisioning.
//!
//! Configuration is fail-fast: every required key is resolved before the
//! first provider call, so a missing parameter never leaves a half-created
//! instance behind.

use crate::error::{ProvisionError, Result};
use crate::{parse_flag, parse_number};
use dbferry_cloud::{DatabaseApi, DbInstanceSpec, ResourceHandle, ResourceKind};
use dbferry_core::{PollPolicy, ProvisioningContext, DEFAULT_REGION};
use tracing::info;

const DEFAULT_LICENSE_MODEL: &str = "general-public-license";
const DEFAULT_IOPS: i32 = 1000;
const DEFAULT_PUBLIC_ACCESS: bool = true;
const DEFAULT_SECURITY_GROUP: &str = "rds-launch-wizard-2";
const DEFAULT_STORAGE_TYPE: &str = "io1";
const DEFAULT_INSTANCE_CLASS: &str = "db.r4.xlarge";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub name: String,
    pub db_name: String,
    pub region: String,
    pub instance_class: String,
    pub engine: String,
    pub engine_version: String,
    pub allocated_storage: i32,
    pub multi_az: bool,
    pub master_username: String,
    pub master_password: String,
    pub port: i32,
    pub license_model: String,
    pub iops: i32,
    pub publicly_accessible: bool,
    pub security_group: String,
    pub storage_type: String,
}

impl DatabaseConfig {
    /// Resolve the configuration, failing on the first missing required key.
    pub fn from_context(ctx: &ProvisioningContext) -> Result<Self> {
        let name = ctx.require_str("name", "Name")?.to_string();
        let db_name = ctx.require_str("db_name", "Database name")?.to_string();
        let allocated_storage =
            parse_number(ctx.require_str("alloc_storage", "Allocated storage")?, "Allocated storage")?;
        let multi_az = parse_flag(ctx.require_str("multi_az", "MultiAZ")?, "MultiAZ")?;
        let port = parse_number(ctx.require_str("s_port", "Port")?, "Port")?;
        let publicly_accessible = match ctx.get_str("public_access") {
            Some(value) => parse_flag(value, "Public access")?,
            None => DEFAULT_PUBLIC_ACCESS,
        };
        let iops = match ctx.get_str("iops") {
            Some(value) => parse_number(value, "IOPS")?,
            None => DEFAULT_IOPS,
        };
        Ok(Self {
            name,
            db_name,
            region: ctx.get_str("region").unwrap_or(DEFAULT_REGION).to_string(),
            instance_class: ctx
                .get_str("instance_class")
                .unwrap_or(DEFAULT_INSTANCE_CLASS)
                .to_string(),
            engine: ctx.require_str("engine", "Engine")?.to_string(),
            engine_version: ctx.require_str("version", "Version")?.to_string(),
            allocated_storage,
            multi_az,
            master_username: ctx.require_str("s_user", "User")?.to_string(),
            master_password: ctx.require_str("s_password", "Password")?.to_string(),
            port,
            license_model: ctx
                .get_str("license_model")
                .unwrap_or(DEFAULT_LICENSE_MODEL)
                .to_string(),
            iops,
            publicly_accessible,
            security_group: ctx
                .get_str("security_group")
                .unwrap_or(DEFAULT_SECURITY_GROUP)
                .to_string(),
            storage_type: ctx
                .get_str("storage_type")
                .unwrap_or(DEFAULT_STORAGE_TYPE)
                .to_string(),
        })
    }

    fn spec(&self) -> DbInstanceSpec {
        DbInstanceSpec {
            identifier: self.name.clone(),
            db_name: self.db_name.clone(),
            instance_class: self.instance_class.clone(),
            engine: self.engine.clone(),
            engine_version: self.engine_version.clone(),
            allocated_storage: self.allocated_storage,
            master_username: self.master_username.clone(),
            master_password: self.master_password.clone(),
            port: self.port,
            multi_az: self.multi_az,
            license_model: self.license_model.clone(),
            iops: self.iops,
            publicly_accessible: self.publicly_accessible,
            storage_type: self.storage_type.clone(),
            security_groups: vec![self.security_group.clone()],
        }
    }
}

pub struct DatabaseProvisioner<'a> {
    api: &'a dyn DatabaseApi,
    config: DatabaseConfig,
}

impl<'a> DatabaseProvisioner<'a> {
    pub fn new(api: &'a dyn DatabaseApi, config: DatabaseConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub async fn create(&self) -> Result<ResourceHandle> {
        let identifier = self.api.create_db_instance(&self.config.spec()).await?;
        info!(%identifier, engine = %self.config.engine, "created database instance");
        Ok(ResourceHandle::new(ResourceKind::DbInstance, identifier))
    }

    /// Poll the instance status until `available`.
    pub async fn wait_available(&self, identifier: &str, policy: &PollPolicy) -> Result<()> {
        info!(%identifier, timeout = ?policy.timeout, "waiting for database instance");
        let ready = dbferry_core::await_ready(
            policy,
            |status: &String| status.as_str() == "available",
            || async move { self.api.db_instance_status(identifier).await },
        )
        .await?;
        if !ready {
            return Err(ProvisionError::Timeout(format!(
                "database instance {identifier}"
            )));
        }
        Ok(())
    }

    /// Connection address of the instance endpoint, valid once available.
    pub async fn endpoint(&self, identifier: &str) -> Result<String> {
        let (address, _port) = self.api.db_endpoint(identifier).await?;
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCloud;
    use dbferry_core::CoreError;

    fn full_context() -> ProvisioningContext {
        let mut ctx = ProvisioningContext::new();
        for (key, value) in [
            ("name", "mariadb-migration"),
            ("db_name", "sales"),
            ("engine", "mariadb"),
            ("alloc_storage", "200"),
            ("multi_az", "false"),
            ("version", "10.3"),
            ("s_user", "admin"),
            ("s_password", "secret"),
            ("s_port", "3306"),
        ] {
            ctx.insert(key, value).unwrap();
        }
        ctx
    }

    #[test]
    fn missing_db_name_fails_before_any_provider_call() {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("name", "mariadb-migration").unwrap();
        let err = DatabaseConfig::from_context(&ctx).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Core(CoreError::MissingParameter(m)) if m == "Database name"
        ));
    }

    #[test]
    fn defaults_fill_the_optional_fields_only() {
        let config = DatabaseConfig::from_context(&full_context()).unwrap();
        assert_eq!(config.license_model, DEFAULT_LICENSE_MODEL);
        assert_eq!(config.iops, DEFAULT_IOPS);
        assert!(config.publicly_accessible);
        assert_eq!(config.storage_type, DEFAULT_STORAGE_TYPE);
        assert_eq!(config.security_group, DEFAULT_SECURITY_GROUP);
        assert_eq!(config.instance_class, DEFAULT_INSTANCE_CLASS);
    }

    #[test]
    fn storage_must_be_numeric() {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("name", "mariadb-migration").unwrap();
        ctx.insert("db_name", "sales").unwrap();
        ctx.insert("engine", "mariadb").unwrap();
        ctx.insert("alloc_storage", "plenty").unwrap();
        let err = DatabaseConfig::from_context(&ctx).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }

    #[tokio::test]
    async fn create_then_wait_then_endpoint() {
        let cloud = FakeCloud::new();
        cloud.set_status("mariadb-migration", vec!["creating", "available"]);
        let config = DatabaseConfig::from_context(&full_context()).unwrap();
        let provisioner = DatabaseProvisioner::new(&cloud, config);

        let handle = provisioner.create().await.unwrap();
        assert_eq!(handle.kind, ResourceKind::DbInstance);

        let policy = PollPolicy::new(
            std::time::Duration::from_millis(1),
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        provisioner.wait_available(&handle.id, &policy).await.unwrap();

        let endpoint = provisioner.endpoint(&handle.id).await.unwrap();
        assert!(!endpoint.is_empty());
    }
}
