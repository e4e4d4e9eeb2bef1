//! Compute provisioning: key pair, security group and the EC2 instance.

use crate::error::{ProvisionError, Result};
use crate::StepResult;
use dbferry_cloud::{
    CloudError, ComputeApi, IngressRule, InstanceSpec, PublicIpProbe, ResourceHandle, ResourceKind,
};
use dbferry_core::{ProvisioningContext, ResourceBundle, DEFAULT_REGION};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_IMAGE_ID: &str = "ami-0cd3dfa4e37921605";
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";
pub const KEY_PAIR_SUFFIX: &str = "ec2-keypair";
pub const DEFAULT_SECURITY_GROUP_NAME: &str = "dbferry";

/// Startup profiles with a bundled init script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadProfile {
    Tomcat,
}

impl WorkloadProfile {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "tomcat" => Ok(WorkloadProfile::Tomcat),
            other => Err(ProvisionError::Validation(format!(
                "init script '{other}' is not supported"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadProfile::Tomcat => "tomcat",
        }
    }

    /// Extra ingress the workload needs besides SSH.
    fn ingress(&self) -> Vec<IngressRule> {
        match self {
            WorkloadProfile::Tomcat => vec![IngressRule::tcp(8080, "0.0.0.0/0")],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub name: String,
    pub region: String,
    pub instance_type: String,
    pub image_id: String,
    pub profile: Option<WorkloadProfile>,
    pub key_pair: Option<String>,
    pub security_group: Option<String>,
    pub key_path: Option<PathBuf>,
}

impl ComputeConfig {
    pub fn from_context(ctx: &ProvisioningContext) -> Result<Self> {
        let name = ctx.require_str("name", "Name")?.to_string();
        let profile = match ctx.get_str("user_data") {
            Some(value) => Some(WorkloadProfile::parse(value)?),
            None => None,
        };
        Ok(Self {
            name,
            region: ctx.get_str("region").unwrap_or(DEFAULT_REGION).to_string(),
            instance_type: ctx
                .get_str("type")
                .unwrap_or(DEFAULT_INSTANCE_TYPE)
                .to_string(),
            image_id: ctx.get_str("image").unwrap_or(DEFAULT_IMAGE_ID).to_string(),
            profile,
            key_pair: ctx.get_str("key_pair").map(str::to_string),
            security_group: ctx.get_str("security_group").map(str::to_string),
            key_path: ctx.get_str("key_path").map(PathBuf::from),
        })
    }

    pub fn key_pair_name(&self) -> String {
        match &self.key_pair {
            Some(name) => name.clone(),
            None => format!("{}{}", self.name, KEY_PAIR_SUFFIX),
        }
    }
}

pub struct ComputeProvisioner<'a> {
    api: &'a dyn ComputeApi,
    probe: &'a dyn PublicIpProbe,
    config: ComputeConfig,
}

impl<'a> ComputeProvisioner<'a> {
    pub fn new(
        api: &'a dyn ComputeApi,
        probe: &'a dyn PublicIpProbe,
        config: ComputeConfig,
    ) -> Self {
        Self { api, probe, config }
    }

    pub fn config(&self) -> &ComputeConfig {
        &self.config
    }

    /// Materialize the instance: key pair and security group first (created
    /// when not supplied), then the launch. Appends `instance_id` — and
    /// `key_pair` / `security_group` when they were created here — to the
    /// context.
    pub async fn provision(
        &self,
        ctx: &mut ProvisioningContext,
        bundle: &ResourceBundle,
    ) -> Result<StepResult> {
        let mut handles = Vec::new();

        let key_name = match &self.config.key_pair {
            Some(name) => name.clone(),
            None => {
                let name = self.create_key_pair().await?;
                handles.push(ResourceHandle::new(ResourceKind::KeyPair, &name));
                ctx.insert("key_pair", name.as_str())?;
                name
            }
        };

        let group_id = match &self.config.security_group {
            Some(group_id) => {
                self.ensure_ssh_ingress(group_id).await?;
                group_id.clone()
            }
            None => {
                let group_id = self.create_security_group().await?;
                handles.push(ResourceHandle::new(ResourceKind::SecurityGroup, &group_id));
                ctx.insert("security_group", group_id.as_str())?;
                group_id
            }
        };

        let user_data = match self.config.profile {
            Some(profile) => Some(bundle.startup_script(profile.as_str())?),
            None => None,
        };
        let instance_id = self.launch(&key_name, &group_id, user_data).await?;
        handles.push(ResourceHandle::new(ResourceKind::Instance, &instance_id));
        ctx.insert("instance_id", instance_id.as_str())?;

        Ok(StepResult::Success(handles))
    }

    /// Create a key pair named `<name>ec2-keypair` and write the private key
    /// next to the key path (or the working directory) with owner-only
    /// permissions.
    pub async fn create_key_pair(&self) -> Result<String> {
        let key_name = self.config.key_pair_name();
        info!(%key_name, "creating key pair");
        let material = self.api.create_key_pair(&key_name).await?;
        let dir = self
            .config
            .key_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        write_private_key(&dir.join(format!("{key_name}.pem")), &material)?;
        Ok(key_name)
    }

    /// Create the default security group with SSH ingress from the caller's
    /// public address, plus any workload-specific rules.
    pub async fn create_security_group(&self) -> Result<String> {
        info!(group = DEFAULT_SECURITY_GROUP_NAME, "creating security group");
        let group_id = self
            .api
            .create_security_group(
                DEFAULT_SECURITY_GROUP_NAME,
                &format!("{DEFAULT_SECURITY_GROUP_NAME} SG"),
            )
            .await?;
        self.api
            .create_name_tag(&group_id, DEFAULT_SECURITY_GROUP_NAME)
            .await?;
        let cidr = self.probe.public_cidr().await?;
        self.api
            .authorize_ingress(&group_id, &IngressRule::ssh(cidr))
            .await?;
        if let Some(profile) = self.config.profile {
            for rule in profile.ingress() {
                self.api.authorize_ingress(&group_id, &rule).await?;
            }
        }
        Ok(group_id)
    }

    /// Add an SSH ingress rule from the caller's public address to an
    /// existing group. The intent is idempotent: a "rule already exists"
    /// rejection is swallowed, everything else propagates.
    pub async fn ensure_ssh_ingress(&self, group_id: &str) -> Result<()> {
        let cidr = self.probe.public_cidr().await?;
        match self
            .api
            .authorize_ingress(group_id, &IngressRule::ssh(cidr))
            .await
        {
            Ok(()) => Ok(()),
            Err(CloudError::DuplicateRule(group)) => {
                warn!(%group, "SSH ingress rule already present");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Open a single TCP port (from the caller's public address) on a group
    /// identified by name, with the same idempotent intent as SSH ingress.
    pub async fn allow_inbound(&self, group_name: &str, port: i32) -> Result<()> {
        let group_id = self
            .api
            .find_security_group_id(group_name)
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("security group {group_name}")))?;
        let cidr = self.probe.public_cidr().await?;
        match self
            .api
            .authorize_ingress(&group_id, &IngressRule::tcp(port, cidr))
            .await
        {
            Ok(()) => Ok(()),
            Err(CloudError::DuplicateRule(group)) => {
                warn!(%group, port, "ingress rule already present");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn launch(
        &self,
        key_name: &str,
        group_id: &str,
        user_data: Option<String>,
    ) -> Result<String> {
        let spec = InstanceSpec {
            name: self.config.name.clone(),
            image_id: self.config.image_id.clone(),
            instance_type: self.config.instance_type.clone(),
            key_name: key_name.to_string(),
            security_group_ids: vec![group_id.to_string()],
            user_data,
        };
        let instance_id = self.api.run_instance(&spec).await?;
        info!(%instance_id, name = %self.config.name, "launched instance");
        Ok(instance_id)
    }

    /// Poll the instance system status until `ok`.
    pub async fn wait_running(
        &self,
        instance_id: &str,
        policy: &dbferry_core::PollPolicy,
    ) -> Result<()> {
        info!(%instance_id, timeout = ?policy.timeout, "waiting for instance");
        let ready = dbferry_core::await_ready(
            policy,
            |status: &String| status.as_str() == "ok",
            || async move { self.api.instance_status(instance_id).await },
        )
        .await?;
        if !ready {
            return Err(ProvisionError::Timeout(format!("instance {instance_id}")));
        }
        Ok(())
    }
}

fn write_private_key(path: &Path, material: &str) -> Result<()> {
    std::fs::write(path, material)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o400))?;
    }
    info!(path = %path.display(), "wrote private key");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCloud;
    use dbferry_core::PollPolicy;
    use std::time::Duration;

    fn config(name: &str) -> ComputeConfig {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("name", name).unwrap();
        ComputeConfig::from_context(&ctx).unwrap()
    }

    #[test]
    fn name_is_required() {
        let ctx = ProvisioningContext::new();
        let err = ComputeConfig::from_context(&ctx).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Core(dbferry_core::CoreError::MissingParameter(_))
        ));
    }

    #[test]
    fn unsupported_profile_is_fatal() {
        let mut ctx = ProvisioningContext::new();
        ctx.insert("name", "demo").unwrap();
        ctx.insert("user_data", "jetty").unwrap();
        let err = ComputeConfig::from_context(&ctx).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }

    #[test]
    fn key_pair_name_gets_suffix() {
        assert_eq!(config("demo").key_pair_name(), "demoec2-keypair");
    }

    #[tokio::test]
    async fn duplicate_ssh_rule_is_swallowed() {
        let cloud = FakeCloud::new();
        cloud.mark_rule_duplicate("sg-existing");
        let provisioner = ComputeProvisioner::new(&cloud, &cloud, config("demo"));

        provisioner.ensure_ssh_ingress("sg-existing").await.unwrap();
        // the duplicate never lands in the recorded rule set
        assert!(cloud.ingress_rules().is_empty());
    }

    #[tokio::test]
    async fn fresh_ssh_rule_is_recorded() {
        let cloud = FakeCloud::new();
        let provisioner = ComputeProvisioner::new(&cloud, &cloud, config("demo"));

        provisioner.ensure_ssh_ingress("sg-fresh").await.unwrap();
        let rules = cloud.ingress_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].0, "sg-fresh");
        assert_eq!(rules[0].1.from_port, 22);
        assert!(rules[0].1.cidr.ends_with("/32"));
    }

    #[tokio::test]
    async fn tomcat_profile_opens_extra_port() {
        let cloud = FakeCloud::new();
        let mut config = config("demo");
        config.profile = Some(WorkloadProfile::Tomcat);
        let provisioner = ComputeProvisioner::new(&cloud, &cloud, config);

        let group_id = provisioner.create_security_group().await.unwrap();
        let rules = cloud.ingress_rules();
        assert!(rules.iter().any(|(g, r)| g == &group_id && r.from_port == 22));
        assert!(rules
            .iter()
            .any(|(g, r)| g == &group_id && r.from_port == 8080 && r.cidr == "0.0.0.0/0"));
    }

    #[tokio::test]
    async fn wait_running_times_out() {
        let cloud = FakeCloud::new();
        cloud.set_status("i-stuck", vec!["initializing"; 100]);
        let provisioner = ComputeProvisioner::new(&cloud, &cloud, config("demo"));
        let policy =
            PollPolicy::new(Duration::from_millis(1), Duration::from_millis(5)).unwrap();

        let err = provisioner.wait_running("i-stuck", &policy).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout(_)));
    }
}
