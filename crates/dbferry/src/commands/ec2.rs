//! `ec2` command: create a compute instance and optionally deploy an
//! artifact to it over SSH.

use crate::validator;
use anyhow::Context as _;
use colored::Colorize;
use dbferry_cloud::ComputeApi;
use dbferry_cloud_aws::{sdk_config, CheckIp, Ec2Service};
use dbferry_core::{PollPolicy, ProvisioningContext, ResourceBundle};
use dbferry_provision::compute::DEFAULT_SECURITY_GROUP_NAME;
use dbferry_provision::deploy::{image_user, Deployer};
use dbferry_provision::{ComputeConfig, ComputeProvisioner};
use std::path::{Path, PathBuf};

pub async fn handle(ctx: &mut ProvisioningContext, bundle: &ResourceBundle) -> anyhow::Result<()> {
    println!("{}", "Creating EC2 instance".blue());
    let config = sdk_config(ctx.get_str("region").map(str::to_string)).await;
    let ec2 = Ec2Service::new(&config);
    let probe = CheckIp::new();

    let mut compute_config = ComputeConfig::from_context(ctx)?;
    if compute_config.security_group.is_none() {
        // reuse the group a previous run created
        if let Some(group_id) = ec2
            .find_security_group_id(DEFAULT_SECURITY_GROUP_NAME)
            .await?
        {
            compute_config.security_group = Some(group_id);
        }
    }
    validator::validate_compute(&compute_config, bundle, &ec2).await?;
    let artifact = ctx.get_str("deploy").map(PathBuf::from);
    if let Some(artifact) = &artifact {
        validator::validate_deploy(artifact)?;
    }

    let provisioner = ComputeProvisioner::new(&ec2, &probe, compute_config);
    provisioner.provision(ctx, bundle).await?;
    let instance_id = ctx.require_str("instance_id", "Instance Id")?.to_string();
    println!("{} {}", "Instance created:".green(), instance_id);

    if let Some(artifact) = artifact {
        deploy(&provisioner, &ec2, &instance_id, &artifact).await?;
    }
    Ok(())
}

async fn deploy(
    provisioner: &ComputeProvisioner<'_>,
    ec2: &Ec2Service,
    instance_id: &str,
    artifact: &Path,
) -> anyhow::Result<()> {
    let policy = PollPolicy::default();
    provisioner.wait_running(instance_id, &policy).await?;

    let host = ec2
        .instance_public_ip(instance_id)
        .await?
        .context("instance has no public address")?;
    let description = ec2.instance_image_description(instance_id).await?;
    let user = image_user(&description);
    println!("{} {user}@{host}", "Connecting as".blue());

    let key_path = provisioner
        .config()
        .key_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let deployer = Deployer::new(&key_path, &provisioner.config().key_pair_name(), user, host);
    deployer.wait_ssh(&policy).await?;
    deployer.copy_artifact(artifact).await?;

    if let Some(dns) = ec2.instance_public_dns(instance_id).await? {
        println!("{} {dns}", "Instance reachable at".green());
    }
    Ok(())
}
