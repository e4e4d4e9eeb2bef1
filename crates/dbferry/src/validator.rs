//! Pre-flight checks for the `ec2` command: catch bad parameters before any
//! cloud resource is created.

use anyhow::bail;
use dbferry_cloud::ComputeApi;
use dbferry_core::ResourceBundle;
use dbferry_provision::ComputeConfig;
use std::path::{Path, PathBuf};

pub async fn validate_compute(
    config: &ComputeConfig,
    bundle: &ResourceBundle,
    api: &dyn ComputeApi,
) -> anyhow::Result<()> {
    validate_type(&config.instance_type, bundle)?;
    validate_region(&config.region, bundle)?;
    if let Some(group) = &config.security_group {
        validate_security_group(group, api).await?;
    }
    if let Some(key_pair) = &config.key_pair {
        validate_key_pair(key_pair, config.key_path.as_deref(), api).await?;
    }
    Ok(())
}

fn validate_type(instance_type: &str, bundle: &ResourceBundle) -> anyhow::Result<()> {
    let known = bundle.instance_types()?;
    if !known.iter().any(|entry| entry.api_name == instance_type) {
        bail!("instance type '{instance_type}' is not valid, run 'list types' for valid options");
    }
    Ok(())
}

fn validate_region(region: &str, bundle: &ResourceBundle) -> anyhow::Result<()> {
    let known = bundle.regions()?;
    if !known.iter().any(|entry| entry.name == region) {
        bail!("region '{region}' is not valid, run 'list regions' for valid options");
    }
    Ok(())
}

/// The configured group must exist on the provider side, matched by id or
/// name.
async fn validate_security_group(group: &str, api: &dyn ComputeApi) -> anyhow::Result<()> {
    let groups = api.list_security_groups().await?;
    if !groups.iter().any(|g| g.id == group || g.name == group) {
        bail!("security group '{group}' does not exist, run 'list security_groups' for valid options");
    }
    Ok(())
}

/// The configured key pair must exist on the provider side and the matching
/// private key file must be present locally, otherwise the instance would be
/// unreachable.
async fn validate_key_pair(
    key_pair: &str,
    key_path: Option<&Path>,
    api: &dyn ComputeApi,
) -> anyhow::Result<()> {
    let names = api.list_key_pairs().await?;
    if !names.iter().any(|name| name == key_pair) {
        bail!("key pair '{key_pair}' does not exist, run 'list key_pairs' for valid options");
    }
    let dir = key_path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let pem = dir.join(format!("{key_pair}.pem"));
    if !pem.is_file() {
        bail!("private key {} not found", pem.display());
    }
    Ok(())
}

pub fn validate_deploy(artifact: &Path) -> anyhow::Result<()> {
    if !artifact.is_file() {
        bail!("deploy artifact {} does not exist", artifact.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn reference_bundle() -> (tempfile::TempDir, ResourceBundle) {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("reference");
        fs::create_dir_all(&reference).unwrap();
        fs::write(
            reference.join("instance_types.json"),
            r#"[{"api_name": "t2.micro", "name": "T2 Micro", "memory": "1 GiB", "vcpus": "1"}]"#,
        )
        .unwrap();
        fs::write(
            reference.join("regions.json"),
            r#"[{"name": "us-east-2", "description": "US East (Ohio)"}]"#,
        )
        .unwrap();
        let bundle = ResourceBundle::from_dir(dir.path()).unwrap();
        (dir, bundle)
    }

    #[test]
    fn known_type_and_region_pass() {
        let (_dir, bundle) = reference_bundle();
        validate_type("t2.micro", &bundle).unwrap();
        validate_region("us-east-2", &bundle).unwrap();
    }

    #[test]
    fn unknown_type_is_rejected() {
        let (_dir, bundle) = reference_bundle();
        let err = validate_type("t2.mega", &bundle).unwrap_err();
        assert!(err.to_string().contains("list types"));
    }

    #[test]
    fn unknown_region_is_rejected() {
        let (_dir, bundle) = reference_bundle();
        assert!(validate_region("mars-north-1", &bundle).is_err());
    }

    #[test]
    fn deploy_artifact_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("app.war");
        assert!(validate_deploy(&artifact).is_err());
        fs::write(&artifact, "contents").unwrap();
        validate_deploy(&artifact).unwrap();
    }
}
