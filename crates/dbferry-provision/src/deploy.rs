//! Artifact deployment over SSH.
//!
//! Wraps the `ssh`/`scp` CLIs: waits for the instance's SSH transport to
//! accept connections, then copies the deploy artifact into the Tomcat
//! webapps directory.

use crate::error::{ProvisionError, Result};
use dbferry_core::{await_ready, PollPolicy};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

pub const TOMCAT_WEBAPPS: &str = "/opt/tomcat/latest/webapps";

/// Login user derived from the image description.
pub fn image_user(image_description: &str) -> &'static str {
    if image_description.contains("Ubuntu") || image_description.contains("Canonical") {
        "ubuntu"
    } else {
        "ec2-user"
    }
}

pub struct Deployer {
    key_file: PathBuf,
    user: String,
    host: String,
}

impl Deployer {
    pub fn new(key_path: &Path, key_name: &str, user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            key_file: key_path.join(format!("{key_name}.pem")),
            user: user.into(),
            host: host.into(),
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn ssh_options(cmd: &mut Command) {
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("ConnectTimeout=5");
    }

    /// Poll until an SSH session can be opened, within the policy bounds.
    pub async fn wait_ssh(&self, policy: &PollPolicy) -> Result<()> {
        info!(host = %self.host, user = %self.user, timeout = ?policy.timeout, "waiting for SSH");
        let ready =
            await_ready(policy, |up: &bool| *up, || async move { self.probe().await }).await?;
        if !ready {
            return Err(ProvisionError::Timeout(format!("SSH to {}", self.host)));
        }
        Ok(())
    }

    /// One connection attempt; a refused or timed-out probe is not-ready,
    /// not an error.
    async fn probe(&self) -> Result<bool> {
        let mut cmd = Command::new("ssh");
        Self::ssh_options(&mut cmd);
        cmd.arg("-i")
            .arg(&self.key_file)
            .arg(self.destination())
            .arg("true")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        debug!(host = %self.host, "probing SSH");
        let status = cmd.status().await?;
        Ok(status.success())
    }

    /// Copy the artifact into the Tomcat webapps directory.
    pub async fn copy_artifact(&self, artifact: &Path) -> Result<()> {
        let file_name = artifact
            .file_name()
            .ok_or_else(|| {
                ProvisionError::Validation(format!(
                    "deploy artifact {} has no file name",
                    artifact.display()
                ))
            })?
            .to_string_lossy();
        let remote = format!("{}:{TOMCAT_WEBAPPS}/{file_name}", self.destination());

        info!(artifact = %artifact.display(), %remote, "copying artifact");
        let mut cmd = Command::new("scp");
        Self::ssh_options(&mut cmd);
        cmd.arg("-i").arg(&self.key_file).arg(artifact).arg(&remote);
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());

        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::Subprocess(format!(
                "scp to {remote} failed: {}",
                stderr.trim()
            )));
        }
        info!("artifact copied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_user_follows_distribution() {
        assert_eq!(image_user("Canonical, Ubuntu, 18.04 LTS"), "ubuntu");
        assert_eq!(image_user("Amazon Linux 2 AMI"), "ec2-user");
    }

    #[test]
    fn key_file_and_destination() {
        let deployer = Deployer::new(Path::new("/keys"), "demoec2-keypair", "ubuntu", "host.example");
        assert_eq!(deployer.key_file, Path::new("/keys/demoec2-keypair.pem"));
        assert_eq!(deployer.destination(), "ubuntu@host.example");
    }

    #[tokio::test]
    async fn artifact_without_file_name_is_rejected() {
        let deployer = Deployer::new(Path::new("."), "k", "ubuntu", "host");
        let err = deployer.copy_artifact(Path::new("/")).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }
}
