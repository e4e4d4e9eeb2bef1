//! Public address probe used to scope SSH ingress rules.

use async_trait::async_trait;
use dbferry_cloud::{CloudError, PublicIpProbe, Result};

const CHECKIP_URL: &str = "https://checkip.amazonaws.com";

/// Resolves the caller's public address via the checkip service.
pub struct CheckIp {
    endpoint: String,
}

impl CheckIp {
    pub fn new() -> Self {
        Self {
            endpoint: CHECKIP_URL.to_string(),
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for CheckIp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublicIpProbe for CheckIp {
    async fn public_cidr(&self) -> Result<String> {
        let body = reqwest::get(&self.endpoint)
            .await
            .map_err(|e| CloudError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| CloudError::Http(e.to_string()))?;
        let address = body.trim();
        if address.is_empty() {
            return Err(CloudError::InvalidResponse(
                "public address probe returned an empty body".into(),
            ));
        }
        Ok(format!("{address}/32"))
    }
}
