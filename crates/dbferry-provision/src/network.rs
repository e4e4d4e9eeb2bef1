//! Network provisioning: the minimal routed VPC that hosts the replication
//! instance.
//!
//! The order is mandatory, each step consuming an identifier produced by the
//! previous one: VPC → subnets → internet gateway → attach → route table →
//! associations → default route → default security group. There is no
//! rollback of partially created resources.

use crate::error::Result;
use crate::StepResult;
use dbferry_cloud::{NetworkApi, ResourceHandle, ResourceKind};
use dbferry_core::{ProvisioningContext, DEFAULT_REGION};
use tracing::info;

const DEFAULT_VPC_NAME: &str = "dbferry-vpc";
const DEFAULT_SUBNET_NAME: &str = "dbferry-subnet@";
const DEFAULT_IGW_NAME: &str = "dbferry-igw";
const DEFAULT_ROUTE_NAME: &str = "dbferry-route";
const DEFAULT_CIDR: &str = "10.10.0.0/16";
const DEFAULT_SUBNET_CIDR: &str = "10.10.@.0/24";
const DEFAULT_SUBNET_NUMBER: usize = 1;
const DESTINATION_CIDR: &str = "0.0.0.0/0";

/// Placeholder replaced with the subnet index in names and CIDR templates.
const INDEX_PLACEHOLDER: char = '@';

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub region: String,
    pub subnet_count: usize,
    pub vpc_name: String,
    pub subnet_name: String,
    pub igw_name: String,
    pub route_name: String,
    pub cidr_block: String,
    pub subnet_cidr: String,
}

impl NetworkConfig {
    pub fn from_context(ctx: &ProvisioningContext) -> Self {
        Self {
            region: ctx.get_str("region").unwrap_or(DEFAULT_REGION).to_string(),
            subnet_count: ctx
                .get_int("subnet_number")
                .map(|n| n.max(1) as usize)
                .unwrap_or(DEFAULT_SUBNET_NUMBER),
            vpc_name: ctx
                .get_str("vpc_name")
                .unwrap_or(DEFAULT_VPC_NAME)
                .to_string(),
            subnet_name: ctx
                .get_str("subnet_name")
                .unwrap_or(DEFAULT_SUBNET_NAME)
                .to_string(),
            igw_name: ctx
                .get_str("igw_name")
                .unwrap_or(DEFAULT_IGW_NAME)
                .to_string(),
            route_name: ctx
                .get_str("route_name")
                .unwrap_or(DEFAULT_ROUTE_NAME)
                .to_string(),
            cidr_block: ctx
                .get_str("cidr_block")
                .unwrap_or(DEFAULT_CIDR)
                .to_string(),
            subnet_cidr: ctx
                .get_str("subnet_cidr")
                .unwrap_or(DEFAULT_SUBNET_CIDR)
                .to_string(),
        }
    }

    /// Availability zone for a subnet index: the region with an incrementing
    /// letter suffix (`us-east-2` → `us-east-2a`, `us-east-2b`, ...).
    fn availability_zone(&self, index: usize) -> String {
        let letter = (b'a' + index as u8) as char;
        format!("{}{}", self.region, letter)
    }

    fn subnet_name(&self, index: usize) -> String {
        self.subnet_name
            .replace(INDEX_PLACEHOLDER, &index.to_string())
    }
}

pub struct NetworkProvisioner<'a> {
    api: &'a dyn NetworkApi,
    config: NetworkConfig,
}

impl<'a> NetworkProvisioner<'a> {
    pub fn new(api: &'a dyn NetworkApi, config: NetworkConfig) -> Self {
        Self { api, config }
    }

    /// Run the full network sequence, appending `vpc_id`, `subnet`, `igw_id`,
    /// `route_table_id` and `vpc_security_groups` to the context.
    pub async fn provision(&self, ctx: &mut ProvisioningContext) -> Result<StepResult> {
        let mut handles = Vec::new();

        let vpc_id = self.create_network().await?;
        handles.push(ResourceHandle::new(ResourceKind::Vpc, &vpc_id));
        ctx.insert("vpc_id", vpc_id.as_str())?;

        let subnet_ids = self.create_subnets(&vpc_id).await?;
        for id in &subnet_ids {
            handles.push(ResourceHandle::new(ResourceKind::Subnet, id));
        }
        ctx.insert("subnet", subnet_ids.clone())?;

        let igw_id = self.create_internet_gateway().await?;
        handles.push(ResourceHandle::new(ResourceKind::InternetGateway, &igw_id));
        self.attach_gateway(&igw_id, &vpc_id).await?;
        ctx.insert("igw_id", igw_id.as_str())?;

        let route_table_id = self.create_route_table(&vpc_id).await?;
        handles.push(ResourceHandle::new(ResourceKind::RouteTable, &route_table_id));
        ctx.insert("route_table_id", route_table_id.as_str())?;

        for subnet_id in &subnet_ids {
            self.associate_route_table(&route_table_id, subnet_id).await?;
        }
        self.create_default_route(&route_table_id, &igw_id).await?;

        let security_group_id = self.default_security_group(&vpc_id).await?;
        handles.push(ResourceHandle::new(
            ResourceKind::SecurityGroup,
            &security_group_id,
        ));
        ctx.insert("vpc_security_groups", security_group_id.as_str())?;

        Ok(StepResult::Success(handles))
    }

    pub async fn create_network(&self) -> Result<String> {
        let vpc_id = self.api.create_vpc(&self.config.cidr_block).await?;
        self.api.create_name_tag(&vpc_id, &self.config.vpc_name).await?;
        info!(%vpc_id, "created VPC");
        Ok(vpc_id)
    }

    /// Create the configured number of subnets. A templated CIDR pins each
    /// subnet to a distinct availability zone; a fixed CIDR yields subnets
    /// with no explicit zone.
    pub async fn create_subnets(&self, vpc_id: &str) -> Result<Vec<String>> {
        let mut subnet_ids = Vec::with_capacity(self.config.subnet_count);
        for i in 0..self.config.subnet_count {
            let (cidr, az) = if self.config.subnet_cidr.contains(INDEX_PLACEHOLDER) {
                let cidr = self
                    .config
                    .subnet_cidr
                    .replace(INDEX_PLACEHOLDER, &i.to_string());
                (cidr, Some(self.config.availability_zone(i)))
            } else {
                (self.config.subnet_cidr.clone(), None)
            };
            let subnet_id = self.api.create_subnet(vpc_id, &cidr, az.as_deref()).await?;
            self.api
                .create_name_tag(&subnet_id, &self.config.subnet_name(i))
                .await?;
            info!(%subnet_id, %cidr, az = az.as_deref().unwrap_or("-"), "created subnet");
            subnet_ids.push(subnet_id);
        }
        Ok(subnet_ids)
    }

    pub async fn create_internet_gateway(&self) -> Result<String> {
        let igw_id = self.api.create_internet_gateway().await?;
        self.api.create_name_tag(&igw_id, &self.config.igw_name).await?;
        info!(%igw_id, "created internet gateway");
        Ok(igw_id)
    }

    pub async fn attach_gateway(&self, igw_id: &str, vpc_id: &str) -> Result<()> {
        self.api.attach_internet_gateway(igw_id, vpc_id).await?;
        info!(%igw_id, %vpc_id, "attached internet gateway");
        Ok(())
    }

    pub async fn create_route_table(&self, vpc_id: &str) -> Result<String> {
        let route_table_id = self.api.create_route_table(vpc_id).await?;
        self.api
            .create_name_tag(&route_table_id, &self.config.route_name)
            .await?;
        info!(%route_table_id, "created route table");
        Ok(route_table_id)
    }

    pub async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> Result<()> {
        self.api.associate_route_table(route_table_id, subnet_id).await?;
        info!(%route_table_id, %subnet_id, "associated route table");
        Ok(())
    }

    pub async fn create_default_route(&self, route_table_id: &str, igw_id: &str) -> Result<()> {
        self.api
            .create_route(route_table_id, DESTINATION_CIDR, igw_id)
            .await?;
        info!(%route_table_id, %igw_id, destination = DESTINATION_CIDR, "created default route");
        Ok(())
    }

    pub async fn default_security_group(&self, vpc_id: &str) -> Result<String> {
        Ok(self.api.default_security_group(vpc_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCloud;

    fn config(subnet_count: usize) -> NetworkConfig {
        let ctx = ProvisioningContext::new();
        let mut config = NetworkConfig::from_context(&ctx);
        config.subnet_count = subnet_count;
        config
    }

    #[tokio::test]
    async fn provision_appends_context_keys() {
        let cloud = FakeCloud::new();
        let mut ctx = ProvisioningContext::new();
        let provisioner = NetworkProvisioner::new(&cloud, config(1));

        let result = provisioner.provision(&mut ctx).await.unwrap();

        assert!(result.is_success());
        assert!(ctx.get_str("vpc_id").is_some());
        assert_eq!(ctx.get_list("subnet").unwrap().len(), 1);
        assert!(ctx.get_str("igw_id").is_some());
        assert!(ctx.get_str("route_table_id").is_some());
        assert!(ctx.get_str("vpc_security_groups").is_some());
    }

    #[tokio::test]
    async fn operations_run_in_dependency_order() {
        let cloud = FakeCloud::new();
        let mut ctx = ProvisioningContext::new();
        let provisioner = NetworkProvisioner::new(&cloud, config(2));
        provisioner.provision(&mut ctx).await.unwrap();

        let calls = cloud.calls();
        let position = |prefix: &str| {
            calls
                .iter()
                .position(|c| c.starts_with(prefix))
                .unwrap_or_else(|| panic!("no call starting with {prefix}"))
        };

        // subnets never before the VPC, associations never before both the
        // route table and at least one subnet
        assert!(position("create_vpc") < position("create_subnet"));
        assert!(position("create_subnet") < position("associate_route_table"));
        assert!(position("create_route_table") < position("associate_route_table"));
        assert!(position("associate_route_table") < position("create_route"));
    }

    #[tokio::test]
    async fn templated_cidr_fans_out_across_zones() {
        let cloud = FakeCloud::new();
        let mut ctx = ProvisioningContext::new();
        let provisioner = NetworkProvisioner::new(&cloud, config(2));
        provisioner.provision(&mut ctx).await.unwrap();

        assert_eq!(ctx.get_list("subnet").unwrap().len(), 2);
        let subnets = cloud.subnet_requests();
        assert_eq!(subnets[0].1, "10.10.0.0/24");
        assert_eq!(subnets[0].2.as_deref(), Some("us-east-2a"));
        assert_eq!(subnets[1].1, "10.10.1.0/24");
        assert_eq!(subnets[1].2.as_deref(), Some("us-east-2b"));
    }

    #[tokio::test]
    async fn fixed_cidr_passes_no_zone() {
        let cloud = FakeCloud::new();
        let mut ctx = ProvisioningContext::new();
        let mut config = config(2);
        config.subnet_cidr = "10.10.0.0/24".to_string();
        let provisioner = NetworkProvisioner::new(&cloud, config);
        provisioner.provision(&mut ctx).await.unwrap();

        let subnets = cloud.subnet_requests();
        assert_eq!(subnets.len(), 2);
        assert!(subnets.iter().all(|s| s.1 == "10.10.0.0/24" && s.2.is_none()));
    }
}
