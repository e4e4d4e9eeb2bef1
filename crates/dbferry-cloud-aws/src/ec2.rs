//! EC2-backed networking and compute.

use async_trait::async_trait;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{Filter, InstanceType, IpPermission, IpRange, Tag};
use aws_sdk_ec2::Client;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dbferry_cloud::{
    CloudError, ComputeApi, IngressRule, InstanceSpec, NetworkApi, Result, SecurityGroupInfo,
};
use tracing::debug;

/// Status reported while the provider has no record of an instance yet.
const STATUS_UNKNOWN: &str = "does-not-exist";

const DUPLICATE_RULE_CODE: &str = "InvalidPermission.Duplicate";

pub struct Ec2Service {
    client: Client,
}

impl Ec2Service {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    async fn tag_name(&self, resource_id: &str, name: &str) -> Result<()> {
        let tag = Tag::builder().key("Name").value(name).build();
        self.client
            .create_tags()
            .resources(resource_id)
            .tags(tag)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateTags", e.into_service_error()))?;
        Ok(())
    }
}

#[async_trait]
impl NetworkApi for Ec2Service {
    async fn create_vpc(&self, cidr: &str) -> Result<String> {
        let resp = self
            .client
            .create_vpc()
            .cidr_block(cidr)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateVpc", e.into_service_error()))?;
        let id = resp
            .vpc()
            .and_then(|v| v.vpc_id())
            .ok_or_else(|| CloudError::InvalidResponse("CreateVpc returned no vpc id".into()))?;
        debug!(vpc_id = %id, %cidr, "created vpc");
        Ok(id.to_string())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr: &str, az: Option<&str>) -> Result<String> {
        let mut req = self.client.create_subnet().vpc_id(vpc_id).cidr_block(cidr);
        if let Some(az) = az {
            req = req.availability_zone(az);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CloudError::api("CreateSubnet", e.into_service_error()))?;
        let id = resp
            .subnet()
            .and_then(|s| s.subnet_id())
            .ok_or_else(|| {
                CloudError::InvalidResponse("CreateSubnet returned no subnet id".into())
            })?;
        Ok(id.to_string())
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        let resp = self
            .client
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| CloudError::api("CreateInternetGateway", e.into_service_error()))?;
        let id = resp
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .ok_or_else(|| {
                CloudError::InvalidResponse("CreateInternetGateway returned no gateway id".into())
            })?;
        Ok(id.to_string())
    }

    async fn attach_internet_gateway(&self, igw_id: &str, vpc_id: &str) -> Result<()> {
        self.client
            .attach_internet_gateway()
            .internet_gateway_id(igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| CloudError::api("AttachInternetGateway", e.into_service_error()))?;
        Ok(())
    }

    async fn create_route_table(&self, vpc_id: &str) -> Result<String> {
        let resp = self
            .client
            .create_route_table()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateRouteTable", e.into_service_error()))?;
        let id = resp
            .route_table()
            .and_then(|t| t.route_table_id())
            .ok_or_else(|| {
                CloudError::InvalidResponse("CreateRouteTable returned no route table id".into())
            })?;
        Ok(id.to_string())
    }

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> Result<()> {
        self.client
            .associate_route_table()
            .route_table_id(route_table_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| CloudError::api("AssociateRouteTable", e.into_service_error()))?;
        Ok(())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        igw_id: &str,
    ) -> Result<()> {
        self.client
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .gateway_id(igw_id)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateRoute", e.into_service_error()))?;
        Ok(())
    }

    async fn default_security_group(&self, vpc_id: &str) -> Result<String> {
        let resp = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .filters(Filter::builder().name("group-name").values("default").build())
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeSecurityGroups", e.into_service_error()))?;
        let id = resp
            .security_groups()
            .first()
            .and_then(|g| g.group_id())
            .ok_or_else(|| {
                CloudError::NotFound(format!("default security group of {vpc_id}"))
            })?;
        Ok(id.to_string())
    }

    async fn create_name_tag(&self, resource_id: &str, name: &str) -> Result<()> {
        self.tag_name(resource_id, name).await
    }
}

#[async_trait]
impl ComputeApi for Ec2Service {
    async fn create_key_pair(&self, name: &str) -> Result<String> {
        let resp = self
            .client
            .create_key_pair()
            .key_name(name)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateKeyPair", e.into_service_error()))?;
        let material = resp.key_material().ok_or_else(|| {
            CloudError::InvalidResponse("CreateKeyPair returned no key material".into())
        })?;
        Ok(material.to_string())
    }

    async fn list_key_pairs(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .describe_key_pairs()
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeKeyPairs", e.into_service_error()))?;
        Ok(resp
            .key_pairs()
            .iter()
            .filter_map(|k| k.key_name().map(str::to_string))
            .collect())
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<String> {
        let resp = self
            .client
            .create_security_group()
            .group_name(name)
            .description(description)
            .send()
            .await
            .map_err(|e| CloudError::api("CreateSecurityGroup", e.into_service_error()))?;
        let id = resp.group_id().ok_or_else(|| {
            CloudError::InvalidResponse("CreateSecurityGroup returned no group id".into())
        })?;
        Ok(id.to_string())
    }

    async fn list_security_groups(&self) -> Result<Vec<SecurityGroupInfo>> {
        let resp = self
            .client
            .describe_security_groups()
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeSecurityGroups", e.into_service_error()))?;
        Ok(resp
            .security_groups()
            .iter()
            .map(|g| SecurityGroupInfo {
                id: g.group_id().unwrap_or_default().to_string(),
                name: g.group_name().unwrap_or_default().to_string(),
                description: g.description().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<()> {
        let permission = IpPermission::builder()
            .ip_protocol(&rule.protocol)
            .from_port(rule.from_port)
            .to_port(rule.to_port)
            .ip_ranges(IpRange::builder().cidr_ip(&rule.cidr).build())
            .build();
        let result = self
            .client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_permissions(permission)
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                if err.as_service_error().and_then(|e| e.code()) == Some(DUPLICATE_RULE_CODE) {
                    Err(CloudError::DuplicateRule(group_id.to_string()))
                } else {
                    Err(CloudError::api(
                        "AuthorizeSecurityGroupIngress",
                        err.into_service_error(),
                    ))
                }
            }
        }
    }

    async fn run_instance(&self, spec: &InstanceSpec) -> Result<String> {
        let mut req = self
            .client
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .key_name(&spec.key_name)
            .min_count(1)
            .max_count(1);
        for group_id in &spec.security_group_ids {
            req = req.security_group_ids(group_id);
        }
        if let Some(script) = &spec.user_data {
            req = req.user_data(BASE64.encode(script));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CloudError::api("RunInstances", e.into_service_error()))?;
        let id = resp
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .ok_or_else(|| {
                CloudError::InvalidResponse("RunInstances returned no instance id".into())
            })?
            .to_string();
        self.tag_name(&id, &spec.name).await?;
        debug!(instance_id = %id, name = %spec.name, "launched instance");
        Ok(id)
    }

    async fn instance_status(&self, instance_id: &str) -> Result<String> {
        let resp = self
            .client
            .describe_instance_status()
            .instance_ids(instance_id)
            .include_all_instances(true)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeInstanceStatus", e.into_service_error()))?;
        let status = match resp.instance_statuses().first() {
            Some(s) => s
                .system_status()
                .and_then(|sys| sys.status())
                .map(|v| v.as_str().to_string())
                .unwrap_or_else(|| STATUS_UNKNOWN.to_string()),
            None => STATUS_UNKNOWN.to_string(),
        };
        Ok(status)
    }

    async fn instance_public_ip(&self, instance_id: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeInstances", e.into_service_error()))?;
        Ok(resp
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .and_then(|i| i.public_ip_address())
            .map(str::to_string))
    }

    async fn instance_public_dns(&self, instance_id: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeInstances", e.into_service_error()))?;
        Ok(resp
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .and_then(|i| i.public_dns_name())
            .filter(|dns| !dns.is_empty())
            .map(str::to_string))
    }

    async fn instance_image_description(&self, instance_id: &str) -> Result<String> {
        let resp = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeInstances", e.into_service_error()))?;
        let image_id = resp
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .and_then(|i| i.image_id())
            .ok_or_else(|| CloudError::NotFound(format!("image of instance {instance_id}")))?
            .to_string();
        let images = self
            .client
            .describe_images()
            .image_ids(&image_id)
            .send()
            .await
            .map_err(|e| CloudError::api("DescribeImages", e.into_service_error()))?;
        let description = images
            .images()
            .first()
            .and_then(|i| i.description())
            .ok_or_else(|| CloudError::NotFound(format!("description of image {image_id}")))?;
        Ok(description.to_string())
    }

    async fn create_name_tag(&self, resource_id: &str, name: &str) -> Result<()> {
        self.tag_name(resource_id, name).await
    }
}
