//! AWS SDK implementations of the dbferry cloud provider traits.

pub mod dms;
pub mod ec2;
pub mod ip;
pub mod rds;

pub use dms::DmsService;
pub use ec2::Ec2Service;
pub use ip::CheckIp;
pub use rds::RdsService;

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Load the shared SDK configuration, optionally pinned to a region.
pub async fn sdk_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}
