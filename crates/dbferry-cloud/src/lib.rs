//! Cloud provider abstraction for dbferry.
//!
//! The provisioners only ever talk to the traits defined here; the AWS SDK
//! implementations live in `dbferry-cloud-aws`. Keeping the seam at this
//! level lets the provisioning pipeline run against in-memory fakes in tests.

pub mod api;
pub mod error;
pub mod handle;

pub use api::{
    ComputeApi, DatabaseApi, DbInstanceSpec, EndpointSide, EndpointSpec, IngressRule,
    InstanceSpec, NetworkApi, PublicIpProbe, ReplicationApi, ReplicationInstanceSpec,
    ReplicationTaskSpec, SecurityGroupInfo,
};
pub use error::{CloudError, Result};
pub use handle::{ResourceHandle, ResourceKind};
