pub mod ec2;
pub mod list;
pub mod migration;
