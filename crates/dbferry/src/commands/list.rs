//! `list` command: valid options from the bundled reference data, plus live
//! key pairs and security groups from the provider.

use clap::ValueEnum;
use colored::Colorize;
use dbferry_cloud::ComputeApi;
use dbferry_cloud_aws::{sdk_config, Ec2Service};
use dbferry_core::{ProvisioningContext, ResourceBundle};

#[derive(Clone, Copy, ValueEnum)]
pub enum ListTarget {
    #[value(name = "types")]
    Types,
    #[value(name = "key_pairs")]
    KeyPairs,
    #[value(name = "security_groups")]
    SecurityGroups,
    #[value(name = "regions")]
    Regions,
}

pub async fn handle(
    ctx: &ProvisioningContext,
    bundle: &ResourceBundle,
    target: ListTarget,
) -> anyhow::Result<()> {
    match target {
        ListTarget::Types => {
            println!(
                "{:<16} {:<40} {:>10} {:>6}",
                "API NAME".bold(),
                "NAME".bold(),
                "MEMORY".bold(),
                "VCPUS".bold()
            );
            for entry in bundle.instance_types()? {
                println!(
                    "{:<16} {:<40} {:>10} {:>6}",
                    entry.api_name, entry.name, entry.memory, entry.vcpus
                );
            }
        }
        ListTarget::Regions => {
            println!("{:<16} {}", "NAME".bold(), "DESCRIPTION".bold());
            for entry in bundle.regions()? {
                println!("{:<16} {}", entry.name, entry.description);
            }
        }
        ListTarget::KeyPairs => {
            let ec2 = live_client(ctx).await;
            println!("{}", "KEY NAME".bold());
            for name in ec2.list_key_pairs().await? {
                println!("{name}");
            }
        }
        ListTarget::SecurityGroups => {
            let ec2 = live_client(ctx).await;
            println!(
                "{:<22} {:<24} {}",
                "GROUP ID".bold(),
                "NAME".bold(),
                "DESCRIPTION".bold()
            );
            for group in ec2.list_security_groups().await? {
                println!("{:<22} {:<24} {}", group.id, group.name, group.description);
            }
        }
    }
    Ok(())
}

async fn live_client(ctx: &ProvisioningContext) -> Ec2Service {
    let config = sdk_config(ctx.get_str("region").map(str::to_string)).await;
    Ec2Service::new(&config)
}
