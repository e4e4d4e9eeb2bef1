//! `migration` command: run the full Oracle → MariaDB pipeline.

use colored::Colorize;
use dbferry_cloud_aws::{sdk_config, CheckIp, DmsService, Ec2Service, RdsService};
use dbferry_core::{PollPolicy, ProvisioningContext, ResourceBundle};
use dbferry_provision::MigrationOrchestrator;

pub async fn handle(ctx: &mut ProvisioningContext, bundle: &ResourceBundle) -> anyhow::Result<()> {
    println!("{}", "Running database migration".blue());
    let config = sdk_config(ctx.get_str("region").map(str::to_string)).await;
    let ec2 = Ec2Service::new(&config);
    let rds = RdsService::new(&config);
    let dms = DmsService::new(&config);
    let probe = CheckIp::new();

    let orchestrator = MigrationOrchestrator::new(
        &ec2,
        &ec2,
        &rds,
        &dms,
        &probe,
        bundle,
        PollPolicy::default(),
    );
    orchestrator.run(ctx).await?;

    println!(
        "{}",
        "Data migration running, check the AWS console for progress".green()
    );
    Ok(())
}
