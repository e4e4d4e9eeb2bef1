mod commands;
mod validator;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::list::ListTarget;
use dbferry_core::{Properties, ProvisioningContext, ResourceBundle};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbferry", version)]
#[command(about = "Provision AWS resources and drive an Oracle to MariaDB migration", long_about = None)]
struct Cli {
    /// Properties file with the per-run parameters
    #[arg(
        short,
        long,
        default_value = "dbferry.properties",
        env = "DBFERRY_CONFIG"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an EC2 instance, deploying an artifact when one is configured
    Ec2,
    /// Run the full Oracle to MariaDB migration pipeline
    Migration,
    /// List valid options and live provider resources
    List {
        #[arg(value_enum)]
        target: ListTarget,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    println!("{}", "=== dbferry ===".bold());
    let props = Properties::load(&cli.config)?;
    let mut ctx = ProvisioningContext::new();
    for (key, value) in props.iter() {
        ctx.insert(key, value)?;
    }
    let bundle = ResourceBundle::discover()?;

    match cli.command {
        Commands::Ec2 => commands::ec2::handle(&mut ctx, &bundle).await,
        Commands::Migration => commands::migration::handle(&mut ctx, &bundle).await,
        Commands::List { target } => commands::list::handle(&ctx, &bundle, target).await,
    }
}
