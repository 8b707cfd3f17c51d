//! Bastion CLI - provision a bastion host with a private database, or roll
//! back resources left behind by an earlier run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bastion::{
    Compensator, ProvisionConfig, ProvisionError, Provisioner, ResourceLedger, ResourceRecord,
    RollbackReport,
};
use bastion_cloud::aws::Aws;
use bastion_cloud::{InMemoryProvider, InfraProvider};

/// Bastion CLI - network, bastion host and database provisioning.
#[derive(Parser)]
#[command(name = "bastion")]
#[command(about = "Provision a bastion host and private database, rolling back on failure")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "BASTION_LOG_JSON", default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the full environment.
    Create(CreateArgs),

    /// Tear down recorded resources, last-created first.
    ///
    /// Records are given in creation order, as `kind=id` flags, a YAML ledger
    /// file, or both (file records first).
    Rollback(RollbackArgs),
}

/// Where provider calls go.
#[derive(Args)]
struct Target {
    /// Cloud region (or set `AWS_REGION` env var).
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Override the AWS endpoint, e.g. for a local emulator.
    #[arg(long, env = "BASTION_AWS_ENDPOINT")]
    endpoint: Option<String>,

    /// Use the in-memory provider instead of AWS.
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[derive(Args)]
struct CreateArgs {
    /// YAML configuration file; flags override its values.
    #[arg(long, env = "BASTION_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    target: Target,

    /// Network address block (e.g., 10.0.0.0/16).
    #[arg(long)]
    vpc_cidr: Option<String>,

    /// Availability zone for the subnets (defaults to `<region>a`).
    #[arg(long)]
    zone: Option<String>,

    /// Existing key pair to install on the instance.
    #[arg(long, env = "BASTION_KEY_NAME")]
    key_name: Option<String>,

    /// Name tag of the bastion instance.
    #[arg(long)]
    instance_name: Option<String>,

    /// Machine image for the bastion instance.
    #[arg(long, env = "BASTION_IMAGE_ID")]
    image_id: Option<String>,

    /// Instance type (e.g., t2.micro).
    #[arg(long)]
    instance_type: Option<String>,

    /// Source block allowed to reach SSH.
    #[arg(long)]
    ssh_cidr: Option<String>,

    /// Database instance identifier.
    #[arg(long)]
    db_identifier: Option<String>,

    /// Database master username.
    #[arg(long, env = "BASTION_DB_USERNAME")]
    db_username: Option<String>,

    /// Database master password (or set `BASTION_DB_PASSWORD` env var).
    #[arg(long, env = "BASTION_DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Timeout in seconds for each provider call.
    #[arg(long)]
    step_timeout: Option<u64>,
}

#[derive(Args)]
struct RollbackArgs {
    /// Resource to tear down, as `kind=id` (repeatable, creation order).
    #[arg(long = "resource", value_name = "KIND=ID")]
    resources: Vec<ResourceRecord>,

    /// YAML ledger file listing resources in creation order.
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// YAML configuration file; supplies the region and retry policy.
    #[arg(long, env = "BASTION_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    target: Target,
}

fn load_config(path: Option<&Path>) -> Result<ProvisionConfig> {
    match path {
        Some(path) => Ok(ProvisionConfig::load(path)?),
        None => Ok(ProvisionConfig::default()),
    }
}

fn apply_overrides(config: &mut ProvisionConfig, args: &CreateArgs) {
    if let Some(region) = &args.target.region {
        config.region.clone_from(region);
    }
    if let Some(cidr) = &args.vpc_cidr {
        config.network_cidr.clone_from(cidr);
    }
    if args.zone.is_some() {
        config.availability_zone.clone_from(&args.zone);
    }
    if args.key_name.is_some() {
        config.instance.key_name.clone_from(&args.key_name);
    }
    if let Some(name) = &args.instance_name {
        config.instance.name.clone_from(name);
    }
    if let Some(image) = &args.image_id {
        config.instance.image_id.clone_from(image);
    }
    if let Some(instance_type) = &args.instance_type {
        config.instance.instance_type.clone_from(instance_type);
    }
    if let Some(cidr) = &args.ssh_cidr {
        config.instance.ssh_cidr.clone_from(cidr);
    }
    if let Some(identifier) = &args.db_identifier {
        config.database.identifier.clone_from(identifier);
    }
    if let Some(username) = &args.db_username {
        config.database.master_username.clone_from(username);
    }
    if let Some(password) = &args.db_password {
        config.database.master_password.clone_from(password);
    }
    if let Some(secs) = args.step_timeout {
        config.step_timeout_secs = secs;
    }
}

fn build_provider(region: &str, target: &Target) -> Result<Arc<dyn InfraProvider>> {
    if target.dry_run {
        info!("Dry run: using in-memory provider");
        return Ok(Arc::new(InMemoryProvider::new()));
    }

    let mut aws = Aws::new(region).context("Failed to create AWS provider")?;
    if let Some(endpoint) = &target.endpoint {
        aws = aws.with_endpoint(endpoint.clone());
    }
    Ok(Arc::new(aws))
}

/// Command that retries the failures worth retrying, in creation order.
fn retry_command(report: &RollbackReport) -> Option<String> {
    let mut flags: Vec<String> = report
        .failures()
        .filter(|failure| !failure.source.is_not_found())
        .map(|failure| format!("--resource {}", failure.record))
        .collect();
    if flags.is_empty() {
        return None;
    }
    // Teardown order back to creation order.
    flags.reverse();
    Some(format!("bastion rollback {}", flags.join(" ")))
}

fn print_rollback(report: &RollbackReport) {
    for entry in report.entries() {
        match entry {
            Ok(record) => println!("  🗑️  {record}"),
            Err(failure) => println!("  ⚠️  {}: {}", failure.record, failure.source),
        }
    }
    println!("  {report}");

    if let Some(command) = retry_command(report) {
        println!("\n📋 Retry the remaining resources with:");
        println!("  {command}");
    }
}

async fn create(args: CreateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    let provider = build_provider(&config.region, &args.target)?;

    println!(
        "\n🚀 Provisioning bastion environment in {} ({})...",
        config.region, config.network_cidr
    );

    match Provisioner::new(provider, config).provision().await {
        Ok(outcome) => {
            let env = &outcome.environment;
            println!("\n✅ Bastion environment ready! (run {})", outcome.run_id);
            println!("  Network:           {}", env.network_id);
            println!("  Internet gateway:  {}", env.gateway_id);
            println!("  Private subnets:   {}", env.private_subnet_ids.join(", "));
            println!("  Public subnet:     {}", env.public_subnet_id);
            println!("  Bastion instance:  {}", env.instance_id);
            println!("  Database:          {}", env.database_instance_id);
            println!("\n📁 Created resources (creation order):");
            for record in outcome.ledger.iter() {
                println!("   - {record}");
            }
            Ok(())
        }
        Err(ProvisionError::Configuration(e)) => Err(e.into()),
        Err(ProvisionError::Step { failure, report }) => {
            println!("\n❌ Provisioning failed: {failure}");
            println!("\n🔄 Rollback of {} recorded resource(s):", report.len());
            print_rollback(&report);
            Ok(())
        }
    }
}

async fn rollback(args: RollbackArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(region) = &args.target.region {
        config.region.clone_from(region);
    }

    let mut ledger = match &args.ledger {
        Some(path) => ResourceLedger::load(path)?,
        None => ResourceLedger::new(),
    };
    ledger.extend(args.resources);

    if args.target.dry_run {
        info!("Dry run: using in-memory provider seeded with the listed resources");
        let memory = InMemoryProvider::new();
        for record in ledger.iter() {
            memory.insert_existing(record.id()).await;
        }
        return run_rollback(Arc::new(memory), &config, ledger).await;
    }

    let provider = build_provider(&config.region, &args.target)?;
    run_rollback(provider, &config, ledger).await
}

async fn run_rollback(
    provider: Arc<dyn InfraProvider>,
    config: &ProvisionConfig,
    ledger: ResourceLedger,
) -> Result<()> {
    println!("\n🔄 Rolling back {} resource(s)...", ledger.len());
    let compensator = Compensator::new(provider, config.retry_config());
    let report = compensator.rollback(ledger).await;
    print_rollback(&report);
    if report.is_clean() {
        println!("\n✅ Rollback complete");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Create(args) => create(args).await,
        Commands::Rollback(args) => rollback(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_cloud::memory::{Fault, Operation};
    use bastion::RetryConfig;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["bastion"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_flags_override_config_file() {
        let Commands::Create(args) = parse(&[
            "create",
            "--region",
            "eu-west-1",
            "--vpc-cidr",
            "10.8.0.0/16",
            "--instance-type",
            "t3.small",
            "--step-timeout",
            "60",
        ]) else {
            panic!("expected create");
        };
        let mut config = ProvisionConfig::from_yaml(
            r"
region: us-west-2
network_cidr: 172.16.0.0/16
instance:
  instance_type: t3.large
  name: from-file
",
        )
        .unwrap();

        apply_overrides(&mut config, &args);

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.network_cidr, "10.8.0.0/16");
        assert_eq!(config.instance.instance_type, "t3.small");
        assert_eq!(config.step_timeout_secs, 60);
        // Not given on the command line.
        assert_eq!(config.instance.name, "from-file");
    }

    #[test]
    fn test_rollback_accepts_config_and_records() {
        let Commands::Rollback(args) = parse(&[
            "rollback",
            "--config",
            "bastion.yaml",
            "--resource",
            "network=vpc-1",
            "--resource",
            "subnet=subnet-2",
        ]) else {
            panic!("expected rollback");
        };

        assert_eq!(args.config, Some(PathBuf::from("bastion.yaml")));
        let ids: Vec<&str> = args.resources.iter().map(ResourceRecord::id).collect();
        assert_eq!(ids, vec!["vpc-1", "subnet-2"]);
    }

    #[tokio::test]
    async fn test_retry_command_lists_failures_in_creation_order() {
        let provider = Arc::new(InMemoryProvider::new());
        for id in ["vpc-1", "subnet-1", "sg-1"] {
            provider.insert_existing(id).await;
        }
        provider
            .inject(Operation::DeleteSecurityGroup, Fault::Rejected)
            .await;
        provider
            .inject(Operation::DeleteNetwork, Fault::Rejected)
            .await;

        let ledger: ResourceLedger = [
            "network=vpc-1",
            "subnet=subnet-1",
            "security-group=sg-1",
            "subnet=subnet-gone",
        ]
        .iter()
        .map(|s| s.parse::<ResourceRecord>().unwrap())
        .collect();
        let retry = RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        };
        let report = Compensator::new(provider, retry).rollback(ledger).await;

        assert_eq!(
            retry_command(&report).as_deref(),
            Some("bastion rollback --resource network=vpc-1 --resource security-group=sg-1")
        );
    }

    #[tokio::test]
    async fn test_no_retry_command_when_only_missing() {
        let provider = Arc::new(InMemoryProvider::new());
        let ledger: ResourceLedger =
            std::iter::once("subnet=subnet-gone".parse::<ResourceRecord>().unwrap()).collect();
        let report = Compensator::new(provider, RetryConfig::none())
            .rollback(ledger)
            .await;

        assert!(!report.is_clean());
        assert_eq!(retry_command(&report), None);
    }
}
