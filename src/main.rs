use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crescendo::config::AppConfig;
use crescendo::pipeline::{loader, schema_manager, transformer};
use crescendo::pipeline::loader::LocalJsonLoader;
use crescendo::provision::{AwsProvisioner, Provisioner};
use crescendo::warehouse::{PostgresWarehouse, SqliteWarehouse};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the TOML configuration file.
    #[clap(long, default_value = "crescendo.toml", value_parser = parse_path)]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the warehouse access role and start cluster creation.
    /// Returns immediately; check readiness with `status`.
    Provision,

    /// Print the cluster status and, once available, its endpoint.
    Status,

    /// Delete the cluster without a final snapshot.
    Teardown,

    /// Drop and recreate the staging and analytic tables.
    CreateTables {
        /// Run against a local SQLite database instead of the cluster.
        #[clap(long, value_parser = parse_path)]
        local: Option<PathBuf>,
    },

    /// Load the staging tables and populate the star schema.
    Etl {
        /// Run against a local SQLite database instead of the cluster.
        #[clap(long, value_parser = parse_path)]
        local: Option<PathBuf>,

        /// Directory of event log files (local mode only).
        #[clap(long, value_parser = parse_path)]
        log_data: Option<PathBuf>,

        /// Directory of song metadata files (local mode only).
        #[clap(long, value_parser = parse_path)]
        song_data: Option<PathBuf>,
    },
}

/// Resolve the cluster endpoint (config override or describe-cluster lookup)
/// and open a connection.
fn connect_cluster(config: &AppConfig) -> Result<PostgresWarehouse> {
    let cluster = config.cluster()?;
    let (host, port) = match &cluster.host {
        Some(host) => (host.clone(), cluster.port),
        None => {
            let provisioner = AwsProvisioner::new(config.aws()?)?;
            let description = provisioner.describe_cluster(&cluster.identifier)?;
            let endpoint = description.endpoint()?;
            (endpoint.host.clone(), endpoint.port)
        }
    };
    Ok(PostgresWarehouse::connect(&host, port, cluster)?)
}

/// The COPY credential reference: from the config when present, otherwise
/// resolved from the role name via the control API.
fn resolve_role_arn(config: &AppConfig) -> Result<String> {
    let cluster = config.cluster()?;
    if let Some(arn) = &cluster.iam_role_arn {
        return Ok(arn.clone());
    }
    let provisioner = AwsProvisioner::new(config.aws()?)?;
    Ok(provisioner.role_arn(&cluster.iam_role_name)?)
}

fn provision(config: &AppConfig) -> Result<()> {
    let cluster = config.cluster()?;
    let provisioner = AwsProvisioner::new(config.aws()?)?;
    let role_arn = provisioner.ensure_role(&cluster.iam_role_name)?;
    info!(role_arn = %role_arn, "warehouse access role ready");
    provisioner.create_cluster(cluster, &role_arn)?;
    println!("Cluster '{}' is being created.", cluster.identifier);
    println!("Role ARN: {}", role_arn);
    println!("Run 'crescendo status' until the cluster reports 'available'.");
    Ok(())
}

fn status(config: &AppConfig) -> Result<()> {
    let cluster = config.cluster()?;
    let provisioner = AwsProvisioner::new(config.aws()?)?;
    let description = provisioner.describe_cluster(&cluster.identifier)?;
    println!("Cluster:   {}", description.identifier);
    println!("Status:    {}", description.status);
    println!("Node type: {}", description.node_type);
    println!("Database:  {}", description.db_name);
    println!("User:      {}", description.master_username);
    if let Some(vpc_id) = &description.vpc_id {
        println!("VPC:       {}", vpc_id);
    }
    match &description.endpoint {
        Some(endpoint) => println!("Endpoint:  {}:{}", endpoint.host, endpoint.port),
        None => println!("Endpoint:  not ready"),
    }
    Ok(())
}

fn teardown(config: &AppConfig) -> Result<()> {
    let cluster = config.cluster()?;
    let provisioner = AwsProvisioner::new(config.aws()?)?;
    provisioner.delete_cluster(&cluster.identifier)?;
    println!("Cluster '{}' is being deleted.", cluster.identifier);
    Ok(())
}

fn create_tables(config: &AppConfig, local: Option<PathBuf>) -> Result<()> {
    match local {
        Some(path) => {
            let mut warehouse = SqliteWarehouse::open(path)?;
            schema_manager::recreate_all(&mut warehouse)?;
        }
        None => {
            let mut warehouse = connect_cluster(config)?;
            schema_manager::recreate_all(&mut warehouse)?;
        }
    }
    info!("schema rebuilt");
    Ok(())
}

fn etl(
    config: &AppConfig,
    local: Option<PathBuf>,
    log_data: Option<PathBuf>,
    song_data: Option<PathBuf>,
) -> Result<()> {
    match local {
        Some(path) => {
            let (log_dir, song_dir) = match (log_data, song_data) {
                (Some(log_dir), Some(song_dir)) => (log_dir, song_dir),
                _ => bail!("local mode requires --log-data and --song-data directories"),
            };
            let mut warehouse = SqliteWarehouse::open(path)?;
            let summary = LocalJsonLoader::new(log_dir, song_dir).load(&mut warehouse)?;
            info!(
                event_rows = summary.event_rows,
                song_rows = summary.song_rows,
                "staging load finished"
            );
            transformer::transform(&mut warehouse)?;
        }
        None => {
            let role_arn = resolve_role_arn(config)?;
            let mut warehouse = connect_cluster(config)?;
            loader::load_staging(&mut warehouse, config.storage()?, &role_arn)?;
            transformer::transform(&mut warehouse)?;
        }
    }
    info!("ETL finished");
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // The local-mode SQL commands work without any config file present.
    let config = if cli_args.config.exists() {
        AppConfig::load(&cli_args.config)?
    } else {
        AppConfig::default()
    };

    match cli_args.command {
        Command::Provision => provision(&config),
        Command::Status => status(&config),
        Command::Teardown => teardown(&config),
        Command::CreateTables { local } => create_tables(&config, local),
        Command::Etl {
            local,
            log_data,
            song_data,
        } => etl(&config, local, log_data, song_data),
    }
}
