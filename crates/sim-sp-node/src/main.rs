//! sim-sp: simulated storage provider
//!
//! Accepts storage deals over streams, downloads the piece archives over HTTP
//! and serves them back over HTTP and block exchange.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sim_sp_node::{ConfigOverrides, NodeConfig, NodeIdentity};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sim-sp")]
#[command(about = "Simulated storage provider node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the storage provider
    Run(RunArgs),

    /// Generate a new ed25519 peer identity
    GeneratePeer,
}

#[derive(Args)]
struct RunArgs {
    /// Stream transport listen multiaddrs
    #[arg(long, env = "SIM_SP_LISTEN", value_delimiter = ',')]
    listen: Vec<String>,

    /// Base64 protobuf-encoded private key
    #[arg(long, env = "SIM_SP_KEY", hide_env_values = true)]
    key: Option<String>,

    /// HTTP bind address, e.g. ":7778"
    #[arg(long, env = "SIM_SP_HTTP")]
    http: Option<String>,

    /// Directory holding piece archives
    #[arg(long, env = "SIM_SP_CAR_DIR")]
    car_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::GeneratePeer => generate_peer(),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => NodeConfig::default(),
    };
    config.apply(ConfigOverrides {
        listen: args.listen,
        key: args.key,
        http: args.http,
        car_dir: args.car_dir,
    });

    let mut node = sim_sp_node::start(config)
        .await
        .context("Failed to start storage provider")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
        }
        _ = node.stopped() => {}
    }
    node.shutdown().await;
    Ok(())
}

fn generate_peer() -> Result<()> {
    let identity = NodeIdentity::generate();
    let private_key = identity
        .private_key_base64()
        .context("Failed to encode generated key")?;

    println!("New peer generated using ed25519, keys are encoded in base64");
    println!("peer id     : {}", identity.peer_id());
    println!("public key  : {}", identity.public_key_base64());
    println!("private key : {private_key}");
    Ok(())
}
