use clap::Parser;
use log::{error, info};
use server::config::ConfigFile;
use server::network::Server;
use server::orchestrator::ServiceContext;
use server::signature::SignatureVerifier;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// JSON policy configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File holding the hex-encoded Ed25519 public key for integrity checks
    #[arg(short = 'k', long)]
    public_key: Option<PathBuf>,

    /// Maximum number of simultaneous connections
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Override the configured grace period, in milliseconds
    #[arg(short, long)]
    grace_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => {
            info!("No configuration file given, using defaults");
            ConfigFile::default()
        }
    };

    let verifier = match &args.public_key {
        Some(path) => SignatureVerifier::load(path)?,
        None => SignatureVerifier::default(),
    };

    let mut settings = config.settings();
    if let Some(grace_ms) = args.grace_ms {
        settings.grace_period = Duration::from_millis(grace_ms);
    }

    info!(
        "Policy: {:?} behavior, {:?} integrity, grace period {:?}",
        config.behavior, config.integrity_mode, settings.grace_period
    );

    let context = ServiceContext::new(config.policy());
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, args.max_clients, settings, verifier, context).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
