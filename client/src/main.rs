use clap::Parser;
use client::handshake::{Attestation, HandshakeBuilder};
use client::network::{Client, SessionOutcome};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name reported to the server
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Comma-separated mods in modid[:version[:hash]] form
    #[arg(short = 'm', long, default_value = "")]
    mods: String,

    /// Hex-encoded Ed25519 secret key used to sign the integrity attestation
    #[arg(short = 'k', long)]
    signing_key: Option<PathBuf>,

    /// Text describing the installation; its SHA-256 is what gets attested
    #[arg(long, default_value = "default-install")]
    install: String,

    /// Anti-cheat signature hash to report
    #[arg(long, default_value = "anticheat")]
    anti_cheat: String,

    /// Connect without sending any handshake messages
    #[arg(long)]
    vanilla: bool,

    /// Seconds to stay connected
    #[arg(short = 't', long, default_value = "10")]
    stay: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let attestation = match &args.signing_key {
        Some(path) => Attestation::Signed(HandshakeBuilder::load_signing_key(path)?),
        None => {
            warn!("No signing key given, sending legacy integrity flag");
            Attestation::LegacyFlag(true)
        }
    };
    let builder = HandshakeBuilder::new(attestation);

    let mut client = Client::new(&args.server, &args.name).await?;
    client.connect(Duration::from_secs(5)).await?;

    if !args.vanilla {
        let mods = shared::split_mod_list(&args.mods);
        info!("Reporting {} mods", mods.len());
        client
            .send_handshake(&builder.packets(&mods, &args.install, &args.anti_cheat))
            .await?;
    }

    match client.run(Duration::from_secs(args.stay)).await? {
        SessionOutcome::Connected => {
            info!("Still connected after {}s, leaving", args.stay);
            client.disconnect().await?;
        }
        SessionOutcome::Disconnected { reason } => {
            info!("Server ended the session: {}", reason);
        }
    }

    Ok(())
}
