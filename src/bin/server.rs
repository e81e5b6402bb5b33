//! Veilsocks server - CLI entry point
//!
//! Accepts encrypted tunnels from veilsocks clients, performs the SOCKS5
//! handshake on the decrypted stream and relays to the real destinations.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veilsocks::agent::RemoteAgent;
use veilsocks::{Config, VERSION};

#[derive(Parser, Debug)]
#[command(name = "veilsocks-server")]
#[command(version = VERSION)]
#[command(about = "Encrypted SOCKS5 tunnel, server side")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", default_value = "veilsocks.json")]
    config: PathBuf,

    /// Listen address (overrides config)
    #[arg(long = "listen")]
    listen: Option<String>,

    /// Hex secret (overrides config)
    #[arg(long = "secret")]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("veilsocks=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load_or_init(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(secret) = args.secret {
        config.secret = secret;
    }

    let cipher = config.build_cipher()?;
    let listen_addr = config.listen_addr()?;

    let mut agent = RemoteAgent::new(cipher, listen_addr)?;
    let cipher_name = config.cipher.clone();
    agent.set_on_listening(move |addr| {
        info!(
            "veilsocks-server {} ready on {} ({} cipher)",
            VERSION, addr, cipher_name
        );
    });

    agent.listen().await?;
    Ok(())
}
