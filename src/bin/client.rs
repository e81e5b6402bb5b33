//! Veilsocks client - CLI entry point
//!
//! Listens for plain SOCKS5 connections from local applications and
//! tunnels them encrypted to a veilsocks server.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veilsocks::agent::LocalAgent;
use veilsocks::{Config, VERSION};

#[derive(Parser, Debug)]
#[command(name = "veilsocks-client")]
#[command(version = VERSION)]
#[command(about = "Encrypted SOCKS5 tunnel, client side")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", default_value = "veilsocks.json")]
    config: PathBuf,

    /// Listen address (overrides config)
    #[arg(long = "listen")]
    listen: Option<String>,

    /// Remote server address (overrides config)
    #[arg(long = "remote")]
    remote: Option<String>,

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
    if let Some(remote) = args.remote {
        config.remote = remote;
    }
    if let Some(secret) = args.secret {
        config.secret = secret;
    }

    let cipher = config.build_cipher()?;
    let listen_addr = config.listen_addr()?;
    let remote_addr = config.remote_addr()?;

    let mut agent = LocalAgent::new(cipher, listen_addr, remote_addr);
    let cipher_name = config.cipher.clone();
    agent.set_on_listening(move |addr| {
        info!(
            "veilsocks-client {} ready on {} ({} cipher), forwarding to {}",
            VERSION, addr, cipher_name, remote_addr
        );
    });

    agent.listen().await?;
    Ok(())
}
