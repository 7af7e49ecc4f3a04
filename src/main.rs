//! Relay server binary
//!
//! ```bash
//! # Plain HTTP on port 8080
//! relay-server
//!
//! # Custom port, no request logging
//! relay-server --http-port 9090 --enable-log false
//!
//! # HTTP plus HTTPS
//! relay-server --https-port 8443 --cert-path server.crt --key-path server.key
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relay_rs::{RelayServer, ServerConfig, TlsConfig};

#[derive(Debug, Parser)]
#[command(name = "relay-server", version, about = "Streaming HTTP rendezvous relay")]
struct Args {
    /// Port for the plain HTTP listener
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Port for the HTTPS listener (requires --cert-path and --key-path)
    #[arg(long)]
    https_port: Option<u16>,

    /// PEM file with the TLS certificate chain
    #[arg(long)]
    cert_path: Option<PathBuf>,

    /// PEM file with the TLS private key
    #[arg(long)]
    key_path: Option<PathBuf>,

    /// Enable request logging
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    enable_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.enable_log {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let http_addr: SocketAddr = ([0, 0, 0, 0], args.http_port).into();
    let mut config = ServerConfig::with_addr(http_addr).enable_log(args.enable_log);

    match (args.https_port, args.cert_path, args.key_path) {
        (Some(port), Some(cert_path), Some(key_path)) => {
            let tls_addr: SocketAddr = ([0, 0, 0, 0], port).into();
            config = config.tls(TlsConfig::new(tls_addr, cert_path, key_path));
        }
        (None, None, None) => {}
        _ => bail!("--https-port, --cert-path and --key-path must be given together"),
    }

    let server = RelayServer::new(config);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server terminated with an error")
}
