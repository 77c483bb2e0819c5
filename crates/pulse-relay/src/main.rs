//! pulse-relay: WebSocket publish/subscribe broker for voice presence and
//! signaling.
//!
//! Clients say hello, subscribe to topic patterns, and publish JSON
//! payloads to topics. The relay never inspects payloads; it only routes
//! them by topic. Delivery is at-most-once with no retention.

mod broker;
mod connection;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pulse_common::PulseError;
use pulse_config::PulseConfig;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::broker::Broker;
use crate::connection::handle_connection;

#[derive(Parser)]
#[command(name = "pulse-relay", about = "WebSocket pub/sub relay for pulse voice")]
struct Args {
    /// Port to listen on (overrides `relay.port`).
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides `relay.host`).
    #[arg(long)]
    host: Option<String>,

    /// Config file; defaults to the platform config path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level directive (overrides `logging.level`).
    #[arg(long)]
    log_level: Option<String>,
}

fn load(args: &Args) -> Result<PulseConfig, PulseError> {
    let config = match &args.config {
        Some(path) => pulse_config::load_config_from(path)?,
        None => pulse_config::load_config()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), PulseError> {
    let args = Args::parse();
    let config = load(&args)?;

    let default_directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| format!("pulse_relay={}", config.logging.level.as_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .init();

    let host = args.host.clone().unwrap_or(config.relay.host);
    let port = args.port.unwrap_or(config.relay.port);
    let hello_timeout = Duration::from_secs(config.relay.hello_timeout_secs);
    let broker = Broker::new();

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("pulse-relay listening on {}", addr);

    // Periodic connection count.
    let stats_broker = broker.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let count = stats_broker.count().await;
            tracing::debug!(connections = count, "Relay tick");
        }
    });

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let broker = broker.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, broker, hello_timeout).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
