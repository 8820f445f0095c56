//! WebSocket Chat Relay - Entry Point
//!
//! Parses flags, starts the ChatServer actor and accepts connections
//! until Ctrl-C, then notifies every client and closes connections.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_relay::config::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_INTERVAL, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_WRITE_TIMEOUT,
};
use chat_relay::{serve, ChatServer, ServerCommand, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "chat_relay")]
#[command(about = "Room-based WebSocket chat relay", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8090")]
    port: u16,

    /// Outbound messages buffered per connection before it is dropped
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Largest inbound message in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout_secs: u64,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = DEFAULT_PING_INTERVAL.as_secs())]
    ping_interval_secs: u64,

    /// Seconds allowed for a single write
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT.as_secs())]
    write_timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            addr: format!("{}:{}", self.host, self.port),
            queue_capacity: self.queue_capacity,
            max_message_size: self.max_message_size,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = Args::parse().into_config();
    config.validate()?;
    let config = Arc::new(config);

    // Start TCP listener
    let listener = TcpListener::bind(&config.addr).await?;
    info!("WebSocket Chat Relay listening on {}", listener.local_addr()?);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    let server = tokio::spawn(ChatServer::new(cmd_rx).run());

    info!("ChatServer actor started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(serve(listener, cmd_tx.clone(), config, shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");

    // The notice is queued ahead of the close frames.
    let _ = cmd_tx
        .send(ServerCommand::Notice {
            text: "Server is shutting down".to_string(),
        })
        .await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = listener_task.await {
        warn!("Listener task failed: {}", e);
    }

    // The actor drains pending commands once the last sender is gone.
    drop(cmd_tx);
    let _ = tokio::time::timeout(Duration::from_secs(1), server).await;
    info!("Shutdown complete");

    Ok(())
}
