//! Room-based WebSocket Chat Relay Library
//!
//! A real-time chat relay built with tokio-tungstenite. Clients connect,
//! log into a named room with a nickname, and exchange chat messages and
//! typing indicators with everyone else in that room.
//!
//! # Features
//! - Nickname + room login
//! - Chat relay with process-wide increasing message ids
//! - Typing indicators
//! - Room user lists refreshed on every join and leave
//! - Slow receivers dropped instead of stalling the room
//! - Idle timeout, write timeout and keepalive pings per connection
//! - Graceful shutdown that flushes queued messages before closing
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the membership registry
//! - Each connection runs a read task (driving its `Session`) and a write
//!   task (draining its bounded outbound queue)
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::{mpsc, watch};
//! use chat_relay::{serve, ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(ServerConfig::default());
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!     serve(listener, cmd_tx, config, shutdown_rx).await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use handler::{handle_connection, serve};
pub use message::{ClientMessage, Payload, ServerMessage};
pub use registry::Registry;
pub use room::Room;
pub use server::{query_members, ChatServer, ServerCommand};
pub use session::{Session, SessionState};
pub use types::{ClientId, MessageId, RoomName};
