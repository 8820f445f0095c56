//! Runtime configuration
//!
//! Connection limits and liveness timers. The binary fills this from
//! command line flags; tests build it directly.

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::AppError;

/// Default bind address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8090";

/// Per-connection outbound queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Channel buffer size for server commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Largest inbound message accepted (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Relay settings shared by every connection handler
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub addr: String,
    /// Capacity of each connection's outbound queue
    pub queue_capacity: usize,
    /// Buffer of the handler → server command channel
    pub command_buffer: usize,
    /// Maximum size of a single inbound message or frame
    pub max_message_size: usize,
    /// Connection is dropped when nothing is received for this long
    pub idle_timeout: Duration,
    /// Period of keepalive pings
    pub ping_interval: Duration,
    /// Deadline for a single outbound write
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Check settings that would otherwise fail at runtime
    ///
    /// The ping interval must be shorter than the idle timeout, or healthy
    /// but quiet peers would be dropped before their pong arrives.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.queue_capacity == 0 {
            return Err(AppError::Config("queue capacity must be positive".into()));
        }
        if self.command_buffer == 0 {
            return Err(AppError::Config("command buffer must be positive".into()));
        }
        if self.max_message_size == 0 {
            return Err(AppError::Config("max message size must be positive".into()));
        }
        if self.ping_interval.is_zero() || self.write_timeout.is_zero() {
            return Err(AppError::Config("timers must be non-zero".into()));
        }
        if self.ping_interval >= self.idle_timeout {
            return Err(AppError::Config(format!(
                "ping interval {:?} must be shorter than idle timeout {:?}",
                self.ping_interval, self.idle_timeout
            )));
        }
        Ok(())
    }

    /// WebSocket protocol limits applied at handshake
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}
