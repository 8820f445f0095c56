//! Per-connection session protocol
//!
//! Interprets inbound frames for one connection and turns the valid ones
//! into `ServerCommand`s. Anything malformed or out of order is dropped
//! silently; the peer never sees a protocol error.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::message::{ClientMessage, Payload};
use crate::server::ServerCommand;
use crate::types::{ClientId, RoomName};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no valid login yet
    Unauthenticated,
    /// Admitted to a room
    Joined,
    /// Transport gone
    Closed,
}

/// Protocol state for one connection
#[derive(Debug)]
pub struct Session {
    client_id: ClientId,
    nick: String,
    room: String,
    state: SessionState,
    /// Outbound queue sender, handed to the registry on join
    outbound: Option<mpsc::Sender<Payload>>,
}

impl Session {
    pub fn new(client_id: ClientId, outbound: mpsc::Sender<Payload>) -> Self {
        Self {
            client_id,
            nick: String::new(),
            room: String::new(),
            state: SessionState::Unauthenticated,
            outbound: Some(outbound),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Parse and handle one text frame
    pub fn handle_text(&mut self, text: &str) -> Option<ServerCommand> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg),
            Err(e) => {
                debug!("Ignoring malformed frame from {}: {}", self.client_id, e);
                None
            }
        }
    }

    /// Apply one inbound event
    ///
    /// Returns the command to forward to the server, if any.
    pub fn handle(&mut self, msg: ClientMessage) -> Option<ServerCommand> {
        match (self.state, msg) {
            (SessionState::Unauthenticated, ClientMessage::Login { nick, channel }) => {
                self.login(nick, channel)
            }
            (SessionState::Joined, ClientMessage::Login { .. }) => {
                debug!(
                    "Ignoring second login from {} (already in {})",
                    self.client_id, self.room
                );
                None
            }
            (SessionState::Joined, ClientMessage::Message { data }) => Some(ServerCommand::Chat {
                client_id: self.client_id,
                data,
            }),
            (SessionState::Joined, ClientMessage::Typing { typing }) => {
                Some(ServerCommand::Typing {
                    client_id: self.client_id,
                    typing,
                })
            }
            (state, msg) => {
                debug!(
                    "Dropping {:?} from {} in state {:?}",
                    msg, self.client_id, state
                );
                None
            }
        }
    }

    /// Record login fields; admit once both are present
    fn login(&mut self, nick: Option<String>, channel: Option<String>) -> Option<ServerCommand> {
        if let Some(nick) = nick {
            self.nick = nick.trim().to_string();
        }
        if let Some(channel) = channel {
            self.room = channel.trim().to_string();
        }

        if self.nick.is_empty() || self.room.is_empty() {
            debug!(
                "Incomplete login from {} (nick: {:?}, room: {:?})",
                self.client_id, self.nick, self.room
            );
            return None;
        }

        let sender = self.outbound.take()?;
        self.state = SessionState::Joined;
        info!("User {} logging into room {}", self.nick, self.room);

        Some(ServerCommand::Admit {
            client_id: self.client_id,
            nick: self.nick.clone(),
            room: RoomName::new(self.room.clone()),
            sender,
        })
    }

    /// Mark the session closed
    ///
    /// Returns the removal command the first time only.
    pub fn close(&mut self) -> Option<ServerCommand> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.state = SessionState::Closed;
        self.outbound = None;
        Some(ServerCommand::Disconnect {
            client_id: self.client_id,
        })
    }
}
