//! ChatServer Actor implementation
//!
//! The single task that owns the membership registry, the message id
//! counter and presence scheduling. Handlers talk to it over an mpsc
//! channel, so every admit, removal and broadcast is applied one at a time
//! and each fan-out sees a fully applied registry.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::fanout;
use crate::message::{encode, ChatRecord, Payload, ServerMessage};
use crate::registry::Registry;
use crate::types::{ClientId, MessageId, RoomName};

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Session completed a valid login
    Admit {
        client_id: ClientId,
        nick: String,
        room: RoomName,
        sender: mpsc::Sender<Payload>,
    },
    /// Connection closed or failed
    Disconnect {
        client_id: ClientId,
    },
    /// Relay a chat message to the sender's room
    Chat {
        client_id: ClientId,
        data: Value,
    },
    /// Relay a typing indicator to the sender's room
    Typing {
        client_id: ClientId,
        typing: bool,
    },
    /// Nicknames currently in a room
    Members {
        room: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Announcement to every admitted connection
    Notice {
        text: String,
    },
}

/// The main ChatServer actor
///
/// Presence refreshes are queued rather than sent inline, and drained
/// once the current command is done. A removal triggered from inside a
/// fan-out therefore never waits on another delivery pass.
pub struct ChatServer {
    registry: Registry,
    /// Last id handed out; ids start at 1
    last_message_id: u64,
    /// Rooms whose user list must be resent, without duplicates
    pending_presence: VecDeque<RoomName>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: Registry::new(),
            last_message_id: 0,
            pending_presence: VecDeque::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
            self.flush_presence();
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Admit {
                client_id,
                nick,
                room,
                sender,
            } => {
                self.handle_admit(Client::new(client_id, nick, room, sender));
            }
            ServerCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id);
            }
            ServerCommand::Chat { client_id, data } => {
                self.handle_chat(client_id, data);
            }
            ServerCommand::Typing { client_id, typing } => {
                self.handle_typing(client_id, typing);
            }
            ServerCommand::Members { room, reply } => {
                let _ = reply.send(self.registry.members_of(&room));
            }
            ServerCommand::Notice { text } => {
                self.handle_notice(text);
            }
        }
    }

    fn handle_admit(&mut self, client: Client) {
        let (client_id, room) = (client.id, client.room.clone());
        let nick = client.nick.clone();

        match self.registry.admit(client) {
            Ok(()) => {
                info!("User {} ({}) joined room {}", nick, client_id, room);
                self.log_totals();
                self.schedule_presence(room);
            }
            Err(e) => {
                warn!("Refused admission of {}: {}", client_id, e);
            }
        }
    }

    fn handle_disconnect(&mut self, client_id: ClientId) {
        // Dropping the record closes the outbound queue.
        let Some(client) = self.registry.remove(client_id) else {
            debug!("Client {} was not registered", client_id);
            return;
        };

        info!("User {} ({}) left room {}", client.nick, client_id, client.room);
        self.log_totals();
        self.schedule_presence(client.room);
    }

    fn log_totals(&self) {
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.registry.client_count(),
            self.registry.room_count()
        );
    }

    fn handle_chat(&mut self, client_id: ClientId, data: Value) {
        let Some(client) = self.registry.get(client_id) else {
            debug!("Chat from unregistered client {}", client_id);
            return;
        };
        let from = client.nick.clone();
        let room = client.room.clone();

        let msg = ServerMessage::NewMessage {
            message: ChatRecord {
                id: self.next_message_id(),
                from,
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                data,
            },
        };

        match encode(&msg) {
            Ok(payload) => self.deliver_to_room(&room, &payload),
            Err(e) => error!("Failed to serialize message for {}: {}", room, e),
        }
    }

    fn handle_typing(&mut self, client_id: ClientId, typing: bool) {
        let Some(client) = self.registry.get(client_id) else {
            return;
        };
        let room = client.room.clone();

        let msg = ServerMessage::Typing {
            user: client.nick.clone(),
            typing,
        };

        match encode(&msg) {
            Ok(payload) => self.deliver_to_room(&room, &payload),
            Err(e) => error!("Failed to serialize typing event for {}: {}", room, e),
        }
    }

    fn handle_notice(&mut self, text: String) {
        let payload = match encode(&ServerMessage::Notice { text }) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize notice: {}", e);
                return;
            }
        };

        let laggards = fanout::deliver(self.registry.snapshot_all(), &payload);
        self.drop_laggards(laggards);
    }

    /// Fan a payload out to one room, dropping anyone who can't keep up
    fn deliver_to_room(&mut self, room: &RoomName, payload: &Payload) {
        let laggards = fanout::deliver(self.registry.room_members(room.as_str()), payload);
        self.drop_laggards(laggards);
    }

    fn drop_laggards(&mut self, laggards: Vec<ClientId>) {
        for client_id in laggards {
            if let Some(client) = self.registry.remove(client_id) {
                self.schedule_presence(client.room);
            }
        }
    }

    fn schedule_presence(&mut self, room: RoomName) {
        if !self.pending_presence.contains(&room) {
            self.pending_presence.push_back(room);
        }
    }

    /// Send queued user lists until no membership change is left unannounced
    fn flush_presence(&mut self) {
        while let Some(room) = self.pending_presence.pop_front() {
            self.refresh_presence(&room);
        }
    }

    /// Send the room's current user list to everyone in it
    fn refresh_presence(&mut self, room: &RoomName) {
        let users = self.registry.members_of(room.as_str());
        if users.is_empty() {
            debug!("Room {} is empty, no user list to send", room);
            return;
        }

        let payload = match encode(&ServerMessage::UserList { users }) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize user list for {}: {}", room, e);
                return;
            }
        };

        debug!("Sending user list to room {}: {}", room, payload);
        self.deliver_to_room(room, &payload);
    }

    fn next_message_id(&mut self) -> MessageId {
        self.last_message_id += 1;
        MessageId(self.last_message_id)
    }
}

/// Ask the actor for a room's nicknames
pub async fn query_members(
    cmd_tx: &mpsc::Sender<ServerCommand>,
    room: &str,
) -> Result<Vec<String>, AppError> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(ServerCommand::Members {
            room: room.to_string(),
            reply,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;
    rx.await.map_err(|_| AppError::ChannelSend)
}
