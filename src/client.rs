//! Client struct definition
//!
//! Represents an admitted connection as the registry sees it: who it is,
//! where it sits, and the sending half of its outbound queue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::Payload;
use crate::types::{ClientId, RoomName};

/// Registry record for a joined connection
///
/// Holds the only long-lived sender of the connection's outbound queue.
/// Dropping the record closes the queue, which ends the writer task.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Nickname fixed at join
    pub nick: String,
    /// Room fixed at join
    pub room: RoomName,
    /// Server → Client outbound queue
    sender: mpsc::Sender<Payload>,
}

impl Client {
    pub fn new(id: ClientId, nick: String, room: RoomName, sender: mpsc::Sender<Payload>) -> Self {
        Self {
            id,
            nick,
            room,
            sender,
        }
    }

    /// Enqueue a payload without waiting
    ///
    /// Fails when the queue is full or the writer is gone.
    pub fn try_deliver(&self, payload: &Payload) -> Result<(), SendError> {
        self.sender
            .try_send(payload.clone())
            .map_err(|e| match e {
                TrySendError::Full(_) => SendError::QueueFull,
                TrySendError::Closed(_) => SendError::ChannelClosed,
            })
    }
}
