//! Fan-out delivery
//!
//! Pushes one serialized payload onto many outbound queues without ever
//! waiting on a single receiver. Connections whose queue cannot take the
//! payload are reported back so the caller can drop them.

use tracing::warn;

use crate::client::Client;
use crate::message::Payload;
use crate::types::ClientId;

/// Enqueue `payload` on every target
///
/// Returns the ids of targets that could not accept it (queue full or
/// writer gone). Those connections must be removed from the registry;
/// every other target has the payload queued behind anything enqueued
/// earlier.
pub fn deliver<'a, I>(targets: I, payload: &Payload) -> Vec<ClientId>
where
    I: IntoIterator<Item = &'a Client>,
{
    let mut laggards = Vec::new();

    for client in targets {
        if let Err(e) = client.try_deliver(payload) {
            warn!("Dropping {} ({}) from {}: {}", client.id, client.nick, client.room, e);
            laggards.push(client.id);
        }
    }

    laggards
}
