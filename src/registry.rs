//! Membership registry
//!
//! Tracks every admitted connection and partitions them by room. The
//! registry is plain data: it is owned by the `ChatServer` actor, which is
//! what serializes admits, removals and broadcasts against each other.

use std::collections::HashMap;

use tracing::debug;

use crate::client::Client;
use crate::error::AppError;
use crate::room::Room;
use crate::types::{ClientId, RoomName};

/// All admitted connections and their room partition
///
/// Invariant: a client id is in `clients` iff it is in exactly one room,
/// the one named by its record.
#[derive(Debug, Default)]
pub struct Registry {
    /// All admitted clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Non-empty rooms: RoomName -> Room
    rooms: HashMap<RoomName, Room>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client to the global set and to its room
    ///
    /// A connection may be admitted once; a second admit is refused and
    /// leaves the registry unchanged.
    pub fn admit(&mut self, client: Client) -> Result<(), AppError> {
        if self.clients.contains_key(&client.id) {
            return Err(AppError::AlreadyAdmitted(client.id));
        }

        self.rooms
            .entry(client.room.clone())
            .or_insert_with(Room::new)
            .add(client.id);
        self.clients.insert(client.id, client);

        Ok(())
    }

    /// Remove a client from the global set and from its room
    ///
    /// Returns the removed record, or None if the client was not admitted.
    /// Empty rooms are deleted.
    pub fn remove(&mut self, client_id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;

        if let Some(room) = self.rooms.get_mut(&client.room) {
            room.remove(client_id);
            if room.is_empty() {
                self.rooms.remove(&client.room);
                debug!("Room {} deleted (empty)", client.room);
            }
        }

        Some(client)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Nicknames of everyone in `room`, sorted
    ///
    /// An unknown or empty room name yields an empty list.
    pub fn members_of(&self, room: &str) -> Vec<String> {
        let mut nicks: Vec<String> = self
            .room_members(room)
            .map(|client| client.nick.clone())
            .collect();
        nicks.sort();
        nicks
    }

    /// Member records of `room`
    pub fn room_members<'a>(&'a self, room: &str) -> impl Iterator<Item = &'a Client> + 'a {
        self.rooms
            .get(room)
            .into_iter()
            .flat_map(|room| room.members())
            .filter_map(move |id| self.clients.get(&id))
    }

    /// Every admitted client regardless of room
    pub fn snapshot_all(&self) -> impl Iterator<Item = &Client> + '_ {
        self.clients.values()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
