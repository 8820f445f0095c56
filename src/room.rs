//! Room struct definition
//!
//! The set of connections currently joined to one room name.

use std::collections::HashSet;

use crate::types::ClientId;

/// Chat room
///
/// Only stores member ids; the member records and the room name live in
/// the registry.
#[derive(Debug, Default)]
pub struct Room {
    members: HashSet<ClientId>,
}

impl Room {
    /// Create an empty room
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member
    ///
    /// Returns false if the client was already a member.
    pub fn add(&mut self, client_id: ClientId) -> bool {
        self.members.insert(client_id)
    }

    /// Remove a member
    ///
    /// Returns true if the client was a member.
    pub fn remove(&mut self, client_id: ClientId) -> bool {
        self.members.remove(&client_id)
    }

    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
