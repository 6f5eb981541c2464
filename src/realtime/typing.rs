use std::collections::HashMap;

use tokio::task::AbortHandle;
use uuid::Uuid;

use super::{ConnectionHandle, RoomKey};

pub(crate) struct TypingEntry {
    pub(crate) connection: ConnectionHandle,
    generation: u64,
    timer: AbortHandle,
}

/// Who is typing where, each entry paired with its expiry timer.
///
/// A timer that fires after its entry was replaced or removed carries a
/// stale generation and is ignored.
#[derive(Default)]
pub(crate) struct Typing {
    entries: HashMap<(RoomKey, Uuid), TypingEntry>,
    next_generation: u64,
}

impl Typing {
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Records (or refreshes) an entry, cancelling any timer it replaces.
    pub(crate) fn start(
        &mut self,
        room: RoomKey,
        user_id: Uuid,
        connection: ConnectionHandle,
        generation: u64,
        timer: AbortHandle,
    ) {
        if let Some(old) = self.entries.insert((room, user_id), TypingEntry { connection, generation, timer }) {
            old.timer.abort();
        }
    }

    pub(crate) fn stop(&mut self, room: &RoomKey, user_id: Uuid) -> Option<TypingEntry> {
        let entry = self.entries.remove(&(room.clone(), user_id))?;
        entry.timer.abort();
        Some(entry)
    }

    pub(crate) fn expire(&mut self, room: &RoomKey, user_id: Uuid, generation: u64) -> Option<TypingEntry> {
        let key = (room.clone(), user_id);
        if self.entries.get(&key)?.generation != generation {
            return None;
        }
        self.entries.remove(&key)
    }

    /// Removes everything a connection was typing, cancelling the timers.
    pub(crate) fn drain_connection(&mut self, connection: ConnectionHandle) -> Vec<(RoomKey, Uuid)> {
        let keys: Vec<_> = self.entries
            .iter()
            .filter(|(_, entry)| entry.connection == connection)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(entry) = self.entries.remove(key) {
                entry.timer.abort();
            }
        }
        keys
    }

    pub(crate) fn is_typing(&self, room: &RoomKey, user_id: Uuid) -> bool {
        self.entries.contains_key(&(room.clone(), user_id))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
