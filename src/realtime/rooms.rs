use std::{collections::{HashMap, HashSet}, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConnectionHandle;

const NOTIFICATIONS_PREFIX: &str = "notifications:";

/// Name of a broadcast group: a chat room id, or a per-user
/// `notifications:<userId>` channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn notifications(user_id: Uuid) -> Self {
        Self(format!("{NOTIFICATIONS_PREFIX}{user_id}"))
    }

    pub fn is_notifications(&self) -> bool {
        self.0.starts_with(NOTIFICATIONS_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for RoomKey {
    fn from(room_id: Uuid) -> Self {
        Self(room_id.to_string())
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room membership. Rooms exist only while someone is in them.
#[derive(Default)]
pub(crate) struct RoomTable {
    rooms: HashMap<RoomKey, HashSet<ConnectionHandle>>,
}

impl RoomTable {
    /// Returns false if the connection was already a member.
    pub(crate) fn join(&mut self, room: RoomKey, handle: ConnectionHandle) -> bool {
        self.rooms.entry(room).or_default().insert(handle)
    }

    pub(crate) fn leave(&mut self, room: &RoomKey, handle: ConnectionHandle) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&handle);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    pub(crate) fn members(&self, room: &RoomKey) -> Vec<ConnectionHandle> {
        let mut members: Vec<_> = self.rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub(crate) fn member_count(&self, room: &RoomKey) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    pub(crate) fn len(&self) -> usize {
        self.rooms.len()
    }
}
