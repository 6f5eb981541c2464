use std::{collections::{HashMap, HashSet}, fmt};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::RoomKey;

/// Opaque identity of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(Uuid);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "conn:{}", self.0.simple())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnnouncedUser {
    pub(crate) user_id: Uuid,
    pub(crate) user_name: String,
}

pub(crate) struct Connection {
    pub(crate) outbound: mpsc::Sender<Utf8Bytes>,
    pub(crate) user: Option<AnnouncedUser>,
    pub(crate) rooms: HashSet<RoomKey>,
}

/// Live connections and what each has joined. Not synchronized on its own;
/// the hub owns it behind its lock.
#[derive(Default)]
pub(crate) struct Registry {
    connections: HashMap<ConnectionHandle, Connection>,
}

impl Registry {
    pub(crate) fn insert(&mut self, outbound: mpsc::Sender<Utf8Bytes>) -> ConnectionHandle {
        let handle = ConnectionHandle(Uuid::now_v7());
        self.connections.insert(handle, Connection { outbound, user: None, rooms: HashSet::new() });
        handle
    }

    /// Returns `None` if the connection was already torn down.
    pub(crate) fn remove(&mut self, handle: ConnectionHandle) -> Option<Connection> {
        self.connections.remove(&handle)
    }

    pub(crate) fn get(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    pub(crate) fn get_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        self.connections.get_mut(&handle)
    }

    pub(crate) fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove_once() {
        let mut registry = Registry::default();
        let (tx, _rx) = mpsc::channel(4);
        let handle = registry.insert(tx);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(handle).is_some_and(|c| c.user.is_none() && c.rooms.is_empty()));

        assert!(registry.remove(handle).is_some());
        assert!(registry.remove(handle).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_handles_are_distinct() {
        let mut registry = Registry::default();
        let a = registry.insert(mpsc::channel(1).0);
        let b = registry.insert(mpsc::channel(1).0);
        assert_ne!(a, b);
        assert_eq!(registry.handles().len(), 2);
    }
}
