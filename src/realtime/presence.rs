use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConnectionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: Uuid,
    pub user_name: String,
}

struct PresenceEntry {
    user_name: String,
    connections: HashSet<ConnectionHandle>,
}

/// Who is online, counted per connection: a user stays online for as long
/// as any of their devices is announced.
#[derive(Default)]
pub(crate) struct Presence {
    users: HashMap<Uuid, PresenceEntry>,
}

impl Presence {
    /// Returns true if this made the user go online.
    pub(crate) fn attach(&mut self, user_id: Uuid, user_name: &str, handle: ConnectionHandle) -> bool {
        let entry = self.users.entry(user_id).or_insert_with(|| PresenceEntry {
            user_name: user_name.to_owned(),
            connections: HashSet::new(),
        });
        let was_offline = entry.connections.is_empty();
        entry.user_name = user_name.to_owned();
        entry.connections.insert(handle);
        was_offline
    }

    /// Returns the user's name if this made them go offline.
    pub(crate) fn detach(&mut self, user_id: Uuid, handle: ConnectionHandle) -> Option<String> {
        let entry = self.users.get_mut(&user_id)?;
        if !entry.connections.remove(&handle) || !entry.connections.is_empty() {
            return None;
        }
        self.users.remove(&user_id).map(|e| e.user_name)
    }

    pub(crate) fn is_online(&self, user_id: Uuid) -> bool {
        self.users.contains_key(&user_id)
    }

    pub(crate) fn online_users(&self) -> Vec<OnlineUser> {
        let mut users: Vec<_> = self.users
            .iter()
            .map(|(user_id, entry)| OnlineUser { user_id: *user_id, user_name: entry.user_name.clone() })
            .collect();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name).then(a.user_id.cmp(&b.user_id)));
        users
    }
}
