use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use axum::extract::ws::Utf8Bytes;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::AbortHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    presence::Presence,
    registry::{AnnouncedUser, Registry},
    rooms::RoomTable,
    typing::Typing,
    ClientEvent, ConnectionHandle, OnlineUser, PresenceStatus, RoomKey, ServerEvent,
};
use crate::model::Notification;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per connection before it is cut off.
    pub outbound_capacity: usize,
    pub typing_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            typing_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Default)]
struct HubState {
    registry: Registry,
    rooms: RoomTable,
    presence: Presence,
    typing: Typing,
}

/// The fan-out core: connection registry, room membership, presence and
/// typing state behind a single lock.
///
/// Publishing never waits on a subscriber. Each connection has a bounded
/// outbound queue; a connection whose queue is full when an event arrives is
/// torn down as if it had disconnected. Events published to a room from one
/// task reach each member in publish order.
#[derive(Clone)]
pub struct Hub {
    state: Arc<Mutex<HubState>>,
    config: HubConfig,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection. The receiver yields every frame addressed
    /// to it and closes once the connection is torn down.
    pub fn register(&self) -> (ConnectionHandle, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let handle = self.lock().registry.insert(tx);
        debug!(%handle, "connection registered");
        (handle, rx)
    }

    pub fn join_room(&self, handle: ConnectionHandle, room: RoomKey) -> bool {
        if room.is_notifications() {
            warn!(%handle, %room, "join-room refused for a notification channel");
            return false;
        }
        self.lock().join(handle, room)
    }

    pub fn leave_room(&self, handle: ConnectionHandle, room: &RoomKey) -> bool {
        self.lock().leave(handle, room)
    }

    /// Subscribes a connection to its own notification channel. Only the
    /// user the connection announced itself as may be joined.
    pub fn join_notifications(&self, handle: ConnectionHandle, user_id: Uuid) -> bool {
        let mut state = self.lock();
        let announced = state.registry
            .get(handle)
            .and_then(|conn| conn.user.as_ref())
            .map(|user| user.user_id);
        if announced != Some(user_id) {
            warn!(%handle, %user_id, "join-notifications for a user this connection has not announced");
            return false;
        }
        state.join(handle, RoomKey::notifications(user_id))
    }

    /// Releases everything the connection held. Only the first call for a
    /// handle does anything.
    pub fn disconnect(&self, handle: ConnectionHandle) -> bool {
        let torn_down = self.lock().teardown(handle);
        if torn_down {
            info!(%handle, "connection closed");
        }
        torn_down
    }

    /// Delivers `event` to every connection in `room`. Returns how many
    /// connections it was queued for.
    pub fn publish(&self, room: &RoomKey, event: &ServerEvent) -> usize {
        self.lock().publish_room(room, event, None)
    }

    pub fn publish_except(&self, room: &RoomKey, event: &ServerEvent, except: ConnectionHandle) -> usize {
        self.lock().publish_room(room, event, Some(except))
    }

    pub fn notify(&self, user_id: Uuid, notification: Notification) -> usize {
        self.publish(&RoomKey::notifications(user_id), &ServerEvent::Notification(notification))
    }

    pub fn announce_online(&self, handle: ConnectionHandle, user_id: Uuid, user_name: &str) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(conn) = state.registry.get_mut(handle) else {
            return;
        };

        let previous = conn.user.replace(AnnouncedUser { user_id, user_name: user_name.to_owned() });
        if let Some(previous) = previous.filter(|p| p.user_id != user_id) {
            state.leave(handle, &RoomKey::notifications(previous.user_id));
            state.detach_user(handle, previous);
        }

        if state.presence.attach(user_id, user_name, handle) {
            debug!(%handle, %user_id, "user online");
            state.publish_all(&ServerEvent::UserStatusChange {
                user_id,
                user_name: Some(user_name.to_owned()),
                status: PresenceStatus::Online,
            });
        }
    }

    pub fn announce_offline(&self, handle: ConnectionHandle, user_id: Uuid) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(conn) = state.registry.get_mut(handle) else {
            return;
        };
        if conn.user.as_ref().map(|u| u.user_id) != Some(user_id) {
            debug!(%handle, %user_id, "user-offline for a user this connection has not announced");
            return;
        }
        if let Some(user) = conn.user.take() {
            state.detach_user(handle, user);
        }
    }

    /// Tells the rest of the room the user is typing and (re)arms the
    /// inactivity timer. Repeated calls re-broadcast; receivers treat the
    /// event as idempotent.
    pub fn start_typing(&self, handle: ConnectionHandle, room: RoomKey, user_id: Uuid, user_name: String) -> usize {
        let mut state = self.lock();
        if !state.may_type(handle, &room, user_id) {
            return 0;
        }

        let generation = state.typing.next_generation();
        let timer = self.spawn_typing_timer(room.clone(), user_id, generation);
        state.typing.start(room.clone(), user_id, handle, generation, timer);
        state.publish_room(&room, &ServerEvent::UserTyping { user_id, user_name }, Some(handle))
    }

    pub fn stop_typing(&self, handle: ConnectionHandle, room: &RoomKey, user_id: Uuid) -> usize {
        let mut state = self.lock();
        if !state.may_type(handle, room, user_id) {
            return 0;
        }

        state.typing.stop(room, user_id);
        state.publish_room(room, &ServerEvent::UserStoppedTyping { user_id }, Some(handle))
    }

    fn spawn_typing_timer(&self, room: RoomKey, user_id: Uuid, generation: u64) -> AbortHandle {
        let hub = self.clone();
        let timeout = self.config.typing_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            hub.expire_typing(&room, user_id, generation);
        })
        .abort_handle()
    }

    fn expire_typing(&self, room: &RoomKey, user_id: Uuid, generation: u64) {
        let mut state = self.lock();
        if let Some(entry) = state.typing.expire(room, user_id, generation) {
            debug!(%room, %user_id, "typing expired");
            state.publish_room(room, &ServerEvent::UserStoppedTyping { user_id }, Some(entry.connection));
        }
    }

    /// Applies one event received from a client connection.
    pub fn handle_client_event(&self, handle: ConnectionHandle, event: ClientEvent) {
        use ClientEvent::*;
        match event {
            JoinRoom(room) => {
                self.join_room(handle, room);
            }
            LeaveRoom(room) => {
                self.leave_room(handle, &room);
            }
            TypingStart { room_id, user_id, user_name } => {
                self.start_typing(handle, room_id, user_id, user_name);
            }
            TypingStop { room_id, user_id } => {
                self.stop_typing(handle, &room_id, user_id);
            }
            UserOnline { user_id, user_name } => self.announce_online(handle, user_id, &user_name),
            UserOffline { user_id } => self.announce_offline(handle, user_id),
            JoinNotifications(user_id) => {
                self.join_notifications(handle, user_id);
            }
        }
    }

    pub fn online_users(&self) -> Vec<OnlineUser> {
        self.lock().presence.online_users()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.lock().presence.is_online(user_id)
    }

    pub fn is_typing(&self, room: &RoomKey, user_id: Uuid) -> bool {
        self.lock().typing.is_typing(room, user_id)
    }

    pub fn member_count(&self, room: &RoomKey) -> usize {
        self.lock().rooms.member_count(room)
    }

    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().registry.len()
    }
}

impl HubState {
    fn join(&mut self, handle: ConnectionHandle, room: RoomKey) -> bool {
        let Some(conn) = self.registry.get_mut(handle) else {
            return false;
        };
        conn.rooms.insert(room.clone());
        self.rooms.join(room, handle)
    }

    fn leave(&mut self, handle: ConnectionHandle, room: &RoomKey) -> bool {
        if let Some(conn) = self.registry.get_mut(handle) {
            conn.rooms.remove(room);
        }
        self.rooms.leave(room, handle)
    }

    /// Typing is only relayed for the user the connection announced, into a
    /// room it has joined.
    fn may_type(&self, handle: ConnectionHandle, room: &RoomKey, user_id: Uuid) -> bool {
        let Some(conn) = self.registry.get(handle) else {
            return false;
        };
        if conn.user.as_ref().map(|u| u.user_id) != Some(user_id) {
            warn!(%handle, %user_id, "typing event for a user this connection has not announced");
            return false;
        }
        if !conn.rooms.contains(room) {
            warn!(%handle, %room, "typing event for a room this connection has not joined");
            return false;
        }
        true
    }

    fn teardown(&mut self, handle: ConnectionHandle) -> bool {
        let Some(conn) = self.registry.remove(handle) else {
            return false;
        };

        for room in &conn.rooms {
            self.rooms.leave(room, handle);
        }
        for (room, user_id) in self.typing.drain_connection(handle) {
            self.publish_room(&room, &ServerEvent::UserStoppedTyping { user_id }, None);
        }
        if let Some(user) = conn.user {
            self.detach_user(handle, user);
        }
        true
    }

    fn detach_user(&mut self, handle: ConnectionHandle, user: AnnouncedUser) {
        if let Some(user_name) = self.presence.detach(user.user_id, handle) {
            debug!(%handle, user_id = %user.user_id, "user offline");
            self.publish_all(&ServerEvent::UserStatusChange {
                user_id: user.user_id,
                user_name: Some(user_name),
                status: PresenceStatus::Offline,
            });
        }
    }

    fn publish_room(&mut self, room: &RoomKey, event: &ServerEvent, except: Option<ConnectionHandle>) -> usize {
        let targets = self.rooms.members(room);
        self.deliver(targets, except, event)
    }

    fn publish_all(&mut self, event: &ServerEvent) -> usize {
        let targets = self.registry.handles();
        self.deliver(targets, None, event)
    }

    fn deliver(&mut self, targets: Vec<ConnectionHandle>, except: Option<ConnectionHandle>, event: &ServerEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(json) => Utf8Bytes::from(json),
            Err(err) => {
                error!(event = event.name(), "failed to encode event: {err}");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for handle in targets {
            if Some(handle) == except {
                continue;
            }
            let Some(conn) = self.registry.get(handle) else {
                continue;
            };
            match conn.outbound.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%handle, event = event.name(), "outbound queue full, dropping connection");
                    dead.push(handle);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%handle, event = event.name(), "outbound queue closed");
                    dead.push(handle);
                }
            }
        }

        for handle in dead {
            self.teardown(handle);
        }
        delivered
    }
}
