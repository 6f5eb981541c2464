//! Wire format of the event transport. Every frame is a JSON object
//! `{"event": "<name>", "data": <payload>}`.
//!
//! Deltas pushed to clients are safe to apply more than once: a client merges
//! messages, reactions and receipts by key and falls back to the history and
//! presence endpoints whenever it may have missed something.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PresenceStatus, RoomKey};
use crate::model::{Message, MessageDelete, MessageEdit, Notification, ReactionEvent, ReadReceipt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom(RoomKey),
    LeaveRoom(RoomKey),
    #[serde(rename_all = "camelCase")]
    TypingStart { room_id: RoomKey, user_id: Uuid, user_name: String },
    #[serde(rename_all = "camelCase")]
    TypingStop { room_id: RoomKey, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: Uuid, user_name: String },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: Uuid },
    JoinNotifications(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    NewMessage(Message),
    MessageEdit(MessageEdit),
    MessageDelete(MessageDelete),
    MessageRead(ReadReceipt),
    MessageReaction(ReactionEvent),
    #[serde(rename_all = "camelCase")]
    UserTyping { user_id: Uuid, user_name: String },
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserStatusChange {
        user_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        status: PresenceStatus,
    },
    Notification(Notification),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        use ServerEvent::*;
        match self {
            NewMessage(_) => "new-message",
            MessageEdit(_) => "message-edit",
            MessageDelete(_) => "message-delete",
            MessageRead(_) => "message-read",
            MessageReaction(_) => "message-reaction",
            UserTyping { .. } => "user-typing",
            UserStoppedTyping { .. } => "user-stopped-typing",
            UserStatusChange { .. } => "user-status-change",
            Notification(_) => "notification",
        }
    }
}
