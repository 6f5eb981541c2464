use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Chat;
use crate::{
    model::{Notification, NotificationKind, Reaction, ReactionAction, ReactionEvent, ReadReceipt},
    realtime::{RoomKey, ServerEvent},
    session::Identity,
    store::ChatStore,
    AppError, AppResult,
};

pub const MAX_EMOJI_CHARS: usize = 16;
const TOGGLE_ATTEMPTS: u32 = 3;

impl<S: ChatStore> Chat<S> {
    /// Flips whether `user` has reacted to the message with `emoji`. Calling
    /// it twice restores the original state.
    pub async fn toggle_reaction(&self, user: &Identity, message_id: Uuid, emoji: &str) -> AppResult<ReactionEvent> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
            return Err(AppError::validation(format!("emoji must be 1 to {MAX_EMOJI_CHARS} characters")));
        }

        let message = self.load_message(message_id).await?;
        if message.is_deleted {
            return Err(AppError::InvalidState("message has been deleted"));
        }

        // A concurrent toggle can add the row between our delete and insert;
        // then our insert is a no-op and the toggle has to run again.
        let mut attempt = 0;
        let action = loop {
            if self.store.delete_reaction(message_id, user.user_id, emoji).await? {
                break ReactionAction::Removed;
            }
            let reaction = Reaction {
                message_id,
                user_id: user.user_id,
                user_name: user.user_name.clone(),
                emoji: emoji.to_owned(),
                created_at: self.now(),
            };
            if self.store.insert_reaction(&reaction).await? {
                break ReactionAction::Added;
            }

            attempt += 1;
            if attempt == TOGGLE_ATTEMPTS {
                warn!(%message_id, user = %user.user_id, emoji, "reaction toggle kept racing, giving up");
                return Err(AppError::InvalidState("reaction is being changed concurrently"));
            }
            debug!(%message_id, user = %user.user_id, emoji, attempt, "reaction toggle raced, retrying");
        };
        debug!(%message_id, user = %user.user_id, emoji, ?action, "reaction toggled");

        let event = ReactionEvent {
            message_id,
            user_id: user.user_id,
            user_name: user.user_name.clone(),
            emoji: emoji.to_owned(),
            action,
        };
        self.hub.publish(&RoomKey::from(message.room_id), &ServerEvent::MessageReaction(event.clone()));

        if action == ReactionAction::Added && message.sender_id != user.user_id {
            self.hub.notify(message.sender_id, Notification {
                id: Uuid::now_v7(),
                kind: NotificationKind::Reaction,
                room_id: message.room_id,
                message_id,
                actor_id: user.user_id,
                actor_name: user.user_name.clone(),
                preview: emoji.to_owned(),
                created_at: self.now(),
            });
        }

        Ok(event)
    }

    /// Records that `reader` has seen the message, refreshing the time on
    /// repeat calls. Every call is broadcast, repeats included.
    pub async fn mark_read(&self, reader: &Identity, message_id: Uuid) -> AppResult<ReadReceipt> {
        let message = self.load_message(message_id).await?;
        if message.sender_id == reader.user_id {
            return Err(AppError::SelfReadRejected);
        }
        if message.is_deleted {
            return Err(AppError::InvalidState("message has been deleted"));
        }

        let receipt = ReadReceipt {
            message_id,
            reader_id: reader.user_id,
            reader_name: reader.user_name.clone(),
            read_at: self.now(),
        };
        self.store.upsert_read(&receipt).await?;
        info!(%message_id, reader = %reader.user_id, "message read");

        self.hub.publish(&RoomKey::from(message.room_id), &ServerEvent::MessageRead(receipt.clone()));
        Ok(receipt)
    }
}
