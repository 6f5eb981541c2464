use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::Chat;
use crate::{
    model::{Message, MessageDelete, MessageEdit, NewMessage, Notification, NotificationKind},
    realtime::{RoomKey, ServerEvent},
    session::Identity,
    store::ChatStore,
    AppError, AppResult,
};

pub const MAX_CONTENT_CHARS: usize = 4000;
pub const MAX_MEDIA: usize = 10;
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub reply_to_id: Option<Uuid>,
}

impl<S: ChatStore> Chat<S> {
    pub async fn send_message(&self, author: &Identity, room_id: Uuid, draft: SendMessage) -> AppResult<Message> {
        let SendMessage { content, media_urls, reply_to_id } = draft;
        let media_urls = check_media(media_urls)?;
        check_content(&content, !media_urls.is_empty())?;

        let parent = match reply_to_id {
            Some(parent_id) => Some(
                self.store
                    .get_message(parent_id)
                    .await?
                    .filter(|parent| parent.room_id == room_id)
                    .ok_or_else(|| AppError::validation("replyToId does not name a message in this room"))?,
            ),
            None => None,
        };

        let new = NewMessage {
            id: Uuid::now_v7(),
            room_id,
            sender_id: author.user_id,
            sender_name: author.user_name.clone(),
            content,
            media_urls,
            reply_to_id,
            created_at: self.now(),
        };
        self.store.insert_message(&new).await?;
        let message = Message::from(new);
        info!(message_id = %message.id, %room_id, sender = %author.user_id, "message sent");

        self.hub.publish(&RoomKey::from(room_id), &ServerEvent::NewMessage(message.clone()));

        if let Some(parent) = parent.filter(|p| p.sender_id != author.user_id && !p.is_deleted) {
            self.hub.notify(parent.sender_id, Notification {
                id: Uuid::now_v7(),
                kind: NotificationKind::Reply,
                room_id,
                message_id: message.id,
                actor_id: author.user_id,
                actor_name: author.user_name.clone(),
                preview: preview(&message.content),
                created_at: message.created_at,
            });
        }

        Ok(message)
    }

    pub async fn edit_message(&self, editor: &Identity, message_id: Uuid, content: String) -> AppResult<MessageEdit> {
        let message = self.load_message(message_id).await?;
        if message.sender_id != editor.user_id {
            return Err(AppError::Forbidden);
        }
        if message.is_deleted {
            return Err(AppError::InvalidState("message has been deleted"));
        }

        let now = self.now();
        if !within_edit_window(message.created_at, now, self.edit_window) {
            return Err(AppError::WindowExpired);
        }
        check_content(&content, !message.media_urls.is_empty())?;

        // a delete may have landed since the message was loaded
        if !self.store.update_content(message_id, &content, now).await? {
            return Err(AppError::InvalidState("message has been deleted"));
        }
        let edit = MessageEdit { message_id, content, is_edited: true, edited_at: now };
        info!(%message_id, editor = %editor.user_id, "message edited");

        self.hub.publish(&RoomKey::from(message.room_id), &ServerEvent::MessageEdit(edit.clone()));
        Ok(edit)
    }

    /// Soft-deletes: the row and id stay so replies still resolve, but the
    /// content and media are wiped.
    pub async fn delete_message(&self, requester: &Identity, message_id: Uuid) -> AppResult<MessageDelete> {
        let message = self.load_message(message_id).await?;
        if message.sender_id != requester.user_id {
            return Err(AppError::Forbidden);
        }
        if message.is_deleted {
            return Err(AppError::InvalidState("message has already been deleted"));
        }

        let now = self.now();
        if !self.store.soft_delete(message_id, now).await? {
            return Err(AppError::InvalidState("message has already been deleted"));
        }
        let deleted = MessageDelete { message_id, is_deleted: true, deleted_at: now };
        info!(%message_id, requester = %requester.user_id, "message deleted");

        self.hub.publish(&RoomKey::from(message.room_id), &ServerEvent::MessageDelete(deleted.clone()));
        Ok(deleted)
    }

    pub(super) async fn load_message(&self, message_id: Uuid) -> AppResult<Message> {
        self.store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }
}

/// The window is inclusive: an edit exactly `window` after creation is allowed.
pub(crate) fn within_edit_window(created_at: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    now - created_at <= window
}

fn check_content(content: &str, has_media: bool) -> AppResult<()> {
    if content.trim().is_empty() && !has_media {
        return Err(AppError::validation("message content cannot be empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::validation(format!("message content is longer than {MAX_CONTENT_CHARS} characters")));
    }
    Ok(())
}

fn check_media(media_urls: Vec<String>) -> AppResult<Vec<String>> {
    if media_urls.len() > MAX_MEDIA {
        return Err(AppError::validation(format!("at most {MAX_MEDIA} attachments per message")));
    }
    media_urls
        .into_iter()
        .map(|url| {
            let url = url.trim();
            if url.is_empty() {
                Err(AppError::validation("attachment url cannot be blank"))
            } else {
                Ok(url.to_owned())
            }
        })
        .collect()
}

fn preview(content: &str) -> String {
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_window_is_inclusive_to_the_millisecond() {
        let created = OffsetDateTime::UNIX_EPOCH;
        let window = Duration::from_secs(300);
        assert!(within_edit_window(created, created + time::Duration::minutes(5), window));
        assert!(!within_edit_window(
            created,
            created + time::Duration::minutes(5) + time::Duration::milliseconds(1),
            window,
        ));
    }

    #[test]
    fn test_content_rules() {
        assert!(check_content("  hi  ", false).is_ok());
        assert!(matches!(check_content(" \n\t ", false), Err(AppError::Validation(_))));
        assert!(check_content("", true).is_ok());
        assert!(check_content(&"a".repeat(MAX_CONTENT_CHARS + 1), false).is_err());
    }

    #[test]
    fn test_media_rules() {
        assert_eq!(check_media(vec![" https://b/x.png ".to_owned()]).unwrap(), vec!["https://b/x.png"]);
        assert!(check_media(vec!["  ".to_owned()]).is_err());
        assert!(check_media(vec!["u".to_owned(); MAX_MEDIA + 1]).is_err());
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(PREVIEW_CHARS + 5);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 1);
    }
}
