use std::future::Future;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{Message, NewMessage, Reaction, ReadReceipt};

/// A position in a room's history. Messages sharing a millisecond are
/// ordered by id, so a cursor taken from a message never skips its
/// same-millisecond neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    pub created_at: OffsetDateTime,
    /// `None` selects everything strictly older than `created_at`.
    pub id: Option<Uuid>,
}

impl HistoryCursor {
    /// Everything older than `message`.
    pub fn before(message: &Message) -> Self {
        Self { created_at: message.created_at, id: Some(message.id) }
    }

    pub fn before_time(created_at: OffsetDateTime) -> Self {
        Self { created_at, id: None }
    }
}

/// Persistence for messages, reactions and read receipts.
///
/// Implementations must enforce uniqueness of `(message_id, user_id, emoji)`
/// for reactions and `(message_id, reader_id)` for receipts; the toggle and
/// upsert logic in [`crate::chat`] depends on it.
pub trait ChatStore: Clone + Send + Sync + 'static {
    fn insert_message(&self, msg: &NewMessage) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn get_message(&self, id: Uuid) -> impl Future<Output = anyhow::Result<Option<Message>>> + Send;

    /// Replaces the content of a live message. Returns false, writing
    /// nothing, if the message is missing or already deleted.
    fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;

    /// Clears content and media and flags the row deleted. The row stays.
    /// Returns false if the message is missing or already deleted.
    fn soft_delete(&self, id: Uuid, deleted_at: OffsetDateTime) -> impl Future<Output = anyhow::Result<bool>> + Send;

    /// Newest `limit` messages of a room older than `before` in
    /// `(created_at, id)` order, returned oldest first.
    fn list_messages(
        &self,
        room_id: Uuid,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> impl Future<Output = anyhow::Result<Vec<Message>>> + Send;

    /// Returns false if the reaction already existed.
    fn insert_reaction(&self, reaction: &Reaction) -> impl Future<Output = anyhow::Result<bool>> + Send;

    /// Returns false if there was nothing to delete.
    fn delete_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;

    fn reactions_for(&self, message_ids: &[Uuid]) -> impl Future<Output = anyhow::Result<Vec<Reaction>>> + Send;

    /// Creates the receipt or refreshes its `read_at`.
    fn upsert_read(&self, receipt: &ReadReceipt) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn receipts_for(&self, message_ids: &[Uuid]) -> impl Future<Output = anyhow::Result<Vec<ReadReceipt>>> + Send;
}
