//! Durable chat operations. Each write is validated, persisted and only then
//! published to the room; a failed publish never undoes a write.

mod lifecycle;
mod reactions;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    clock::{truncate_millis, Clock, SystemClock},
    model::{Message, MessageView, ReactionSummary},
    realtime::Hub,
    store::{ChatStore, HistoryCursor},
    AppResult,
};

pub use lifecycle::{SendMessage, MAX_CONTENT_CHARS, MAX_MEDIA};
pub use reactions::MAX_EMOJI_CHARS;

pub const DEFAULT_EDIT_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PAGE: u32 = 50;
pub const MAX_PAGE: u32 = 200;

#[derive(Clone)]
pub struct Chat<S> {
    store: S,
    hub: Hub,
    clock: Arc<dyn Clock>,
    edit_window: Duration,
}

impl<S: ChatStore> Chat<S> {
    pub fn new(store: S, hub: Hub) -> Self {
        Self {
            store,
            hub,
            clock: Arc::new(SystemClock),
            edit_window: DEFAULT_EDIT_WINDOW,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_edit_window(mut self, edit_window: Duration) -> Self {
        self.edit_window = edit_window;
        self
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    fn now(&self) -> OffsetDateTime {
        truncate_millis(self.clock.now())
    }

    /// A page of room history with reactions and receipts folded in; what a
    /// client rebuilds its view from after missing live events. The next
    /// older page starts at `HistoryCursor::before(&page[0].message)`.
    pub async fn history(&self, room_id: Uuid, before: Option<HistoryCursor>, limit: Option<u32>) -> AppResult<Vec<MessageView>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let messages = self.store.list_messages(room_id, before, limit).await?;
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();

        let mut reactions: BTreeMap<Uuid, BTreeMap<String, Vec<Uuid>>> = BTreeMap::new();
        for reaction in self.store.reactions_for(&ids).await? {
            reactions
                .entry(reaction.message_id)
                .or_default()
                .entry(reaction.emoji)
                .or_default()
                .push(reaction.user_id);
        }

        let mut receipts: BTreeMap<Uuid, Vec<_>> = BTreeMap::new();
        for receipt in self.store.receipts_for(&ids).await? {
            receipts.entry(receipt.message_id).or_default().push(receipt);
        }

        Ok(messages
            .into_iter()
            .map(|message: Message| {
                let summaries = reactions
                    .remove(&message.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(emoji, user_ids)| ReactionSummary { emoji, count: user_ids.len(), user_ids })
                    .collect();
                let read_by = receipts.remove(&message.id).unwrap_or_default();
                MessageView { message, reactions: summaries, read_by }
            })
            .collect())
    }
}
