//! Message lifecycle, reactions and read receipts against a real SQLite
//! store, checking both the persisted state and what the room observes.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use hearthchat::{
    chat::{Chat, SendMessage},
    clock::{Clock, ManualClock},
    db::SqliteStore,
    model::{NotificationKind, ReactionAction},
    realtime::{ConnectionHandle, Hub, RoomKey, ServerEvent},
    session::Identity,
    store::HistoryCursor,
    AppError,
};
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Fixture {
    chat: Chat<SqliteStore>,
    hub: Hub,
    clock: Arc<ManualClock>,
    room: Uuid,
    mom: Identity,
    kid: Identity,
}

async fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(OffsetDateTime::from_unix_timestamp(1_760_000_000).unwrap()));
    let hub = Hub::default();
    let store = SqliteStore::in_memory().await.unwrap();
    let chat = Chat::new(store, hub.clone()).with_clock(clock.clone());

    Fixture {
        chat,
        hub,
        clock,
        room: Uuid::now_v7(),
        mom: Identity::new(Uuid::now_v7(), "Mom"),
        kid: Identity::new(Uuid::now_v7(), "Kid"),
    }
}

impl Fixture {
    fn connect(&self, room: Uuid) -> (ConnectionHandle, mpsc::Receiver<Utf8Bytes>) {
        let (handle, rx) = self.hub.register();
        self.hub.join_room(handle, RoomKey::from(room));
        (handle, rx)
    }

    async fn say(&self, who: &Identity, content: &str) -> hearthchat::model::Message {
        self.chat
            .send_message(who, self.room, SendMessage { content: content.to_owned(), ..Default::default() })
            .await
            .unwrap()
    }
}

fn next_event(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Option<ServerEvent> {
    rx.try_recv().ok().map(|frame| serde_json::from_str(frame.as_str()).unwrap())
}

fn drain(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Vec<ServerEvent> {
    std::iter::from_fn(|| next_event(rx)).collect()
}

#[tokio::test]
async fn test_new_message_reaches_sender_and_room_only() {
    let f = fixture().await;
    let (_mom_conn, mut mom_rx) = f.connect(f.room);
    let (_kid_conn, mut kid_rx) = f.connect(f.room);
    let (_elsewhere, mut other_rx) = f.connect(Uuid::now_v7());

    let message = f.say(&f.mom, "dinner at 6").await;

    assert_eq!(next_event(&mut mom_rx), Some(ServerEvent::NewMessage(message.clone())));
    assert_eq!(next_event(&mut kid_rx), Some(ServerEvent::NewMessage(message.clone())));
    assert_eq!(next_event(&mut other_rx), None);

    assert_eq!(message.sender_id, f.mom.user_id);
    assert_eq!(message.created_at, f.clock.now());
    assert!(!message.is_edited && !message.is_deleted);
}

#[tokio::test]
async fn test_blank_message_is_rejected_without_side_effects() {
    let f = fixture().await;
    let (_conn, mut rx) = f.connect(f.room);

    let err = f.chat
        .send_message(&f.mom, f.room, SendMessage { content: "   \n".to_owned(), ..Default::default() })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(f.chat.history(f.room, None, None).await.unwrap().is_empty());
    assert_eq!(next_event(&mut rx), None);
}

#[tokio::test]
async fn test_media_only_message_is_accepted() {
    let f = fixture().await;
    let draft = SendMessage {
        content: String::new(),
        media_urls: vec!["https://blobs.example/beach.jpg".to_owned()],
        reply_to_id: None,
    };

    let message = f.chat.send_message(&f.kid, f.room, draft).await.unwrap();
    assert_eq!(message.media_urls, vec!["https://blobs.example/beach.jpg"]);
}

#[tokio::test]
async fn test_reply_must_stay_in_room_and_notifies_author() {
    let f = fixture().await;
    let original = f.say(&f.mom, "who took the car keys?").await;

    let (mom_conn, mut mom_rx) = f.hub.register();
    f.hub.announce_online(mom_conn, f.mom.user_id, "Mom");
    assert!(f.hub.join_notifications(mom_conn, f.mom.user_id));
    drain(&mut mom_rx);

    let cross_room = f.chat
        .send_message(&f.kid, Uuid::now_v7(), SendMessage {
            content: "me".to_owned(),
            reply_to_id: Some(original.id),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(cross_room, AppError::Validation(_)));

    let reply = f.chat
        .send_message(&f.kid, f.room, SendMessage {
            content: "me, sorry".to_owned(),
            reply_to_id: Some(original.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(reply.reply_to_id, Some(original.id));

    match next_event(&mut mom_rx) {
        Some(ServerEvent::Notification(n)) => {
            assert_eq!(n.kind, NotificationKind::Reply);
            assert_eq!(n.message_id, reply.id);
            assert_eq!(n.actor_id, f.kid.user_id);
            assert_eq!(n.preview, "me, sorry");
        }
        other => panic!("expected a reply notification, got {other:?}"),
    }
}

#[tokio::test]
async fn test_edit_window_boundary() {
    let f = fixture().await;
    let (_conn, mut rx) = f.connect(f.room);

    let on_time = f.say(&f.mom, "pick up milk").await;
    f.clock.advance(Duration::minutes(5));
    let edit = f.chat.edit_message(&f.mom, on_time.id, "pick up oat milk".to_owned()).await.unwrap();
    assert!(edit.is_edited);
    assert_eq!(edit.content, "pick up oat milk");

    let late = f.say(&f.mom, "pick up bread").await;
    f.clock.advance(Duration::minutes(5) + Duration::milliseconds(1));
    let err = f.chat.edit_message(&f.mom, late.id, "pick up rolls".to_owned()).await.unwrap_err();
    assert!(matches!(err, AppError::WindowExpired));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 3);
    assert_eq!(events[1], ServerEvent::MessageEdit(edit));

    let history = f.chat.history(f.room, None, None).await.unwrap();
    assert_eq!(history[0].message.content, "pick up oat milk");
    assert!(history[0].message.is_edited);
    assert_eq!(history[1].message.content, "pick up bread");
    assert!(!history[1].message.is_edited);
}

#[tokio::test]
async fn test_only_the_author_may_edit_or_delete() {
    let f = fixture().await;
    let message = f.say(&f.mom, "chores list").await;

    let edit = f.chat.edit_message(&f.kid, message.id, "no chores".to_owned()).await;
    assert!(matches!(edit, Err(AppError::Forbidden)));
    let delete = f.chat.delete_message(&f.kid, message.id).await;
    assert!(matches!(delete, Err(AppError::Forbidden)));

    let missing = f.chat.edit_message(&f.mom, Uuid::now_v7(), "x".to_owned()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_soft_delete_wipes_content_and_is_terminal() {
    let f = fixture().await;
    let (_conn, mut rx) = f.connect(f.room);
    let message = f.chat
        .send_message(&f.kid, f.room, SendMessage {
            content: "look".to_owned(),
            media_urls: vec!["https://blobs.example/cat.gif".to_owned()],
            reply_to_id: None,
        })
        .await
        .unwrap();

    let deleted = f.chat.delete_message(&f.kid, message.id).await.unwrap();
    assert!(deleted.is_deleted);

    let history = f.chat.history(f.room, None, None).await.unwrap();
    let stored = &history[0].message;
    assert_eq!(stored.id, message.id);
    assert_eq!(stored.content, "");
    assert!(stored.media_urls.is_empty());
    assert!(stored.is_deleted);
    assert_eq!(stored.deleted_at, Some(deleted.deleted_at));

    let edit = f.chat.edit_message(&f.kid, message.id, "undo".to_owned()).await;
    assert!(matches!(edit, Err(AppError::InvalidState(_))));
    let again = f.chat.delete_message(&f.kid, message.id).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));

    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&ServerEvent::MessageDelete(deleted)));
}

#[tokio::test]
async fn test_reaction_toggle_is_its_own_inverse() {
    let f = fixture().await;
    let message = f.say(&f.mom, "movie night?").await;
    let (_conn, mut rx) = f.connect(f.room);

    let first = f.chat.toggle_reaction(&f.kid, message.id, "🍿").await.unwrap();
    assert_eq!(first.action, ReactionAction::Added);
    let history = f.chat.history(f.room, None, None).await.unwrap();
    assert_eq!(history[0].reactions.len(), 1);
    assert_eq!(history[0].reactions[0].count, 1);
    assert_eq!(history[0].reactions[0].user_ids, vec![f.kid.user_id]);

    let second = f.chat.toggle_reaction(&f.kid, message.id, "🍿").await.unwrap();
    assert_eq!(second.action, ReactionAction::Removed);
    let history = f.chat.history(f.room, None, None).await.unwrap();
    assert!(history[0].reactions.is_empty());

    assert_eq!(drain(&mut rx), vec![
        ServerEvent::MessageReaction(first),
        ServerEvent::MessageReaction(second),
    ]);
}

#[tokio::test]
async fn test_reactions_from_several_users_aggregate() {
    let f = fixture().await;
    let message = f.say(&f.kid, "got an A!").await;
    let dad = Identity::new(Uuid::now_v7(), "Dad");

    f.chat.toggle_reaction(&f.mom, message.id, "🎉").await.unwrap();
    f.chat.toggle_reaction(&dad, message.id, "🎉").await.unwrap();
    f.chat.toggle_reaction(&dad, message.id, "❤️").await.unwrap();

    let history = f.chat.history(f.room, None, None).await.unwrap();
    let counts: Vec<(String, usize)> = history[0].reactions
        .iter()
        .map(|r| (r.emoji.clone(), r.count))
        .collect();
    assert!(counts.contains(&("🎉".to_owned(), 2)));
    assert!(counts.contains(&("❤️".to_owned(), 1)));

    let blank = f.chat.toggle_reaction(&dad, message.id, "  ").await;
    assert!(matches!(blank, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_read_receipt_upsert_is_idempotent() {
    let f = fixture().await;
    let message = f.say(&f.mom, "bedtime in 10").await;
    let (_conn, mut rx) = f.connect(f.room);

    let first = f.chat.mark_read(&f.kid, message.id).await.unwrap();
    f.clock.advance(Duration::seconds(42));
    let second = f.chat.mark_read(&f.kid, message.id).await.unwrap();
    assert_eq!(second.read_at, first.read_at + Duration::seconds(42));

    let history = f.chat.history(f.room, None, None).await.unwrap();
    assert_eq!(history[0].read_by, vec![second.clone()]);

    assert_eq!(drain(&mut rx), vec![ServerEvent::MessageRead(first), ServerEvent::MessageRead(second)]);
}

#[tokio::test]
async fn test_self_read_is_rejected() {
    let f = fixture().await;
    let message = f.say(&f.mom, "note to self").await;
    let (_conn, mut rx) = f.connect(f.room);

    let err = f.chat.mark_read(&f.mom, message.id).await.unwrap_err();
    assert!(matches!(err, AppError::SelfReadRejected));
    assert!(f.chat.history(f.room, None, None).await.unwrap()[0].read_by.is_empty());
    assert_eq!(next_event(&mut rx), None);
}

#[tokio::test]
async fn test_reacting_to_deleted_message_fails() {
    let f = fixture().await;
    let message = f.say(&f.mom, "oops").await;
    f.chat.delete_message(&f.mom, message.id).await.unwrap();

    let react = f.chat.toggle_reaction(&f.kid, message.id, "👍").await;
    assert!(matches!(react, Err(AppError::InvalidState(_))));
    let read = f.chat.mark_read(&f.kid, message.id).await;
    assert!(matches!(read, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_history_pages_backwards() {
    let f = fixture().await;
    let mut sent = Vec::new();
    for i in 0..5 {
        sent.push(f.say(&f.mom, &format!("line {i}")).await);
        f.clock.advance(Duration::seconds(1));
    }

    let latest = f.chat.history(f.room, None, Some(2)).await.unwrap();
    let ids: Vec<Uuid> = latest.iter().map(|v| v.message.id).collect();
    assert_eq!(ids, vec![sent[3].id, sent[4].id]);

    let older = f.chat.history(f.room, Some(HistoryCursor::before(&latest[0].message)), Some(10)).await.unwrap();
    let ids: Vec<Uuid> = older.iter().map(|v| v.message.id).collect();
    assert_eq!(ids, vec![sent[0].id, sent[1].id, sent[2].id]);
}

#[tokio::test]
async fn test_history_keeps_messages_sent_in_the_same_millisecond() {
    let f = fixture().await;
    let mut sent = Vec::new();
    for word in ["ready", "set", "go"] {
        sent.push(f.say(&f.kid, word).await.id);
    }

    let first = f.chat.history(f.room, None, Some(2)).await.unwrap();
    assert_eq!(first.len(), 2);
    let second = f.chat.history(f.room, Some(HistoryCursor::before(&first[0].message)), Some(2)).await.unwrap();
    assert_eq!(second.len(), 1);

    let mut seen: Vec<Uuid> = second.iter().chain(&first).map(|v| v.message.id).collect();
    seen.sort();
    sent.sort();
    assert_eq!(seen, sent);
}
