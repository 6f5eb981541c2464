//! The websocket endpoint against a real listener and a real client.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hearthchat::{
    chat::{Chat, SendMessage},
    db::SqliteStore,
    realtime::{Hub, PresenceStatus, RoomKey, ServerEvent},
    router,
    session::Identity,
    AppState, ChatService,
};
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::{sleep, timeout}};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    url: String,
    hub: Hub,
    chat: ChatService,
}

async fn start_server() -> Server {
    let store = SqliteStore::in_memory().await.unwrap();
    let chat = Chat::new(store, Hub::default());
    let hub = chat.hub().clone();
    let app = router().with_state(AppState::new(chat.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server { url: format!("ws://{addr}/ws"), hub, chat }
}

async fn connect(server: &Server) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(server.url.as_str()).await.unwrap();
    ws
}

async fn send_event(ws: &mut Client, event: Value) {
    ws.send(Message::text(event.to_string())).await.unwrap();
}

async fn next_event(ws: &mut Client) -> ServerEvent {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let waited = timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn test_client_events_apply_and_room_events_arrive() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let user = Uuid::now_v7();
    let room = Uuid::now_v7();

    send_event(&mut ws, json!({ "event": "user-online", "data": { "userId": user, "userName": "Mom" } })).await;
    assert_eq!(next_event(&mut ws).await, ServerEvent::UserStatusChange {
        user_id: user,
        user_name: Some("Mom".to_owned()),
        status: PresenceStatus::Online,
    });

    send_event(&mut ws, json!({ "event": "join-room", "data": room })).await;
    eventually("room join", || server.hub.member_count(&RoomKey::from(room)) == 1).await;

    let message = server.chat
        .send_message(&Identity::new(user, "Mom"), room, SendMessage { content: "home by 9".to_owned(), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, ServerEvent::NewMessage(message));
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let room = Uuid::now_v7();

    ws.send(Message::text("definitely not json")).await.unwrap();
    send_event(&mut ws, json!({ "event": "drop-tables", "data": null })).await;
    ws.send(Message::binary(vec![0xff, 0x00, 0x13])).await.unwrap();
    send_event(&mut ws, json!({ "event": "join-room", "data": room })).await;

    eventually("room join after bad frames", || server.hub.member_count(&RoomKey::from(room)) == 1).await;
    assert_eq!(server.hub.connection_count(), 1);
}

#[tokio::test]
async fn test_closing_the_socket_tears_the_connection_down() {
    let server = start_server().await;
    let (_watcher, mut watcher_rx) = server.hub.register();
    let mut ws = connect(&server).await;
    let user = Uuid::now_v7();
    let room = Uuid::now_v7();

    send_event(&mut ws, json!({ "event": "user-online", "data": { "userId": user, "userName": "Kid" } })).await;
    send_event(&mut ws, json!({ "event": "join-room", "data": room })).await;
    eventually("room join", || server.hub.member_count(&RoomKey::from(room)) == 1).await;
    assert!(server.hub.is_online(user));

    ws.close(None).await.unwrap();
    eventually("teardown", || server.hub.connection_count() == 1).await;
    assert!(!server.hub.is_online(user));
    assert_eq!(server.hub.member_count(&RoomKey::from(room)), 0);

    let mut statuses = Vec::new();
    while let Ok(frame) = watcher_rx.try_recv() {
        statuses.push(serde_json::from_str::<ServerEvent>(frame.as_str()).unwrap());
    }
    assert_eq!(statuses.last(), Some(&ServerEvent::UserStatusChange {
        user_id: user,
        user_name: Some("Kid".to_owned()),
        status: PresenceStatus::Offline,
    }));
}
