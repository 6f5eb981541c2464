use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::{ClientEvent, Hub, OnlineUser};

#[debug_handler(state = crate::AppState)]
pub async fn connect(State(hub): State<Hub>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_connection(hub, stream))
}

/// Pumps one websocket: client frames into the hub, the connection's
/// outbound queue back out. Returns once either side goes away.
pub(crate) async fn serve_connection(hub: Hub, stream: WebSocket) {
    let (handle, mut outbound) = hub.register();
    let (mut sender, mut receiver) = stream.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let reader_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let data = match msg {
                Message::Text(text) => text.as_str().as_bytes().to_vec(),
                Message::Binary(bytes) => bytes.to_vec(),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            match serde_json::from_slice::<ClientEvent>(&data) {
                Ok(event) => reader_hub.handle_client_event(handle, event),
                Err(err) => warn!(%handle, "ignoring malformed client event: {err}"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    debug!(%handle, "websocket finished");
    hub.disconnect(handle);
}

#[debug_handler(state = crate::AppState)]
pub async fn presence(State(hub): State<Hub>) -> Json<Vec<OnlineUser>> {
    Json(hub.online_users())
}
