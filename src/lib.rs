pub mod appresult;
pub mod chat;
pub mod clock;
pub mod config;
pub mod db;
pub mod messages;
pub mod model;
pub mod realtime;
pub mod rooms;
pub mod session;
pub mod store;

use axum::{extract::FromRef, routing::get, Router};

pub use appresult::{AppError, AppResult};

use crate::{chat::Chat, db::SqliteStore, realtime::Hub};

pub type ChatService = Chat<SqliteStore>;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub chat: ChatService,
    pub hub: Hub,
}

impl AppState {
    /// The hub the chat service publishes to is the one the websocket
    /// endpoint registers connections with.
    pub fn new(chat: ChatService) -> Self {
        let hub = chat.hub().clone();
        Self { chat, hub }
    }
}

/// Every route of the app. Callers add the session layer that [`session::Identity`]
/// reads from.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(realtime::ws::connect))
        .route("/presence", get(realtime::ws::presence))
        .nest("/r", rooms::router())
        .nest("/m", messages::router())
}
