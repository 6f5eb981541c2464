mod history;
mod msg;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{room_id}/messages", get(history::history).post(msg::send_msg))
}
