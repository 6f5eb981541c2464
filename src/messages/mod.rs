mod edit;
mod react;

use axum::{routing::{patch, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{message_id}", patch(edit::edit_msg).delete(edit::delete_msg))
        .route("/{message_id}/reactions", post(react::toggle_reaction))
        .route("/{message_id}/read", post(react::mark_read))
}
