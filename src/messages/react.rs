use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{model::{ReactionEvent, ReadReceipt}, session::Identity, AppResult, ChatService};

#[derive(Debug, Deserialize)]
pub(crate) struct ReactionBody {
    emoji: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn toggle_reaction(
    State(chat): State<ChatService>,
    identity: Identity,
    Path(message_id): Path<Uuid>,
    body: Result<Json<ReactionBody>, JsonRejection>,
) -> AppResult<Json<ReactionEvent>> {
    let Json(ReactionBody { emoji }) = body?;
    Ok(Json(chat.toggle_reaction(&identity, message_id, &emoji).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mark_read(
    State(chat): State<ChatService>,
    identity: Identity,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<ReadReceipt>> {
    Ok(Json(chat.mark_read(&identity, message_id).await?))
}
