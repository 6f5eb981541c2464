use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{model::{MessageDelete, MessageEdit}, session::Identity, AppResult, ChatService};

#[derive(Debug, Deserialize)]
pub(crate) struct EditMessageBody {
    content: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn edit_msg(
    State(chat): State<ChatService>,
    identity: Identity,
    Path(message_id): Path<Uuid>,
    body: Result<Json<EditMessageBody>, JsonRejection>,
) -> AppResult<Json<MessageEdit>> {
    let Json(EditMessageBody { content }) = body?;
    Ok(Json(chat.edit_message(&identity, message_id, content).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_msg(
    State(chat): State<ChatService>,
    identity: Identity,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<MessageDelete>> {
    Ok(Json(chat.delete_message(&identity, message_id).await?))
}
