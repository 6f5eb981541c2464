use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{chat::SendMessage, model::Message, session::Identity, AppResult, ChatService};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_msg(
    State(chat): State<ChatService>,
    identity: Identity,
    Path(room_id): Path<Uuid>,
    body: Result<Json<SendMessage>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let Json(draft) = body?;
    let message = chat.send_message(&identity, room_id, draft).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
