use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{model::MessageView, session::Identity, store::HistoryCursor, AppError, AppResult, ChatService};

/// `before` alone pages by time; `before` + `beforeId` (the `createdAt` and
/// `id` of the oldest message already held) pages without gaps.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryQuery {
    #[serde(default, with = "time::serde::rfc3339::option")]
    before: Option<OffsetDateTime>,
    before_id: Option<Uuid>,
    limit: Option<u32>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    State(chat): State<ChatService>,
    _identity: Identity,
    Path(room_id): Path<Uuid>,
    Query(HistoryQuery { before, before_id, limit }): Query<HistoryQuery>,
) -> AppResult<Json<Vec<MessageView>>> {
    let cursor = match (before, before_id) {
        (Some(created_at), id) => Some(HistoryCursor { created_at, id }),
        (None, None) => None,
        (None, Some(_)) => return Err(AppError::validation("beforeId needs before")),
    };
    Ok(Json(chat.history(room_id, cursor, limit).await?))
}
