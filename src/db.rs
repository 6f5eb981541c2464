use std::str::FromStr;

use anyhow::Context;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, QueryBuilder, Sqlite, SqlitePool,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    clock::{from_millis, to_millis},
    model::{Message, NewMessage, Reaction, ReadReceipt},
    store::{ChatStore, HistoryCursor},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    content TEXT NOT NULL,
    media_urls TEXT NOT NULL DEFAULT '[]',
    reply_to_id TEXT,
    is_edited INTEGER NOT NULL DEFAULT 0,
    edited_at INTEGER,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_by_room ON messages (room_id, created_at);

CREATE TABLE IF NOT EXISTS reactions (
    message_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    user_name TEXT NOT NULL,
    emoji TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, user_id, emoji)
);

CREATE TABLE IF NOT EXISTS read_receipts (
    message_id TEXT NOT NULL,
    reader_id TEXT NOT NULL,
    reader_name TEXT NOT NULL,
    read_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, reader_id)
);
"#;

#[derive(Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqliteStore> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("bad DATABASE_URL {database_url:?}"))?
            .create_if_missing(true);

        // every connection to :memory: is its own database
        let in_memory = database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let db_pool = pool_options.connect_with(options).await?;
        let store = SqliteStore { db_pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> anyhow::Result<SqliteStore> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.db_pool).await?;
        Ok(())
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: String,
    room_id: String,
    sender_id: String,
    sender_name: String,
    content: String,
    media_urls: String,
    reply_to_id: Option<String>,
    is_edited: bool,
    edited_at: Option<i64>,
    is_deleted: bool,
    deleted_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> anyhow::Result<Message> {
        Ok(Message {
            id: Uuid::parse_str(&row.id)?,
            room_id: Uuid::parse_str(&row.room_id)?,
            sender_id: Uuid::parse_str(&row.sender_id)?,
            sender_name: row.sender_name,
            content: row.content,
            media_urls: serde_json::from_str(&row.media_urls)?,
            reply_to_id: match row.reply_to_id {
                Some(x) => Some(Uuid::parse_str(&x)?),
                None => None,
            },
            is_edited: row.is_edited,
            edited_at: row.edited_at.map(from_millis).transpose()?,
            is_deleted: row.is_deleted,
            deleted_at: row.deleted_at.map(from_millis).transpose()?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct ReactionRow {
    message_id: String,
    user_id: String,
    user_name: String,
    emoji: String,
    created_at: i64,
}

impl TryFrom<ReactionRow> for Reaction {
    type Error = anyhow::Error;

    fn try_from(row: ReactionRow) -> anyhow::Result<Reaction> {
        Ok(Reaction {
            message_id: Uuid::parse_str(&row.message_id)?,
            user_id: Uuid::parse_str(&row.user_id)?,
            user_name: row.user_name,
            emoji: row.emoji,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct ReceiptRow {
    message_id: String,
    reader_id: String,
    reader_name: String,
    read_at: i64,
}

impl TryFrom<ReceiptRow> for ReadReceipt {
    type Error = anyhow::Error;

    fn try_from(row: ReceiptRow) -> anyhow::Result<ReadReceipt> {
        Ok(ReadReceipt {
            message_id: Uuid::parse_str(&row.message_id)?,
            reader_id: Uuid::parse_str(&row.reader_id)?,
            reader_name: row.reader_name,
            read_at: from_millis(row.read_at)?,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id,room_id,sender_id,sender_name,content,media_urls,reply_to_id,is_edited,edited_at,is_deleted,deleted_at,created_at";

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[Uuid]) {
    qb.push(" (");
    let mut separated = qb.separated(",");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");
}

impl ChatStore for SqliteStore {
    async fn insert_message(&self, msg: &NewMessage) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO messages (id,room_id,sender_id,sender_name,content,media_urls,reply_to_id,created_at) VALUES (?,?,?,?,?,?,?,?)")
            .bind(msg.id.to_string())
            .bind(msg.room_id.to_string())
            .bind(msg.sender_id.to_string())
            .bind(&msg.sender_name)
            .bind(&msg.content)
            .bind(serde_json::to_string(&msg.media_urls)?)
            .bind(msg.reply_to_id.as_ref().map(Uuid::to_string))
            .bind(to_millis(msg.created_at))
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> anyhow::Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn update_content(&self, id: Uuid, content: &str, edited_at: OffsetDateTime) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE messages SET content=?, is_edited=1, edited_at=? WHERE id=? AND is_deleted=0")
            .bind(content)
            .bind(to_millis(edited_at))
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn soft_delete(&self, id: Uuid, deleted_at: OffsetDateTime) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE messages SET content='', media_urls='[]', is_deleted=1, deleted_at=? WHERE id=? AND is_deleted=0")
            .bind(to_millis(deleted_at))
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_messages(&self, room_id: Uuid, before: Option<HistoryCursor>, limit: u32) -> anyhow::Result<Vec<Message>> {
        // ids are hyphenated lowercase uuids, so text order is id order; "" sorts before all of them
        let (before_ms, before_id) = match before {
            Some(cursor) => (to_millis(cursor.created_at), cursor.id.map(|id| id.to_string()).unwrap_or_default()),
            None => (i64::MAX, String::new()),
        };
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id=? AND (created_at<? OR (created_at=? AND id<?)) \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
            .bind(room_id.to_string())
            .bind(before_ms)
            .bind(before_ms)
            .bind(before_id)
            .bind(limit)
            .fetch_all(&self.db_pool)
            .await?;

        rows.into_iter().rev().map(Message::try_from).collect()
    }

    async fn insert_reaction(&self, reaction: &Reaction) -> anyhow::Result<bool> {
        let result = sqlx::query("INSERT INTO reactions (message_id,user_id,user_name,emoji,created_at) VALUES (?,?,?,?,?) ON CONFLICT DO NOTHING")
            .bind(reaction.message_id.to_string())
            .bind(reaction.user_id.to_string())
            .bind(&reaction.user_name)
            .bind(&reaction.emoji)
            .bind(to_millis(reaction.created_at))
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM reactions WHERE message_id=? AND user_id=? AND emoji=?")
            .bind(message_id.to_string())
            .bind(user_id.to_string())
            .bind(emoji)
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reactions_for(&self, message_ids: &[Uuid]) -> anyhow::Result<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::new("SELECT message_id,user_id,user_name,emoji,created_at FROM reactions WHERE message_id IN");
        push_id_list(&mut qb, message_ids);
        qb.push(" ORDER BY created_at");

        let rows: Vec<ReactionRow> = qb.build_query_as().fetch_all(&self.db_pool).await?;
        rows.into_iter().map(Reaction::try_from).collect()
    }

    async fn upsert_read(&self, receipt: &ReadReceipt) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO read_receipts (message_id,reader_id,reader_name,read_at) VALUES (?,?,?,?) \
                     ON CONFLICT (message_id,reader_id) DO UPDATE SET read_at=excluded.read_at, reader_name=excluded.reader_name")
            .bind(receipt.message_id.to_string())
            .bind(receipt.reader_id.to_string())
            .bind(&receipt.reader_name)
            .bind(to_millis(receipt.read_at))
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn receipts_for(&self, message_ids: &[Uuid]) -> anyhow::Result<Vec<ReadReceipt>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::new("SELECT message_id,reader_id,reader_name,read_at FROM read_receipts WHERE message_id IN");
        push_id_list(&mut qb, message_ids);
        qb.push(" ORDER BY read_at");

        let rows: Vec<ReceiptRow> = qb.build_query_as().fetch_all(&self.db_pool).await?;
        rows.into_iter().map(ReadReceipt::try_from).collect()
    }
}
