use anyhow::{Context, Result};
use async_trait::async_trait;
use cryptochat_core::{StoredMessage, TranscriptStore};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

/// Transcripts persisted to a SQLite file, one row per message.
#[derive(Clone)]
pub struct SqliteTranscriptStore {
    pool: Pool<Sqlite>,
}

impl SqliteTranscriptStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, _meta| Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await?;
                Ok(())
            }))
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );
            "#
        )
        .execute(&self.pool)
        .await
        .context("Failed to create rooms table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL,
                speaker TEXT NOT NULL,
                body TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                FOREIGN KEY(room_id) REFERENCES rooms(id)
            );
            "#
        )
        .execute(&self.pool)
        .await
        .context("Failed to create messages table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(room_id, id)")
            .execute(&self.pool)
            .await
            .context("Failed to create messages room index")?;

        Ok(())
    }

    /// All rooms, newest first.
    pub async fn room_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM rooms ORDER BY created_at DESC, id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list rooms")?;
        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
    }
}

#[async_trait]
impl TranscriptStore for SqliteTranscriptStore {
    async fn create_room(&self, room_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO rooms (id, created_at) VALUES (?, ?)")
            .bind(room_id)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create room {}", room_id))?;
        tracing::debug!("Room {} ready", room_id);
        Ok(())
    }

    async fn append_message(&self, room_id: &str, speaker: &str, text: &str) -> Result<()> {
        sqlx::query("INSERT INTO messages (room_id, speaker, body, timestamp) VALUES (?, ?, ?, ?)")
            .bind(room_id)
            .bind(speaker)
            .bind(text)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to append message to room {}", room_id))?;
        Ok(())
    }

    async fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT speaker, body, timestamp FROM messages WHERE room_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(room_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent messages")?;

        let mut messages: Vec<StoredMessage> = rows
            .iter()
            .map(|row| StoredMessage {
                speaker: row.get("speaker"),
                text: row.get("body"),
                timestamp: row.get("timestamp"),
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }
}
