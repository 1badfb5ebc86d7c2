use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::OnceCell;

use super::{Feedback, Interaction, RecorderError};

/// Durable append-only destination for recorded records.
#[async_trait]
pub trait InteractionSink: Send + Sync {
    async fn write_interaction(&self, interaction: &Interaction) -> Result<(), RecorderError>;

    async fn write_feedback(&self, feedback: &Feedback) -> Result<(), RecorderError>;

    /// Releases the destination once the recorder has drained.
    async fn close(&self) {}
}

/// Writes `conversation_history` and `feedback` rows into the ticketing
/// database. The pool connects lazily and the tables are created on first
/// write, so an unavailable store only affects recording.
#[derive(Clone)]
pub struct SqlInteractionSink {
    pool: SqlitePool,
    schema: std::sync::Arc<OnceCell<()>>,
}

impl SqlInteractionSink {
    pub fn connect_lazy(url: &str) -> Result<Self, RecorderError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| RecorderError::Unavailable(e.to_string()))?
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            schema: std::sync::Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<(), RecorderError> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(
                    "CREATE TABLE IF NOT EXISTS conversation_history (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        session_id TEXT NOT NULL,
                        user_message TEXT NOT NULL,
                        bot_response TEXT NOT NULL,
                        timestamp TEXT NOT NULL
                    )",
                )
                .execute(&self.pool)
                .await
                .map_err(|e| RecorderError::Unavailable(format!("Failed to init conversation_history table: {}", e)))?;

                sqlx::query(
                    "CREATE TABLE IF NOT EXISTS feedback (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        session_id TEXT NOT NULL,
                        message_id TEXT NOT NULL,
                        rating REAL NOT NULL,
                        comment TEXT NOT NULL DEFAULT '',
                        timestamp TEXT NOT NULL
                    )",
                )
                .execute(&self.pool)
                .await
                .map_err(|e| RecorderError::Unavailable(format!("Failed to init feedback table: {}", e)))?;

                Ok::<(), RecorderError>(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl InteractionSink for SqlInteractionSink {
    async fn write_interaction(&self, interaction: &Interaction) -> Result<(), RecorderError> {
        self.ensure_schema().await?;

        sqlx::query(
            "INSERT INTO conversation_history (session_id, user_message, bot_response, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&interaction.session_id)
        .bind(&interaction.user_message)
        .bind(&interaction.bot_response)
        .bind(interaction.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RecorderError::Write {
            kind: "interaction",
            message: e.to_string(),
        })?;

        Ok(())
    }

    async fn write_feedback(&self, feedback: &Feedback) -> Result<(), RecorderError> {
        self.ensure_schema().await?;

        sqlx::query(
            "INSERT INTO feedback (session_id, message_id, rating, comment, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&feedback.session_id)
        .bind(&feedback.message_id)
        .bind(feedback.rating)
        .bind(&feedback.comment)
        .bind(feedback.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RecorderError::Write {
            kind: "feedback",
            message: e.to_string(),
        })?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
