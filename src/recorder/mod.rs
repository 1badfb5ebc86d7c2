//! Interaction Recorder: best-effort persistence of chat turns and feedback.

mod sink;
mod worker;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use sink::{InteractionSink, SqlInteractionSink};
pub use worker::{InteractionRecorder, RecorderStats};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub session_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(
        session_id: impl Into<String>,
        user_message: impl Into<String>,
        bot_response: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_message: user_message.into(),
            bot_response: bot_response.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub session_id: String,
    pub message_id: String,
    pub rating: f64,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

impl Feedback {
    pub fn new(
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        rating: f64,
        comment: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            message_id: message_id.into(),
            rating,
            comment: comment.unwrap_or_default(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Record {
    Interaction(Interaction),
    Feedback(Feedback),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Interaction(_) => "interaction",
            Record::Feedback(_) => "feedback",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Record::Interaction(interaction) => &interaction.session_id,
            Record::Feedback(feedback) => &feedback.session_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recording store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to write {kind}: {message}")]
    Write { kind: &'static str, message: String },
}
