//! Conversation record types.
//!
//! The record is owned by the execution engine; the session layer only needs
//! to know whether one exists for a given id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the agent.
    Assistant,
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted state of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub cwd: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

impl ConversationRecord {
    /// Creates an empty record stamped with the current time.
    pub fn new(id: impl Into<String>, cwd: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            cwd: cwd.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Appends a message and bumps `updated_at`.
    pub fn push(&mut self, role: MessageRole, content: impl Into<String>) {
        let now = Utc::now();
        self.messages.push(ConversationMessage {
            role,
            content: content.into(),
            timestamp: now,
        });
        self.updated_at = now;
    }
}
