//! `session/update` payloads.
//!
//! Each update kind has one concrete payload shape. The enum is tagged by
//! the `sessionUpdate` member, so the JSON form matches the wire while Rust
//! code matches on variants.

use super::types::ContentBlock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Edit,
    Execute,
    Search,
    Fetch,
    Think,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Content attached to a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    Content {
        content: ContentBlock,
    },
    Diff {
        path: String,
        #[serde(default, rename = "oldText", skip_serializing_if = "Option::is_none")]
        old_text: Option<String>,
        #[serde(rename = "newText")]
        new_text: String,
    },
}

/// A newly started tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: String,
    pub title: String,
    pub kind: ToolKind,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ToolCallContent>,
}

/// Progress on a previously announced tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdate {
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ToolCallContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub content: String,
    pub priority: PlanEntryPriority,
    pub status: PlanEntryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableCommandInput {
    pub hint: String,
}

/// A slash command the client may offer to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableCommand {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<AvailableCommandInput>,
}

/// One streaming or progress event for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    UserMessageChunk {
        content: ContentBlock,
    },
    AgentMessageChunk {
        content: ContentBlock,
    },
    AgentThoughtChunk {
        content: ContentBlock,
    },
    ToolCall(ToolCall),
    ToolCallUpdate(ToolCallUpdate),
    Plan {
        entries: Vec<PlanEntry>,
    },
    AvailableCommands {
        #[serde(rename = "availableCommands")]
        available_commands: Vec<AvailableCommand>,
    },
    ModeChange {
        #[serde(rename = "modeId")]
        mode_id: String,
    },
}

/// Discriminant of [`SessionUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    UserMessageChunk,
    AgentMessageChunk,
    AgentThoughtChunk,
    ToolCall,
    ToolCallUpdate,
    Plan,
    AvailableCommands,
    ModeChange,
}

/// Update kinds whose consecutive text fragments are coalesced in storage.
pub const MERGEABLE_KINDS: [UpdateKind; 3] = [
    UpdateKind::AgentMessageChunk,
    UpdateKind::AgentThoughtChunk,
    UpdateKind::UserMessageChunk,
];

impl UpdateKind {
    pub fn is_mergeable(self) -> bool {
        MERGEABLE_KINDS.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserMessageChunk => "user_message_chunk",
            Self::AgentMessageChunk => "agent_message_chunk",
            Self::AgentThoughtChunk => "agent_thought_chunk",
            Self::ToolCall => "tool_call",
            Self::ToolCallUpdate => "tool_call_update",
            Self::Plan => "plan",
            Self::AvailableCommands => "available_commands",
            Self::ModeChange => "mode_change",
        }
    }
}

impl SessionUpdate {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::UserMessageChunk { .. } => UpdateKind::UserMessageChunk,
            Self::AgentMessageChunk { .. } => UpdateKind::AgentMessageChunk,
            Self::AgentThoughtChunk { .. } => UpdateKind::AgentThoughtChunk,
            Self::ToolCall(_) => UpdateKind::ToolCall,
            Self::ToolCallUpdate(_) => UpdateKind::ToolCallUpdate,
            Self::Plan { .. } => UpdateKind::Plan,
            Self::AvailableCommands { .. } => UpdateKind::AvailableCommands,
            Self::ModeChange { .. } => UpdateKind::ModeChange,
        }
    }

    /// Returns `(kind, text)` when this update may be coalesced.
    ///
    /// Only chunk kinds carrying a plain text block qualify; an image chunk
    /// of a mergeable kind is stored as its own row.
    pub fn mergeable_text(&self) -> Option<(UpdateKind, &str)> {
        let content = match self {
            Self::UserMessageChunk { content }
            | Self::AgentMessageChunk { content }
            | Self::AgentThoughtChunk { content } => content,
            _ => return None,
        };
        content.as_text().map(|text| (self.kind(), text))
    }

    /// Builds a text chunk of a mergeable kind.
    ///
    /// Returns `None` for kinds that do not carry a single content block.
    pub fn text_chunk(kind: UpdateKind, text: impl Into<String>) -> Option<Self> {
        let content = ContentBlock::text(text);
        match kind {
            UpdateKind::UserMessageChunk => Some(Self::UserMessageChunk { content }),
            UpdateKind::AgentMessageChunk => Some(Self::AgentMessageChunk { content }),
            UpdateKind::AgentThoughtChunk => Some(Self::AgentThoughtChunk { content }),
            _ => None,
        }
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::AgentMessageChunk {
            content: ContentBlock::text(text),
        }
    }

    pub fn thought_text(text: impl Into<String>) -> Self {
        Self::AgentThoughtChunk {
            content: ContentBlock::text(text),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::UserMessageChunk {
            content: ContentBlock::text(text),
        }
    }
}
