//! Per-session coalescing of streaming text updates.
//!
//! The buffer is pure: it never does I/O. [`MergeBuffer::push`] returns the
//! rows the caller must write, in order, and [`MergeBuffer::take`] hands out
//! whatever is still pending.

use courier_core::protocol::{SessionUpdate, UpdateKind};

/// Text accumulated for one mergeable kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMerge {
    pub kind: UpdateKind,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MergeBuffer {
    pending: Option<PendingMerge>,
}

impl MergeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `update` and returns the rows that must be written now.
    ///
    /// - Same-kind mergeable text is appended to the pending merge and
    ///   nothing is returned.
    /// - A mergeable update of another kind returns the previous merge and
    ///   starts a new one.
    /// - Anything else returns the previous merge (if any) followed by the
    ///   update itself.
    pub fn push(&mut self, update: SessionUpdate) -> Vec<SessionUpdate> {
        let mut rows = Vec::new();

        if let Some((kind, text)) = update.mergeable_text() {
            if let Some(pending) = self.pending.as_mut().filter(|p| p.kind == kind) {
                pending.text.push_str(text);
                return rows;
            }
            let next = PendingMerge {
                kind,
                text: text.to_string(),
            };
            rows.extend(self.take());
            self.pending = Some(next);
            return rows;
        }

        rows.extend(self.take());
        rows.push(update);
        rows
    }

    /// Removes the pending merge and returns it as a row.
    ///
    /// A merge that accumulated no text is discarded and `None` is returned.
    pub fn take(&mut self) -> Option<SessionUpdate> {
        let pending = self.pending.take()?;
        if pending.text.is_empty() {
            return None;
        }
        SessionUpdate::text_chunk(pending.kind, pending.text)
    }

    pub fn pending(&self) -> Option<&PendingMerge> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::protocol::ContentBlock;
    use courier_core::protocol::update::{ToolCall, ToolCallStatus, ToolKind};

    fn tool_call(id: &str) -> SessionUpdate {
        SessionUpdate::ToolCall(ToolCall {
            tool_call_id: id.to_string(),
            title: "grep".to_string(),
            kind: ToolKind::Search,
            status: ToolCallStatus::Pending,
            raw_input: None,
            content: vec![],
        })
    }

    #[test]
    fn test_same_kind_accumulates_without_rows() {
        let mut buffer = MergeBuffer::new();
        assert!(buffer.push(SessionUpdate::agent_text("Hello")).is_empty());
        assert!(buffer.push(SessionUpdate::agent_text("World")).is_empty());

        assert_eq!(buffer.take(), Some(SessionUpdate::agent_text("HelloWorld")));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_kind_change_returns_previous_merge() {
        let mut buffer = MergeBuffer::new();
        buffer.push(SessionUpdate::user_text("a"));

        let rows = buffer.push(SessionUpdate::thought_text("b"));

        assert_eq!(rows, vec![SessionUpdate::user_text("a")]);
        assert_eq!(
            buffer.pending(),
            Some(&PendingMerge {
                kind: UpdateKind::AgentThoughtChunk,
                text: "b".to_string(),
            })
        );
    }

    #[test]
    fn test_non_mergeable_flushes_then_passes_through() {
        let mut buffer = MergeBuffer::new();
        buffer.push(SessionUpdate::agent_text("x"));

        let rows = buffer.push(tool_call("t1"));

        assert_eq!(rows, vec![SessionUpdate::agent_text("x"), tool_call("t1")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_image_chunk_never_merges() {
        let mut buffer = MergeBuffer::new();
        buffer.push(SessionUpdate::agent_text("caption"));
        let image = SessionUpdate::AgentMessageChunk {
            content: ContentBlock::Image {
                data: "AAA".to_string(),
                mime_type: "image/png".to_string(),
            },
        };

        let rows = buffer.push(image.clone());

        assert_eq!(rows, vec![SessionUpdate::agent_text("caption"), image]);
    }

    #[test]
    fn test_empty_text_is_not_a_row() {
        let mut buffer = MergeBuffer::new();
        buffer.push(SessionUpdate::agent_text(""));
        assert!(!buffer.is_empty());
        assert_eq!(buffer.take(), None);
        assert_eq!(buffer.take(), None);
    }
}
