use async_trait::async_trait;
use courier_core::protocol::update::{
    PlanEntry, PlanEntryPriority, PlanEntryStatus, ToolCall, ToolCallContent, ToolCallStatus, ToolCallUpdate,
    ToolKind,
};
use courier_core::protocol::{ContentBlock, LoadSessionRequest, NewSessionRequest, SessionUpdate, StopReason};
use courier_core::session::{
    ConversationRecord, ConversationStore, ExecutionFactory, ExecutionHandle, MessageRole, PromptContext,
};
use courier_core::{CourierError, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Creates [`EchoExecution`] handles and persists their conversations.
pub struct EchoExecutionFactory {
    store: Option<Arc<dyn ConversationStore>>,
    chunk_delay: Duration,
}

impl EchoExecutionFactory {
    /// # Arguments
    ///
    /// * `store` - Where conversation records are saved; `None` keeps them in memory only
    /// * `chunk_delay` - Pause before each streamed word
    pub fn new(store: Option<Arc<dyn ConversationStore>>, chunk_delay: Duration) -> Self {
        Self { store, chunk_delay }
    }

    fn handle(&self, record: ConversationRecord) -> Arc<dyn ExecutionHandle> {
        Arc::new(EchoExecution {
            id: record.id.clone(),
            record: Mutex::new(record),
            store: self.store.clone(),
            chunk_delay: self.chunk_delay,
        })
    }
}

#[async_trait]
impl ExecutionFactory for EchoExecutionFactory {
    async fn create(&self, request: &NewSessionRequest) -> Result<Arc<dyn ExecutionHandle>> {
        let record = ConversationRecord::new(Uuid::new_v4().to_string(), request.cwd.clone());
        if let Some(store) = &self.store {
            store.save(&record).await?;
        }
        if !request.mcp_servers.is_empty() {
            tracing::debug!(
                "Ignoring {} MCP server(s) for conversation {}",
                request.mcp_servers.len(),
                record.id
            );
        }
        Ok(self.handle(record))
    }

    async fn resume(
        &self,
        mut record: ConversationRecord,
        request: &LoadSessionRequest,
    ) -> Result<Arc<dyn ExecutionHandle>> {
        if !request.cwd.is_empty() {
            record.cwd = request.cwd.clone();
        }
        Ok(self.handle(record))
    }
}

/// A conversation that streams the user's words back.
pub struct EchoExecution {
    id: String,
    record: Mutex<ConversationRecord>,
    store: Option<Arc<dyn ConversationStore>>,
    chunk_delay: Duration,
}

impl EchoExecution {
    pub async fn record(&self) -> ConversationRecord {
        self.record.lock().await.clone()
    }

    async fn persist(&self) -> Result<()> {
        if let Some(store) = &self.store {
            let record = self.record.lock().await.clone();
            store.save(&record).await?;
        }
        Ok(())
    }

    /// Reads every `file://` resource link through the client.
    ///
    /// Each read is reported as a tool call. A failed read is reported and
    /// skipped; cancellation aborts the turn.
    async fn read_attachments(&self, ctx: &PromptContext) -> Result<()> {
        let links = ctx.prompt.iter().filter_map(|block| match block {
            ContentBlock::ResourceLink { uri, name, .. } => uri.strip_prefix("file://").map(|path| (path, name)),
            _ => None,
        });

        for (index, (path, name)) in links.enumerate() {
            let tool_call_id = format!("read-{index}");
            ctx.sender
                .send_update(
                    &ctx.session_id,
                    SessionUpdate::ToolCall(ToolCall {
                        tool_call_id: tool_call_id.clone(),
                        title: format!("Read {name}"),
                        kind: ToolKind::Read,
                        status: ToolCallStatus::Pending,
                        raw_input: Some(json!({ "path": path })),
                        content: vec![],
                    }),
                )
                .await?;

            let (status, summary) = match ctx.client.read_text_file(path, &ctx.cancel).await {
                Ok(text) => (
                    ToolCallStatus::Completed,
                    format!("{} lines, {} bytes", text.lines().count(), text.len()),
                ),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!("Reading {} failed: {}", path, e);
                    (ToolCallStatus::Failed, e.to_string())
                }
            };

            ctx.sender
                .send_update(
                    &ctx.session_id,
                    SessionUpdate::ToolCallUpdate(ToolCallUpdate {
                        tool_call_id,
                        status: Some(status),
                        title: None,
                        content: vec![ToolCallContent::Content {
                            content: ContentBlock::text(summary),
                        }],
                        raw_output: None,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn pause(&self, ctx: &PromptContext) -> Result<()> {
        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(CourierError::Cancelled),
            _ = tokio::time::sleep(self.chunk_delay) => Ok(()),
        }
    }
}

fn plan(attachments: bool, echo_status: PlanEntryStatus) -> SessionUpdate {
    let mut entries = Vec::new();
    if attachments {
        entries.push(PlanEntry {
            content: "Read attached files".to_string(),
            priority: PlanEntryPriority::Medium,
            status: PlanEntryStatus::InProgress,
        });
    }
    entries.push(PlanEntry {
        content: "Echo the prompt".to_string(),
        priority: PlanEntryPriority::High,
        status: echo_status,
    });
    SessionUpdate::Plan { entries }
}

fn prompt_text(prompt: &[ContentBlock]) -> String {
    prompt
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Resource { resource } => resource.text.as_deref(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ExecutionHandle for EchoExecution {
    fn conversation_id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, ctx: PromptContext) -> Result<StopReason> {
        let text = prompt_text(&ctx.prompt);
        let has_links = ctx
            .prompt
            .iter()
            .any(|block| matches!(block, ContentBlock::ResourceLink { .. }));
        let can_read = has_links && ctx.client.can_read_files();

        self.record.lock().await.push(MessageRole::User, text.clone());
        self.persist().await?;

        ctx.sender
            .send_update(&ctx.session_id, plan(can_read, PlanEntryStatus::Pending))
            .await?;

        let words: Vec<&str> = text.split_inclusive(char::is_whitespace).collect();
        ctx.sender
            .send_update(
                &ctx.session_id,
                SessionUpdate::thought_text(format!("Echoing {} word(s).", words.len())),
            )
            .await?;

        if can_read {
            self.read_attachments(&ctx).await?;
        }

        let mut reply = String::new();
        if words.is_empty() {
            reply.push_str("(empty prompt)");
            ctx.sender
                .send_update(&ctx.session_id, SessionUpdate::agent_text(reply.clone()))
                .await?;
        }
        for word in words {
            self.pause(&ctx).await?;
            reply.push_str(word);
            ctx.sender
                .send_update(&ctx.session_id, SessionUpdate::agent_text(word))
                .await?;
        }

        ctx.sender
            .send_update(&ctx.session_id, plan(false, PlanEntryStatus::Completed))
            .await?;

        self.record.lock().await.push(MessageRole::Assistant, reply);
        self.persist().await?;
        Ok(StopReason::EndTurn)
    }
}
