use async_trait::async_trait;
use courier_core::client::{ClientCaller, ClientRpc};
use courier_core::protocol::update::ToolCallStatus;
use courier_core::protocol::{
    ClientCapabilities, ContentBlock, FsCapabilities, LoadSessionRequest, NewSessionRequest, SessionId,
    SessionUpdate, StopReason,
};
use courier_core::session::{
    ConversationRecord, ConversationStore, ExecutionFactory, ExecutionHandle, MessageRole, PromptContext, UpdateSender,
};
use courier_core::{CourierError, Result};
use courier_execution::EchoExecutionFactory;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSender {
    updates: Mutex<Vec<SessionUpdate>>,
    /// Cancelled after the first agent message chunk when set.
    cancel_after_first_chunk: Option<CancellationToken>,
}

#[async_trait]
impl UpdateSender for RecordingSender {
    async fn send_update(&self, _session_id: &SessionId, update: SessionUpdate) -> Result<()> {
        if matches!(update, SessionUpdate::AgentMessageChunk { .. }) {
            if let Some(token) = &self.cancel_after_first_chunk {
                token.cancel();
            }
        }
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}

impl RecordingSender {
    fn agent_text(&self) -> String {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                SessionUpdate::AgentMessageChunk { content } => content.as_text().map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

struct FsClient {
    read_allowed: bool,
    files: HashMap<String, String>,
}

#[async_trait]
impl ClientCaller for FsClient {
    async fn call_client(&self, method: &str, params: Value, _cancel: &CancellationToken) -> Result<Value> {
        let path = params["path"].as_str().unwrap_or_default();
        match self.files.get(path) {
            Some(text) if method == "fs/read_text_file" => Ok(json!({ "text": text })),
            _ => Err(CourierError::client_error(method)),
        }
    }

    fn client_capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            fs: Some(FsCapabilities {
                read_text_file: self.read_allowed,
                write_text_file: false,
            }),
            terminal: false,
        }
    }
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<String, ConversationRecord>>,
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }
}

fn client(read_allowed: bool) -> ClientRpc {
    ClientRpc::new(Arc::new(FsClient {
        read_allowed,
        files: HashMap::from([("/work/notes.md".to_string(), "one\ntwo\n".to_string())]),
    }))
}

fn context(
    prompt: Vec<ContentBlock>,
    sender: Arc<RecordingSender>,
    client: ClientRpc,
    cancel: CancellationToken,
) -> PromptContext {
    PromptContext {
        session_id: SessionId::new("s1"),
        prompt,
        sender,
        client,
        cancel,
    }
}

#[tokio::test(start_paused = true)]
async fn test_echo_streams_prompt_and_saves_record() {
    let store = Arc::new(MemoryStore::default());
    let factory = EchoExecutionFactory::new(Some(store.clone()), Duration::from_millis(10));
    let handle = factory.create(&NewSessionRequest::default()).await.unwrap();
    let sender = Arc::new(RecordingSender::default());

    let reason = handle
        .send_message(context(
            vec![ContentBlock::text("hello there world")],
            sender.clone(),
            client(false),
            CancellationToken::new(),
        ))
        .await
        .unwrap();

    assert_eq!(reason, StopReason::EndTurn);
    assert_eq!(sender.agent_text(), "hello there world");
    let updates = sender.updates.lock().unwrap();
    assert!(matches!(updates[0], SessionUpdate::Plan { .. }));
    assert!(matches!(updates[1], SessionUpdate::AgentThoughtChunk { .. }));

    let record = store.load(handle.conversation_id()).await.unwrap().unwrap();
    assert_eq!(record.messages.len(), 2);
    assert_eq!(record.messages[0].role, MessageRole::User);
    assert_eq!(record.messages[1].content, "hello there world");
}

#[tokio::test(start_paused = true)]
async fn test_echo_stops_on_cancel() {
    let factory = EchoExecutionFactory::new(None, Duration::from_millis(10));
    let handle = factory.create(&NewSessionRequest::default()).await.unwrap();
    let cancel = CancellationToken::new();
    let sender = Arc::new(RecordingSender {
        updates: Mutex::new(Vec::new()),
        cancel_after_first_chunk: Some(cancel.clone()),
    });

    let err = handle
        .send_message(context(
            vec![ContentBlock::text("a b c d e")],
            sender.clone(),
            client(false),
            cancel,
        ))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(sender.agent_text(), "a ");
}

#[tokio::test(start_paused = true)]
async fn test_resource_links_are_read_through_client() {
    let factory = EchoExecutionFactory::new(None, Duration::ZERO);
    let handle = factory.create(&NewSessionRequest::default()).await.unwrap();
    let sender = Arc::new(RecordingSender::default());
    let prompt = vec![
        ContentBlock::text("summarize"),
        ContentBlock::ResourceLink {
            uri: "file:///work/notes.md".to_string(),
            name: "notes.md".to_string(),
            mime_type: None,
        },
        ContentBlock::ResourceLink {
            uri: "file:///work/missing.md".to_string(),
            name: "missing.md".to_string(),
            mime_type: None,
        },
    ];

    handle
        .send_message(context(prompt, sender.clone(), client(true), CancellationToken::new()))
        .await
        .unwrap();

    let updates = sender.updates.lock().unwrap();
    let statuses: Vec<(String, Option<ToolCallStatus>)> = updates
        .iter()
        .filter_map(|u| match u {
            SessionUpdate::ToolCall(call) => Some((call.tool_call_id.clone(), Some(call.status))),
            SessionUpdate::ToolCallUpdate(update) => Some((update.tool_call_id.clone(), update.status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("read-0".to_string(), Some(ToolCallStatus::Pending)),
            ("read-0".to_string(), Some(ToolCallStatus::Completed)),
            ("read-1".to_string(), Some(ToolCallStatus::Pending)),
            ("read-1".to_string(), Some(ToolCallStatus::Failed)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resource_links_skipped_without_capability() {
    let factory = EchoExecutionFactory::new(None, Duration::ZERO);
    let handle = factory.create(&NewSessionRequest::default()).await.unwrap();
    let sender = Arc::new(RecordingSender::default());
    let prompt = vec![ContentBlock::ResourceLink {
        uri: "file:///work/notes.md".to_string(),
        name: "notes.md".to_string(),
        mime_type: None,
    }];

    handle
        .send_message(context(prompt, sender.clone(), client(false), CancellationToken::new()))
        .await
        .unwrap();

    let updates = sender.updates.lock().unwrap();
    assert!(!updates.iter().any(|u| matches!(u, SessionUpdate::ToolCall(_))));
    assert_eq!(sender_text(&updates), "(empty prompt)");
}

fn sender_text(updates: &[SessionUpdate]) -> String {
    updates
        .iter()
        .filter_map(|u| match u {
            SessionUpdate::AgentMessageChunk { content } => content.as_text().map(str::to_string),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_resume_keeps_conversation_id() {
    let factory = EchoExecutionFactory::new(None, Duration::ZERO);
    let record = ConversationRecord::new("existing", "/old");
    let request = LoadSessionRequest {
        session_id: SessionId::new("existing"),
        cwd: "/new".to_string(),
        mcp_servers: vec![],
    };

    let handle = factory.resume(record, &request).await.unwrap();

    assert_eq!(handle.conversation_id(), "existing");
}
