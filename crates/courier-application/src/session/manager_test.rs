use super::*;
use async_trait::async_trait;
use courier_core::client::{ClientCaller, ClientRpc};
use courier_core::protocol::{ClientCapabilities, SessionUpdate, StopReason};
use courier_core::session::{ConversationRecord, ExecutionHandle, PromptContext, UpdateSender};
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy)]
enum Behavior {
    /// Returns immediately with the given stop reason.
    Complete(StopReason),
    /// Waits for the turn's cancel token, then reports a cancellation.
    BlockUntilCancelled,
    /// Ignores cancellation and completes once released.
    WaitForRelease,
    /// Waits for cancellation, then keeps running until released.
    LingerAfterCancel,
    Fail,
}

struct MockExecution {
    id: String,
    behavior: Behavior,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ExecutionHandle for MockExecution {
    fn conversation_id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, ctx: PromptContext) -> Result<StopReason> {
        self.started.notify_one();
        match self.behavior {
            Behavior::Complete(reason) => {
                ctx.sender
                    .send_update(&ctx.session_id, SessionUpdate::agent_text("ok"))
                    .await?;
                Ok(reason)
            }
            Behavior::BlockUntilCancelled => {
                ctx.cancel.cancelled().await;
                Err(CourierError::Cancelled)
            }
            Behavior::WaitForRelease => {
                self.release.notified().await;
                Ok(StopReason::EndTurn)
            }
            Behavior::LingerAfterCancel => {
                ctx.cancel.cancelled().await;
                self.release.notified().await;
                Err(CourierError::Cancelled)
            }
            Behavior::Fail => Err(CourierError::internal("model exploded")),
        }
    }
}

struct MockFactory {
    behavior: Behavior,
    counter: AtomicUsize,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl MockFactory {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            counter: AtomicUsize::new(0),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        })
    }

    fn handle(&self, id: String) -> Arc<dyn ExecutionHandle> {
        Arc::new(MockExecution {
            id,
            behavior: self.behavior,
            started: self.started.clone(),
            release: self.release.clone(),
        })
    }
}

#[async_trait]
impl ExecutionFactory for MockFactory {
    async fn create(&self, _request: &NewSessionRequest) -> Result<Arc<dyn ExecutionHandle>> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(self.handle(format!("conv-{n}")))
    }

    async fn resume(
        &self,
        record: ConversationRecord,
        _request: &LoadSessionRequest,
    ) -> Result<Arc<dyn ExecutionHandle>> {
        Ok(self.handle(record.id))
    }
}

struct MockStore {
    records: Mutex<HashMap<String, ConversationRecord>>,
}

impl MockStore {
    fn with(ids: &[&str]) -> Arc<Self> {
        let records = ids
            .iter()
            .map(|id| (id.to_string(), ConversationRecord::new(*id, "/work")))
            .collect();
        Arc::new(Self {
            records: Mutex::new(records),
        })
    }
}

#[async_trait]
impl ConversationStore for MockStore {
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

struct BrokenStore;

#[async_trait]
impl ConversationStore for BrokenStore {
    async fn load(&self, _id: &str) -> Result<Option<ConversationRecord>> {
        Err(CourierError::io("disk unplugged"))
    }

    async fn save(&self, _record: &ConversationRecord) -> Result<()> {
        Err(CourierError::io("disk unplugged"))
    }
}

#[derive(Default)]
struct RecordingSender {
    updates: Mutex<Vec<(SessionId, SessionUpdate)>>,
}

#[async_trait]
impl UpdateSender for RecordingSender {
    async fn send_update(&self, session_id: &SessionId, update: SessionUpdate) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((session_id.clone(), update));
        Ok(())
    }
}

struct NoClient;

#[async_trait]
impl ClientCaller for NoClient {
    async fn call_client(&self, method: &str, _params: Value, _cancel: &CancellationToken) -> Result<Value> {
        Err(CourierError::client_error(method))
    }

    fn client_capabilities(&self) -> ClientCapabilities {
        ClientCapabilities::default()
    }
}

fn new_request() -> NewSessionRequest {
    NewSessionRequest {
        cwd: "/work".to_string(),
        mcp_servers: vec![],
    }
}

fn load_request(id: &str) -> LoadSessionRequest {
    LoadSessionRequest {
        session_id: SessionId::new(id),
        cwd: "/work".to_string(),
        mcp_servers: vec![],
    }
}

async fn prompt(session: &Session, sender: Arc<RecordingSender>) -> Result<StopReason> {
    session
        .handle_prompt(
            &CancellationToken::new(),
            vec![courier_core::protocol::ContentBlock::text("hi")],
            sender,
            ClientRpc::new(Arc::new(NoClient)),
        )
        .await
}

#[tokio::test]
async fn test_new_session_uses_conversation_id() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Complete(StopReason::EndTurn)), None);

    let first = manager.new_session(&new_request()).await.unwrap();
    let second = manager.new_session(&new_request()).await.unwrap();

    assert_eq!(first.id().as_str(), "conv-0");
    assert_eq!(second.id().as_str(), "conv-1");
    assert_eq!(manager.len().await, 2);
    let found = manager.get_session(first.id()).await.unwrap();
    assert!(Arc::ptr_eq(&found, &first));
}

#[tokio::test]
async fn test_get_unknown_session_is_not_found() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Fail), None);

    let err = manager.get_session(&SessionId::new("ghost")).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "session not found: ghost");
    assert!(manager.cancel(&SessionId::new("ghost")).await.is_err());
}

#[tokio::test]
async fn test_load_without_store_fails() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Fail), None);

    let err = manager.load_session(&load_request("c1")).await.unwrap_err();

    assert_eq!(err, CourierError::StoreUnavailable);
    assert_eq!(err.to_string(), "conversation store not available");
}

#[tokio::test]
async fn test_load_unknown_conversation_fails() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Fail), Some(MockStore::with(&["c1"])));

    let err = manager.load_session(&load_request("c2")).await.unwrap_err();

    assert!(err.to_string().starts_with("failed to load conversation"));
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn test_load_store_failure_is_descriptive() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Fail), Some(Arc::new(BrokenStore)));

    let err = manager.load_session(&load_request("c1")).await.unwrap_err();

    assert!(matches!(err, CourierError::LoadFailed(ref msg) if msg.contains("disk unplugged")));
}

#[tokio::test]
async fn test_load_existing_conversation_registers_session() {
    let manager = SessionManager::new(
        MockFactory::new(Behavior::Complete(StopReason::EndTurn)),
        Some(MockStore::with(&["c1"])),
    );

    let session = manager.load_session(&load_request("c1")).await.unwrap();

    assert_eq!(session.id().as_str(), "c1");
    assert_eq!(session.execution().conversation_id(), "c1");
    assert!(manager.get_session(&SessionId::new("c1")).await.is_ok());
}

#[tokio::test]
async fn test_prompt_completes_and_streams() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Complete(StopReason::MaxTokens)), None);
    let session = manager.new_session(&new_request()).await.unwrap();
    let sender = Arc::new(RecordingSender::default());

    let reason = prompt(&session, sender.clone()).await.unwrap();

    assert_eq!(reason, StopReason::MaxTokens);
    assert!(!session.is_prompting());
    let updates = sender.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(&updates[0].0, session.id());
}

#[tokio::test]
async fn test_cancel_during_prompt_resolves_cancelled() {
    let factory = MockFactory::new(Behavior::BlockUntilCancelled);
    let manager = Arc::new(SessionManager::new(factory.clone(), None));
    let session = manager.new_session(&new_request()).await.unwrap();

    let running = {
        let session = session.clone();
        tokio::spawn(async move { prompt(&session, Arc::new(RecordingSender::default())).await })
    };
    factory.started.notified().await;
    assert!(session.is_prompting());

    manager.cancel(session.id()).await.unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("prompt did not observe cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(reason, StopReason::Cancelled);
    assert!(!session.is_prompting());
}

#[tokio::test]
async fn test_cancel_flag_wins_over_normal_completion() {
    let factory = MockFactory::new(Behavior::WaitForRelease);
    let manager = SessionManager::new(factory.clone(), None);
    let session = manager.new_session(&new_request()).await.unwrap();

    let running = {
        let session = session.clone();
        tokio::spawn(async move { prompt(&session, Arc::new(RecordingSender::default())).await })
    };
    factory.started.notified().await;
    session.cancel();
    factory.release.notify_one();

    assert_eq!(running.await.unwrap().unwrap(), StopReason::Cancelled);
}

#[tokio::test]
async fn test_lingering_turn_does_not_clobber_next_turn() {
    let factory = MockFactory::new(Behavior::LingerAfterCancel);
    let manager = SessionManager::new(factory.clone(), None);
    let session = manager.new_session(&new_request()).await.unwrap();

    let first = {
        let session = session.clone();
        tokio::spawn(async move { prompt(&session, Arc::new(RecordingSender::default())).await })
    };
    factory.started.notified().await;
    session.cancel();

    let second = {
        let session = session.clone();
        tokio::spawn(async move { prompt(&session, Arc::new(RecordingSender::default())).await })
    };
    factory.started.notified().await;

    // Only the first turn is waiting on release; the second waits on its own token.
    factory.release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), StopReason::Cancelled);
    assert!(session.is_prompting());
    assert!(!session.is_cancelled());

    session.cancel();
    factory.release.notify_one();
    assert_eq!(second.await.unwrap().unwrap(), StopReason::Cancelled);
    assert!(!session.is_prompting());
}

#[tokio::test]
async fn test_cancel_while_idle_does_not_poison_next_prompt() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Complete(StopReason::EndTurn)), None);
    let session = manager.new_session(&new_request()).await.unwrap();

    manager.cancel(session.id()).await.unwrap();
    manager.cancel(session.id()).await.unwrap();
    assert!(session.is_cancelled());

    let reason = prompt(&session, Arc::new(RecordingSender::default())).await.unwrap();

    assert_eq!(reason, StopReason::EndTurn);
    assert!(!session.is_cancelled());
}

#[tokio::test]
async fn test_engine_error_surfaces() {
    let manager = SessionManager::new(MockFactory::new(Behavior::Fail), None);
    let session = manager.new_session(&new_request()).await.unwrap();

    let err = prompt(&session, Arc::new(RecordingSender::default())).await.unwrap_err();

    assert_eq!(err, CourierError::internal("model exploded"));
    assert!(!session.is_prompting());
}
