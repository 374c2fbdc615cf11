//! Agent→client calls.
//!
//! [`ClientCaller`] is the raw seam implemented by the router: it writes a
//! request and waits for the correlated response. [`ClientRpc`] layers typed
//! methods on top and refuses calls the client never advertised support for,
//! so those fail locally without touching the transport.

use crate::error::{CourierError, Result};
use crate::protocol::client::*;
use crate::protocol::types::{ClientCapabilities, SessionId};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Issues requests to the connected client.
#[async_trait]
pub trait ClientCaller: Send + Sync {
    /// Sends `method` with `params` and waits for the client's answer.
    ///
    /// # Errors
    ///
    /// - `CourierError::Cancelled` when `cancel` fires first
    /// - `CourierError::ClientError` when the client answers with an error
    /// - `CourierError::ConnectionClosed` when the transport goes away
    async fn call_client(&self, method: &str, params: Value, cancel: &CancellationToken) -> Result<Value>;

    /// Capabilities the client declared at `initialize`.
    fn client_capabilities(&self) -> ClientCapabilities;
}

/// The user's answer to a permission prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionResult {
    pub outcome: OutcomeKind,
    pub option_id: Option<String>,
}

/// Typed, capability-checked access to the client.
#[derive(Clone)]
pub struct ClientRpc {
    caller: Arc<dyn ClientCaller>,
}

impl ClientRpc {
    pub fn new(caller: Arc<dyn ClientCaller>) -> Self {
        Self { caller }
    }

    pub fn has_fs(&self) -> bool {
        self.caller.client_capabilities().fs.is_some()
    }

    pub fn can_read_files(&self) -> bool {
        self.caller
            .client_capabilities()
            .fs
            .is_some_and(|fs| fs.read_text_file)
    }

    pub fn can_write_files(&self) -> bool {
        self.caller
            .client_capabilities()
            .fs
            .is_some_and(|fs| fs.write_text_file)
    }

    pub fn has_terminal(&self) -> bool {
        self.caller.client_capabilities().terminal
    }

    /// Reads a text file through the client's editor buffers.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Capability` without any wire traffic when the
    /// client did not advertise `fs.readTextFile`.
    pub async fn read_text_file(&self, path: &str, cancel: &CancellationToken) -> Result<String> {
        if !self.can_read_files() {
            return Err(CourierError::capability("client does not support reading files"));
        }
        let params = ReadTextFileRequest {
            path: path.to_string(),
        };
        let resp: ReadTextFileResponse = self.call(METHOD_READ_TEXT_FILE, &params, cancel).await?;
        Ok(resp.text)
    }

    pub async fn write_text_file(&self, path: &str, text: &str, cancel: &CancellationToken) -> Result<()> {
        if !self.can_write_files() {
            return Err(CourierError::capability("client does not support writing files"));
        }
        let params = WriteTextFileRequest {
            path: path.to_string(),
            text: text.to_string(),
        };
        self.call_raw(METHOD_WRITE_TEXT_FILE, &params, cancel).await?;
        Ok(())
    }

    pub async fn terminal_execute(
        &self,
        command: &str,
        cwd: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TerminalExecuteResponse> {
        if !self.has_terminal() {
            return Err(CourierError::capability("client does not support terminal execution"));
        }
        let params = TerminalExecuteRequest {
            command: command.to_string(),
            cwd: cwd.map(str::to_string),
        };
        self.call(METHOD_TERMINAL_EXECUTE, &params, cancel).await
    }

    pub async fn terminal_show(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        if !self.has_terminal() {
            return Err(CourierError::capability("client does not support terminal"));
        }
        let params = TerminalShowRequest {
            text: text.to_string(),
        };
        self.call_raw(METHOD_TERMINAL_SHOW, &params, cancel).await?;
        Ok(())
    }

    /// Asks the user to pick one of `options` for a pending tool call.
    ///
    /// Permission prompts are part of the base protocol and are not gated.
    pub async fn request_permission(
        &self,
        request: RequestPermissionRequest,
        cancel: &CancellationToken,
    ) -> Result<PermissionResult> {
        let resp: RequestPermissionResponse = self.call(METHOD_REQUEST_PERMISSION, &request, cancel).await?;
        Ok(PermissionResult {
            outcome: resp.outcome.outcome,
            option_id: resp.outcome.option_id,
        })
    }

    /// Approve/deny shortcut over [`request_permission`](Self::request_permission).
    ///
    /// # Returns
    ///
    /// `true` only when the user selected the approve option. Deny is the
    /// default choice.
    pub async fn request_approval(
        &self,
        session_id: &SessionId,
        tool_call: ToolCallForPermission,
        message: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let request = RequestPermissionRequest {
            session_id: session_id.clone(),
            tool_call,
            message,
            options: vec![
                PermissionOption {
                    id: "approve".to_string(),
                    label: "Approve".to_string(),
                    shortcut: Some("y".to_string()),
                    is_default: false,
                },
                PermissionOption {
                    id: "deny".to_string(),
                    label: "Deny".to_string(),
                    shortcut: Some("n".to_string()),
                    is_default: true,
                },
            ],
        };
        let result = self.request_permission(request, cancel).await?;
        Ok(result.outcome == OutcomeKind::Selected && result.option_id.as_deref() == Some("approve"))
    }

    async fn call<P, R>(&self, method: &str, params: &P, cancel: &CancellationToken) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let value = self.call_raw(method, params, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call_raw<P>(&self, method: &str, params: &P, cancel: &CancellationToken) -> Result<Value>
    where
        P: Serialize + Sync,
    {
        let params = serde_json::to_value(params)?;
        tracing::debug!(method, "Calling client");
        self.caller.call_client(method, params, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::FsCapabilities;
    use serde_json::json;
    use std::sync::Mutex;

    struct MockCaller {
        caps: ClientCapabilities,
        reply: Value,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl MockCaller {
        fn new(caps: ClientCapabilities, reply: Value) -> Arc<Self> {
            Arc::new(Self {
                caps,
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ClientCaller for MockCaller {
        async fn call_client(&self, method: &str, params: Value, _cancel: &CancellationToken) -> Result<Value> {
            self.calls.lock().unwrap().push((method.to_string(), params));
            Ok(self.reply.clone())
        }

        fn client_capabilities(&self) -> ClientCapabilities {
            self.caps.clone()
        }
    }

    #[tokio::test]
    async fn test_read_without_capability_fails_locally() {
        let caller = MockCaller::new(ClientCapabilities::default(), Value::Null);
        let rpc = ClientRpc::new(caller.clone());

        let err = rpc
            .read_text_file("/tmp/a", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_capability());
        assert_eq!(err.to_string(), "client does not support reading files");
        assert!(caller.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_without_capability_fails_locally() {
        let caller = MockCaller::new(ClientCapabilities::default(), Value::Null);
        let rpc = ClientRpc::new(caller.clone());
        let cancel = CancellationToken::new();

        let exec = rpc.terminal_execute("ls", None, &cancel).await.unwrap_err();
        let show = rpc.terminal_show("hi", &cancel).await.unwrap_err();

        assert_eq!(exec.to_string(), "client does not support terminal execution");
        assert_eq!(show.to_string(), "client does not support terminal");
        assert!(caller.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_with_capability_decodes_text() {
        let caps = ClientCapabilities {
            fs: Some(FsCapabilities {
                read_text_file: true,
                write_text_file: false,
            }),
            terminal: false,
        };
        let caller = MockCaller::new(caps, json!({"text": "fn main() {}"}));
        let rpc = ClientRpc::new(caller.clone());

        let text = rpc.read_text_file("/src/main.rs", &CancellationToken::new()).await.unwrap();

        assert_eq!(text, "fn main() {}");
        let calls = caller.calls.lock().unwrap();
        assert_eq!(calls[0].0, METHOD_READ_TEXT_FILE);
        assert_eq!(calls[0].1, json!({"path": "/src/main.rs"}));
        assert!(rpc.has_fs());
        assert!(!rpc.can_write_files());
    }

    #[tokio::test]
    async fn test_request_approval_requires_approve_option() {
        let approved = MockCaller::new(
            ClientCapabilities::default(),
            json!({"outcome": {"outcome": "selected", "optionId": "approve"}}),
        );
        let denied = MockCaller::new(
            ClientCapabilities::default(),
            json!({"outcome": {"outcome": "dismissed"}}),
        );
        let tool_call = ToolCallForPermission {
            tool_call_id: "t1".into(),
            tool_name: "bash".into(),
            input: None,
        };
        let session = SessionId::new("s1");
        let cancel = CancellationToken::new();

        let yes = ClientRpc::new(approved.clone())
            .request_approval(&session, tool_call.clone(), None, &cancel)
            .await
            .unwrap();
        let no = ClientRpc::new(denied)
            .request_approval(&session, tool_call, None, &cancel)
            .await
            .unwrap();

        assert!(yes);
        assert!(!no);
        let calls = approved.calls.lock().unwrap();
        assert_eq!(calls[0].0, METHOD_REQUEST_PERMISSION);
        assert_eq!(calls[0].1["options"][1]["isDefault"], json!(true));
    }
}
