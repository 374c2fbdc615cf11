//! JSON-RPC 2.0 framing: envelopes, error objects and structural classification.
//!
//! Every line on the transport is exactly one object. Classification never
//! looks at the method name, only at which members are present, so the
//! router can decide between request, notification and response before any
//! typed decoding happens.

use crate::error::CourierError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl From<&CourierError> for RpcError {
    fn from(err: &CourierError) -> Self {
        match err {
            CourierError::InvalidParams(message) => Self::invalid_params(message.clone()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<CourierError> for RpcError {
    fn from(err: CourierError) -> Self {
        Self::from(&err)
    }
}

/// Outbound request (agent→client).
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: Value, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Outbound notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Exactly one of `result` / `error` is written.
#[derive(Debug, Clone, Serialize)]
pub enum ResponseBody {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(RpcError),
}

/// Outbound response to a client request.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            body: ResponseBody::Result(result),
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            body: ResponseBody::Error(error),
        }
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Response {
        id: Value,
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Well-formed JSON that is neither a call nor a response.
    Invalid { id: Value },
}

/// Structural view of an inbound object.
///
/// `id` and `result` use [`present`] so an explicit `null` is distinguished
/// from an absent member. `error` is kept raw so a malformed error object
/// still completes the call it answers.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Classifies one transport line.
    ///
    /// # Errors
    ///
    /// Returns the decoder error when the line is not a JSON object. The
    /// caller answers it with a parse error carrying a null id.
    pub fn parse(line: &str) -> std::result::Result<Self, serde_json::Error> {
        let raw: RawMessage = serde_json::from_str(line)?;
        let method = raw.method.filter(|m| !m.is_empty());
        let is_response = raw.result.is_some() || raw.error.is_some();

        let envelope = match (method, is_response) {
            (Some(method), false) => {
                let params = raw.params.unwrap_or(Value::Null);
                match raw.id {
                    Some(id) if !id.is_null() => Envelope::Request { id, method, params },
                    _ => Envelope::Notification { method, params },
                }
            }
            (None, true) => {
                let id = raw.id.unwrap_or(Value::Null);
                let outcome = match raw.error {
                    Some(error) => Err(serde_json::from_value(error)
                        .unwrap_or_else(|_| RpcError::internal("client returned error"))),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                Envelope::Response { id, outcome }
            }
            _ => Envelope::Invalid {
                id: raw.id.unwrap_or(Value::Null),
            },
        };
        Ok(envelope)
    }
}

/// Normalizes a request id into the key used for correlation.
///
/// Numeric and string ids with the same text map to the same key. Returns
/// `None` for ids that cannot be correlated (null, objects, arrays).
pub fn correlation_key(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Decodes request params into a typed structure.
///
/// Absent params decode as an empty object so that structures whose fields
/// are all optional accept a bare call.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, RpcError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}
