//! JSON-RPC 2.0 message types. These are the parsed, validated shapes the
//! rest of the engine works with — distinct from the permissive wire struct
//! used internally by the codec.

use mcph_core::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// One entry of a decoded batch: either a fully valid message or the
/// per-item parse error, positioned so the caller can still build a
/// response batch in request order.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Message(Message),
    Error(crate::error::ProtocolError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

/// Top-level result of `parse`.
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Request(Request),
    Notification(Notification),
    Response(Response),
    Batch(Vec<BatchItem>),
}

/// Internal, permissive wire representation used by the codec: every field
/// optional so malformed input parses as JSON first and gets validated
/// second, rather than failing serde before we can classify the error.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawMessage {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}
