//! Build/parse/encode: the four construction operations and the decoder.
//! No I/O — framing is the transport crate's job, this module only ever
//! sees whole messages.

use mcph_core::RequestId;
use serde_json::Value;

use crate::error::{ProtocolError, RpcErrorCode};
use crate::message::{BatchItem, Message, Notification, ParsedMessage, RawMessage, RpcError};
use crate::message::{Request, Response, JSONRPC_VERSION};

pub fn build_request(method: impl Into<String>, params: Value, id: RequestId) -> Result<Request, ProtocolError> {
    let method = method.into();
    if method.is_empty() {
        return Err(ProtocolError::EmptyMethod);
    }
    Ok(Request { id, method, params })
}

pub fn build_notification(method: impl Into<String>, params: Value) -> Result<Notification, ProtocolError> {
    let method = method.into();
    if method.is_empty() {
        return Err(ProtocolError::EmptyMethod);
    }
    Ok(Notification { method, params })
}

pub fn build_success(result: Value, id: RequestId) -> Response {
    Response {
        id,
        result: Some(result),
        error: None,
    }
}

pub fn build_error(code: RpcErrorCode, message: impl Into<String>, id: RequestId, data: Option<Value>) -> Response {
    Response {
        id,
        result: None,
        error: Some(RpcError {
            code: code.code(),
            message: message.into(),
            data,
        }),
    }
}

/// Decode a whole frame (one JSON value, or a JSON array of values) into a
/// `ParsedMessage`. A bare JSON-parse failure is reported as a parse error
/// rather than propagated as a serde error type, so callers never need to
/// depend on serde_json directly.
pub fn parse(bytes: &[u8]) -> Result<ParsedMessage, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::Malformed(format!("invalid JSON: {e}")))?;

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ProtocolError::EmptyBatch);
            }
            let batch = items
                .into_iter()
                .map(|item| match classify_value(item) {
                    Ok(msg) => BatchItem::Message(msg),
                    Err(e) => BatchItem::Error(e),
                })
                .collect();
            Ok(ParsedMessage::Batch(batch))
        }
        other => classify_value(other).map(|msg| match msg {
            Message::Request(r) => ParsedMessage::Request(r),
            Message::Notification(n) => ParsedMessage::Notification(n),
            Message::Response(resp) => ParsedMessage::Response(resp),
        }),
    }
}

fn classify_value(value: Value) -> Result<Message, ProtocolError> {
    let raw: RawMessage = serde_json::from_value(value)
        .map_err(|e| ProtocolError::Malformed(format!("invalid message shape: {e}")))?;
    classify(raw)
}

fn classify(raw: RawMessage) -> Result<Message, ProtocolError> {
    if raw.jsonrpc != JSONRPC_VERSION {
        return Err(ProtocolError::Malformed(format!(
            "unsupported jsonrpc version '{}'",
            raw.jsonrpc
        )));
    }
    if raw.result.is_some() && raw.error.is_some() {
        return Err(ProtocolError::AmbiguousResponse);
    }

    if let Some(method) = raw.method {
        if method.is_empty() {
            return Err(ProtocolError::EmptyMethod);
        }
        let params = raw.params.unwrap_or(Value::Null);
        return Ok(match raw.id {
            Some(id) => Message::Request(Request { id, method, params }),
            None => Message::Notification(Notification { method, params }),
        });
    }

    if raw.result.is_some() || raw.error.is_some() {
        let id = raw
            .id
            .ok_or_else(|| ProtocolError::Malformed("response missing id".into()))?;
        if matches!(id, RequestId::Null) && raw.result.is_some() {
            return Err(ProtocolError::InvalidIdForContext);
        }
        return Ok(Message::Response(Response {
            id,
            result: raw.result,
            error: raw.error,
        }));
    }

    Err(ProtocolError::Malformed(
        "message has neither method nor result/error".into(),
    ))
}

/// Serialize a message back to wire bytes, omitting nil fields and emitting
/// exactly one of `result`/`error` on responses by construction.
pub fn encode(message: &Message) -> Vec<u8> {
    let raw = match message {
        Message::Request(r) => RawMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(r.id.clone()),
            method: Some(r.method.clone()),
            params: Some(r.params.clone()),
            result: None,
            error: None,
        },
        Message::Notification(n) => RawMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(n.method.clone()),
            params: Some(n.params.clone()),
            result: None,
            error: None,
        },
        Message::Response(resp) => RawMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(resp.id.clone()),
            method: None,
            params: None,
            result: resp.result.clone(),
            error: resp.error.clone(),
        },
    };
    serde_json::to_vec(&raw).expect("RawMessage is always serializable")
}

/// Encode a full response batch, honoring the rule that notifications
/// contribute no response entry and an empty outgoing batch is itself
/// invalid.
pub fn encode_batch(responses: &[Response]) -> Result<Vec<u8>, ProtocolError> {
    if responses.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    let values: Vec<Value> = responses
        .iter()
        .map(|r| serde_json::to_value(r).expect("Response is always serializable"))
        .collect();
    Ok(serde_json::to_vec(&values).expect("Vec<Value> is always serializable"))
}
