//! Wire-level error codes and the protocol engine's own error type.

use std::fmt;

/// JSON-RPC 2.0 reserved codes plus the MCP extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum RpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    Internal = -32603,
    Connection = -32001,
    Timeout = -32002,
    ResourceNotFound = -32003,
    ToolNotFound = -32004,
    InvalidCapabilities = -32005,
}

impl RpcErrorCode {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Map a raw wire code back to a known variant, if recognized.
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::Internal,
            -32001 => Self::Connection,
            -32002 => Self::Timeout,
            -32003 => Self::ResourceNotFound,
            -32004 => Self::ToolNotFound,
            -32005 => Self::InvalidCapabilities,
            _ => return None,
        })
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ParseError => "parse error",
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid params",
            Self::Internal => "internal error",
            Self::Connection => "connection error",
            Self::Timeout => "timeout",
            Self::ResourceNotFound => "resource not found",
            Self::ToolNotFound => "tool not found",
            Self::InvalidCapabilities => "invalid capabilities",
        };
        write!(f, "{label} ({})", self.code())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{0}")]
    Malformed(String),

    #[error("empty batch is not a valid request or response")]
    EmptyBatch,

    #[error("response carries both result and error")]
    AmbiguousResponse,

    #[error("response id {0} has no matching pending request")]
    UnknownRequest(String),

    #[error("method must not be empty")]
    EmptyMethod,

    #[error("null id is only valid on error responses to unparseable requests")]
    InvalidIdForContext,
}
