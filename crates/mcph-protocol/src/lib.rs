//! JSON-RPC 2.0 wire encoding with MCP semantics layered on top: message
//! construction, parsing, encoding, and request/response correlation.
//! Pure and synchronous — no I/O happens in this crate; framing and actual
//! byte transport are `mcph-transport`'s job.

#![forbid(unsafe_code)]

pub mod codec;
pub mod correlate;
pub mod error;
pub mod handshake;
pub mod message;
pub mod methods;

pub use codec::{build_error, build_notification, build_request, build_success, encode, encode_batch, parse};
pub use correlate::{PendingRequest, PendingTable};
pub use error::{ProtocolError, RpcErrorCode};
pub use handshake::{ClientInfo, InitializeParams, InitializeResult, ServerInfo};
pub use message::{BatchItem, Message, Notification, ParsedMessage, Request, Response, RpcError};
