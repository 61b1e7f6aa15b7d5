//! Owns one child process's stdio pipes: framing, a cancellable reader
//! task, and tagged stderr capture.

pub mod framing;
pub mod stdio;

pub use framing::{encode_frame, Framing, FrameDecoder};
pub use stdio::{StdioTransport, TransportEvent};
