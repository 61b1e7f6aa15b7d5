//! Stdio transport: owns one child process's stdin/stdout/
//! stderr. Writes are fully-delivered-or-reported; reads run on a
//! cancellable background task and emit whole messages upward; a single
//! `transport_disconnected` event fires exactly once on EOF or error.

use mcph_core::{BridgeError, ServerId};
use mcph_protocol::{Message, ParsedMessage, ProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::framing::{encode_frame, Framing, FrameDecoder};

#[derive(Debug)]
pub enum TransportEvent {
    Message(ParsedMessage),
    /// A frame failed to parse; the transport stays up, the caller decides
    /// whether this is fatal.
    ProtocolError(ProtocolError),
    /// Fires exactly once for the lifetime of a transport.
    Disconnected { reason: String },
}

const READ_CHUNK: usize = 8192;

pub struct StdioTransport {
    server_id: ServerId,
    framing: Framing,
    stdin: Mutex<ChildStdin>,
    reader_handle: tokio::task::JoinHandle<()>,
    stderr_handle: Option<tokio::task::JoinHandle<()>>,
}

impl StdioTransport {
    /// Takes ownership of the child's piped stdio. Spawning the child
    /// itself is the Spawner's job; this only wires up framing.
    pub fn spawn(
        server_id: ServerId,
        stdin: ChildStdin,
        stdout: ChildStdout,
        stderr: Option<ChildStderr>,
        framing: Framing,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(256);

        let reader_id = server_id.clone();
        let reader_handle = tokio::spawn(Self::reader_loop(reader_id, stdout, framing, tx));

        let stderr_handle = stderr.map(|stderr| {
            let stderr_id = server_id.clone();
            tokio::spawn(Self::stderr_loop(stderr_id, stderr))
        });

        (
            Self {
                server_id,
                framing,
                stdin: Mutex::new(stdin),
                reader_handle,
                stderr_handle,
            },
            rx,
        )
    }

    /// Serialize and write one frame. Either the whole frame reaches the
    /// child's stdin or this returns a `Transport` error — no partial
    /// writes are surfaced as success.
    pub async fn write_message(&self, message: &Message) -> Result<(), BridgeError> {
        let bytes = mcph_protocol::encode(message);
        let frame = encode_frame(&bytes, self.framing);
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(&frame)
            .await
            .map_err(|e| self.transport_error(e))?;
        stdin.flush().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: std::io::Error) -> BridgeError {
        BridgeError::Transport {
            server: self.server_id.to_string(),
            reason: e.to_string(),
        }
    }

    async fn reader_loop(
        server_id: ServerId,
        mut stdout: ChildStdout,
        framing: Framing,
        tx: mpsc::Sender<TransportEvent>,
    ) {
        let mut decoder = FrameDecoder::new(framing);
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => {
                    let _ = tx
                        .send(TransportEvent::Disconnected {
                            reason: "child closed stdout".into(),
                        })
                        .await;
                    return;
                }
                Ok(n) => {
                    for frame in decoder.feed(&buf[..n]) {
                        match mcph_protocol::parse(&frame) {
                            Ok(parsed) => {
                                if tx.send(TransportEvent::Message(parsed)).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                warn!(server = %server_id, %err, "transport_frame_parse_failed");
                                if tx.send(TransportEvent::ProtocolError(err)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(TransportEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }
    }

    async fn stderr_loop(server_id: ServerId, stderr: ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => warn!(server = %server_id, stderr = %line, "child_stderr"),
                Ok(None) => return,
                Err(e) => {
                    warn!(server = %server_id, error = %e, "child_stderr_read_failed");
                    return;
                }
            }
        }
    }

    /// Stop the background reader/stderr tasks. Does not touch the child
    /// process itself — that belongs to whoever owns the `Child` handle.
    pub fn shutdown(self) {
        self.reader_handle.abort();
        if let Some(handle) = self.stderr_handle {
            handle.abort();
        }
    }
}
