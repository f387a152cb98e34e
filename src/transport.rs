//! Channel transport: how text frames physically reach the content.
//!
//! The bridge only needs "send a text frame to content" ([`Transport`]) and a
//! stream of text frames from content. Two carriers ship with the crate:
//!
//! - [`ChannelTransport`]: an in-process tokio channel, for hosts that embed a
//!   webview in the same process (and for tests).
//! - length-prefixed stdio (feature `stdio`): a 4-byte native-endian length
//!   followed by UTF-8 text, for a content shell running as a child process.

use std::io::{self, Read};

use tokio::sync::mpsc;

/// Host -> content frame cap.
pub const MAX_TO_CONTENT: usize = 1_048_576;
/// Content -> host frame cap.
pub const MAX_FROM_CONTENT: usize = 64 * 1_048_576;

/// Delivery primitive for host -> content frames.
pub trait Transport: Send + Sync {
    /// Whether a live destination is attached. Sending to a detached
    /// transport is a logged no-op in the dispatcher.
    fn is_attached(&self) -> bool {
        true
    }

    fn send_text(&self, frame: String) -> io::Result<()>;
}

/// In-memory transport: every frame lands on an unbounded receiver.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send_text(&self, frame: String) -> io::Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "content receiver dropped"))
    }
}

// Same framing as browser native messaging (native-endian u32 length, UTF-8
// body, 1 MiB host -> content), so a content shell can reuse that plumbing.
#[inline]
fn read_exact_u32_len<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    Ok(u32::from_ne_bytes(len_buf))
}

/// Encode a text frame as 4-byte native-endian length + UTF-8 bytes.
pub fn encode_frame(text: &str) -> io::Result<Vec<u8>> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_TO_CONTENT {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "outgoing frame exceeds 1MB",
        ));
    }
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_ne_bytes());
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Decode a single length-prefixed frame from a reader.
pub fn decode_frame<R: Read>(reader: &mut R, max_size: usize) -> io::Result<String> {
    let len = read_exact_u32_len(&mut *reader)? as usize;
    let cap = max_size.min(MAX_FROM_CONTENT);
    if len > cap {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "incoming frame too large",
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(feature = "stdio")]
pub use stdio::{read_stdin_frame, spawn_stdout_writer, write_stdout_frame, StdoutTransport};

#[cfg(feature = "stdio")]
mod stdio {
    use std::io::{self, Write};

    use tokio::{sync::mpsc, task::JoinHandle};

    use super::{decode_frame, encode_frame, ChannelTransport, Transport, MAX_FROM_CONTENT};

    fn join_err(e: tokio::task::JoinError) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e)
    }

    /// Read one frame from stdin. EOF surfaces as `UnexpectedEof` (content went away).
    pub async fn read_stdin_frame() -> io::Result<String> {
        tokio::task::spawn_blocking(move || {
            let mut stdin = io::stdin();
            decode_frame(&mut stdin, MAX_FROM_CONTENT)
        })
        .await
        .map_err(join_err)?
    }

    /// Write one frame to stdout and flush.
    pub async fn write_stdout_frame(text: String) -> io::Result<()> {
        let frame = encode_frame(&text)?;
        tokio::task::spawn_blocking(move || {
            let mut stdout = io::stdout();
            stdout.write_all(&frame)?;
            stdout.flush()
        })
        .await
        .map_err(join_err)?
    }

    /// Drain a channel into stdout, one frame at a time, until the sender side closes.
    pub fn spawn_stdout_writer(
        mut rx: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<io::Result<()>> {
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                write_stdout_frame(text).await?;
            }
            Ok(())
        })
    }

    /// [`Transport`] that queues frames for a background stdout writer task.
    pub struct StdoutTransport {
        inner: ChannelTransport,
        writer: JoinHandle<io::Result<()>>,
    }

    impl StdoutTransport {
        /// Must be called inside a tokio runtime.
        pub fn spawn() -> Self {
            let (inner, rx) = ChannelTransport::new();
            let writer = spawn_stdout_writer(rx);
            Self { inner, writer }
        }
    }

    impl Transport for StdoutTransport {
        fn is_attached(&self) -> bool {
            !self.writer.is_finished() && self.inner.is_attached()
        }

        fn send_text(&self, frame: String) -> io::Result<()> {
            self.inner.send_text(frame)
        }
    }
}
