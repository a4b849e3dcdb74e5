//! Server-Sent Events (SSE) frame decoding.
//!
//! Both upstream APIs stream their answers as SSE text:
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: : OPENROUTER PROCESSING
//!
//! data: [DONE]
//! ```
//!
//! Network chunks do not line up with line boundaries, so bytes are buffered in a
//! [`LineDecoder`] until a newline completes a line. Complete lines are then
//! classified into [`Frame`]s; anything that is not a `data: ` line, and heartbeat
//! comments (`data: :...`), is dropped here.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::client::ClientError;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Buffers partial lines across chunk boundaries.
///
/// The buffer holds raw bytes so a multi-byte UTF-8 character split between two
/// chunks is only decoded once the whole line has arrived.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the complete lines it finished, in order.
    ///
    /// The returned iterator is lazy: lines are split off the buffer as it is
    /// advanced. Whatever follows the last newline stays buffered for the next call.
    pub fn push<'a>(&'a mut self, chunk: &[u8]) -> impl Iterator<Item = String> + 'a {
        self.buffer.extend_from_slice(chunk);
        std::iter::from_fn(move || self.next_line())
    }

    /// Split off the next complete line, trimmed of trailing whitespace.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line = self.buffer.split_to(pos);
        self.buffer.advance(1);
        Some(String::from_utf8_lossy(&line).trim_end().to_string())
    }

    /// Number of buffered bytes not yet forming a complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any unterminated remainder, returning how many bytes were discarded.
    pub fn reset(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        discarded
    }
}

/// One protocol-significant line of an SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload of a `data: ` line, prefix stripped and trimmed.
    Data(String),
    /// The `[DONE]` end-of-stream sentinel.
    Done,
}

impl Frame {
    /// Classify a complete line.
    ///
    /// Returns `None` for lines that carry nothing for the reducer: blank lines,
    /// `event:`/`id:` fields, SSE comments and `data: :` keep-alives.
    ///
    /// ```
    /// use chainmind::sse::Frame;
    ///
    /// assert_eq!(Frame::parse("data: {\"a\":1}"), Some(Frame::Data("{\"a\":1}".into())));
    /// assert_eq!(Frame::parse("data: [DONE]"), Some(Frame::Done));
    /// assert_eq!(Frame::parse("data: : OPENROUTER PROCESSING"), None);
    /// assert_eq!(Frame::parse(": ping"), None);
    /// ```
    pub fn parse(line: &str) -> Option<Frame> {
        let data = parse_sse_line(line)?;
        if is_comment(data) {
            return None;
        }
        if is_done_marker(data) {
            return Some(Frame::Done);
        }
        Some(Frame::Data(data.to_string()))
    }
}

/// Extract the data portion of a `data: ` line.
///
/// ```
/// use chainmind::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": \"value\"}"), Some("{\"key\": \"value\"}"));
/// assert_eq!(parse_sse_line("invalid"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(|s| s.trim())
}

/// Check if an SSE data payload is the end-of-stream sentinel.
pub fn is_done_marker(data: &str) -> bool {
    data == DONE_MARKER
}

/// Keep-alive payloads sent by OpenRouter while a model is still processing.
pub fn is_comment(data: &str) -> bool {
    data.starts_with(':')
}

/// Turn a stream of byte chunks into a stream of [`Frame`]s.
///
/// A chunk read error is yielded once and ends the stream. When the byte stream
/// ends, an unterminated trailing line is discarded rather than emitted.
pub fn frames<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<Frame, ClientError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ClientError> + Send,
{
    stream::unfold(
        (Box::pin(byte_stream), LineDecoder::new(), VecDeque::<Frame>::new(), false),
        |(mut byte_stream, mut decoder, mut ready, mut finished)| async move {
            loop {
                if let Some(frame) = ready.pop_front() {
                    return Some((Ok(frame), (byte_stream, decoder, ready, finished)));
                }
                if finished {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        ready.extend(decoder.push(chunk.as_ref()).filter_map(|line| Frame::parse(&line)));
                    }
                    Some(Err(e)) => {
                        decoder.reset();
                        finished = true;
                        return Some((Err(e.into()), (byte_stream, decoder, ready, finished)));
                    }
                    None => {
                        let discarded = decoder.reset();
                        if discarded > 0 {
                            debug!(bytes = discarded, "discarding unterminated SSE line at end of stream");
                        }
                        finished = true;
                    }
                }
            }
        },
    )
}

/// Extension trait for `reqwest::Response` to enable SSE frame streaming.
///
/// # Example
/// ```ignore
/// use chainmind::sse::{Frame, SSEResponseExt};
///
/// let mut frames = Box::pin(response.sse());
/// while let Some(frame) = frames.next().await {
///     match frame? {
///         Frame::Data(payload) => println!("{payload}"),
///         Frame::Done => break,
///     }
/// }
/// ```
pub trait SSEResponseExt {
    /// Convert the response body into a stream of SSE frames.
    fn sse(self) -> impl Stream<Item = Result<Frame, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<Frame, ClientError>> + Send {
        frames(self.bytes_stream())
    }
}
