//! Token stream reduction.
//!
//! Turns decoded SSE [`Frame`]s into delta tokens, hands each one to the caller
//! and accumulates the full answer. Both providers share this path; they differ
//! only in the [`DeltaExtractor`] used to read a token from a payload.

use std::ops::ControlFlow;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ClientError;
use crate::model::ChatChunk;
use crate::sse::Frame;

/// Reads the token carried by one frame payload, if any.
pub type DeltaExtractor = fn(&str) -> Option<String>;

/// Extract `choices[0].delta.content` from a chat completion chunk.
///
/// Payloads that fail to decode yield `None`; a partial or malformed frame is not
/// an error. Empty content yields `None` as well.
///
/// ```
/// use chainmind::stream::chat_delta;
///
/// assert_eq!(chat_delta(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#), Some("Hi".to_string()));
/// assert_eq!(chat_delta(r#"{"choices":[{"delta":{}}]}"#), None);
/// assert_eq!(chat_delta(r#"{"choices":[{"del"#), None);
/// ```
pub fn chat_delta(payload: &str) -> Option<String> {
    match serde_json::from_str::<ChatChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty()),
        Err(e) => {
            debug!(error = %e, payload, "skipping undecodable stream frame");
            None
        }
    }
}

/// Accumulates the answer for one streamed session.
#[derive(Debug)]
pub struct TokenReducer {
    extract: DeltaExtractor,
    accumulated: String,
}

impl TokenReducer {
    pub fn new(extract: DeltaExtractor) -> Self {
        Self {
            extract,
            accumulated: String::new(),
        }
    }

    /// Feed one frame.
    ///
    /// A token is passed to `on_token` before it is appended to the accumulated
    /// answer. Returns `Break` on the `[DONE]` sentinel; nothing further should be
    /// fed after that.
    pub fn feed<F>(&mut self, frame: &Frame, on_token: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&str) + ?Sized,
    {
        match frame {
            Frame::Done => ControlFlow::Break(()),
            Frame::Data(payload) => {
                if let Some(token) = (self.extract)(payload) {
                    on_token(&token);
                    self.accumulated.push_str(&token);
                }
                ControlFlow::Continue(())
            }
        }
    }

    pub fn into_response(self) -> String {
        self.accumulated
    }
}

/// Consume `frames` until the sentinel, the end of the stream or a read error.
///
/// Tokens are delivered synchronously in arrival order: the next frame is not
/// polled until `on_token` returns. If `cancel` fires, consumption stops without
/// another callback and the call resolves to [`ClientError::StreamCancelled`].
pub async fn reduce_tokens<S, F>(
    frames: S,
    extract: DeltaExtractor,
    on_token: &mut F,
    cancel: Option<&CancellationToken>,
) -> Result<String, ClientError>
where
    S: Stream<Item = Result<Frame, ClientError>>,
    F: FnMut(&str) + ?Sized,
{
    futures::pin_mut!(frames);
    let mut reducer = TokenReducer::new(extract);

    loop {
        let next = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ClientError::StreamCancelled),
                next = frames.next() => next,
            },
            None => frames.next().await,
        };

        match next {
            Some(Ok(frame)) => {
                // The frame may have won the race against a cancel issued meanwhile.
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    return Err(ClientError::StreamCancelled);
                }
                if reducer.feed(&frame, on_token).is_break() {
                    break;
                }
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    Ok(reducer.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::frames;
    use bytes::Bytes;
    use futures::stream;

    fn chunked(parts: &[&str]) -> impl Stream<Item = Result<Frame, ClientError>> + Send {
        let chunks: Vec<Result<Bytes, ClientError>> = parts
            .iter()
            .map(|part| Ok(Bytes::from(part.to_string())))
            .collect();
        frames(stream::iter(chunks))
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    #[tokio::test]
    async fn test_token_split_across_chunks() {
        let mut tokens = Vec::new();
        let result = reduce_tokens(
            chunked(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel",
                "lo\"}}]}\n",
                "data: [DONE]\n",
            ]),
            chat_delta,
            &mut |t: &str| tokens.push(t.to_string()),
            None,
        )
        .await
        .unwrap();

        assert_eq!(tokens, vec!["Hello"]);
        assert_eq!(result, "Hello");
    }

    #[tokio::test]
    async fn test_done_halts_consumption() {
        let body = format!("{}data: [DONE]\n{}", delta("kept"), delta("ignored"));
        let mut tokens = Vec::new();
        let result = reduce_tokens(chunked(&[&body]), chat_delta, &mut |t: &str| tokens.push(t.to_string()), None)
            .await
            .unwrap();

        assert_eq!(tokens, vec!["kept"]);
        assert_eq!(result, "kept");
    }

    #[tokio::test]
    async fn test_malformed_and_heartbeat_frames_are_skipped() {
        let body = format!(
            "{}data: {{not json\ndata: : OPENROUTER PROCESSING\ndata: {{\"choices\":[]}}\n{}",
            delta("a"),
            delta("b")
        );
        let mut calls = 0;
        let result = reduce_tokens(chunked(&[&body]), chat_delta, &mut |_: &str| calls += 1, None)
            .await
            .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(result, "ab");
    }

    #[tokio::test]
    async fn test_tokens_concatenate_to_result() {
        let words = ["The", " quick", " brown", " fox", "", " \u{1f98a}"];
        let body: String = words.iter().map(|w| delta(w)).collect();
        let chunks: Vec<String> = body
            .chars()
            .collect::<Vec<_>>()
            .chunks(3)
            .map(|c| c.iter().collect())
            .collect();
        let parts: Vec<&str> = chunks.iter().map(String::as_str).collect();

        let mut seen = String::new();
        let result = reduce_tokens(chunked(&parts), chat_delta, &mut |t: &str| seen.push_str(t), None)
            .await
            .unwrap();

        assert_eq!(seen, result);
        assert_eq!(result, "The quick brown fox \u{1f98a}");
    }

    #[tokio::test]
    async fn test_read_error_is_propagated() {
        let items: Vec<Result<Frame, ClientError>> = vec![
            Ok(Frame::Data("{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}".to_string())),
            Err(ClientError::WebSocket(tokio_tungstenite::tungstenite::Error::ConnectionClosed)),
        ];
        let mut tokens = Vec::new();
        let result = reduce_tokens(stream::iter(items), chat_delta, &mut |t: &str| tokens.push(t.to_string()), None).await;

        assert!(matches!(result, Err(ClientError::WebSocket(_))));
        assert_eq!(tokens, vec!["x"]);
    }

    #[tokio::test]
    async fn test_cancel_between_frames_suppresses_next_token() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let items: Vec<Result<Frame, ClientError>> = vec![
            Ok(Frame::Data("{\"choices\":[{\"delta\":{\"content\":\"one\"}}]}".to_string())),
            Ok(Frame::Data("{\"choices\":[{\"delta\":{\"content\":\"two\"}}]}".to_string())),
        ];
        // Cancel while the second frame is being read, so it is already in hand.
        let frames = stream::iter(items).enumerate().map(move |(i, item)| {
            if i == 1 {
                trigger.cancel();
            }
            item
        });

        let mut tokens = Vec::new();
        let result = reduce_tokens(frames, chat_delta, &mut |t: &str| tokens.push(t.to_string()), Some(&cancel)).await;

        assert!(matches!(result, Err(ClientError::StreamCancelled)));
        assert_eq!(tokens, vec!["one"]);
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops_without_callbacks() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;
        let result = reduce_tokens(
            chunked(&[&delta("never")]),
            chat_delta,
            &mut |_: &str| calls += 1,
            Some(&cancel),
        )
        .await;

        assert!(matches!(result, Err(ClientError::StreamCancelled)));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_reducer_feed() {
        let mut reducer = TokenReducer::new(chat_delta);
        let mut tokens: Vec<String> = Vec::new();
        let mut on_token = |t: &str| tokens.push(t.to_string());

        let frame = Frame::Data("{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}".to_string());
        assert!(reducer.feed(&frame, &mut on_token).is_continue());
        assert!(reducer.feed(&Frame::Done, &mut on_token).is_break());
        assert_eq!(reducer.into_response(), "ok");
        assert_eq!(tokens, vec!["ok"]);
    }
}
