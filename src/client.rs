//! Core provider trait and error types.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::http::read_error_body;
use crate::options::Agent;
use crate::stream::{chat_delta, DeltaExtractor};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{message}")]
    Upstream {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Stream cancelled")]
    StreamCancelled,

    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// One upstream answering questions for an agent.
///
/// A provider decides where a question goes and how the reply is shaped. The
/// streaming path is shared: every provider feeds its SSE body through the same
/// frame decoder and token reducer, parametrised by [`Provider::delta_extractor`].
///
/// # Example
/// ```rust,ignore
/// struct EchoProvider { base_url: String }
///
/// impl Provider for EchoProvider {
///     fn name(&self) -> &'static str { "echo" }
///
///     fn build_request(&self, http: &reqwest::Client, agent: Agent, question: &str, stream: bool)
///         -> reqwest::RequestBuilder
///     {
///         http.post(format!("{}/echo/{}", self.base_url, agent))
///             .json(&serde_json::json!({ "question": question, "stream": stream }))
///     }
///
///     fn error_message(&self, _status: reqwest::StatusCode, body: &str) -> String {
///         format!("echo failed: {body}")
///     }
///
///     fn complete_answer(&self, body: &[u8]) -> Result<String, ClientError> {
///         Ok(String::from_utf8_lossy(body).into_owned())
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Build the outbound request for one question.
    fn build_request(
        &self,
        http: &reqwest::Client,
        agent: Agent,
        question: &str,
        stream: bool,
    ) -> reqwest::RequestBuilder;

    /// Describe a non-success reply; `body` is the raw response text.
    fn error_message(&self, status: reqwest::StatusCode, body: &str) -> String;

    /// Extract the single answer from a non-streaming reply body.
    fn complete_answer(&self, body: &[u8]) -> Result<String, ClientError>;

    /// Whether `response` should be consumed as an SSE token stream.
    ///
    /// Defaults to requiring both a streaming request and an
    /// `text/event-stream` content type.
    fn is_event_stream(&self, response: &reqwest::Response, requested: bool) -> bool {
        requested
            && response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.contains("text/event-stream"))
    }

    /// Pulls the token out of one streamed frame payload.
    fn delta_extractor(&self) -> DeltaExtractor {
        chat_delta
    }

    /// Send the request and reject non-success statuses.
    async fn send(
        &self,
        http: &reqwest::Client,
        agent: Agent,
        question: &str,
        stream: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self.build_request(http, agent, question, stream).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ClientError::Upstream {
                status,
                message: self.error_message(status, &body),
            });
        }

        Ok(response)
    }
}
