//! First-party agent API.
//!
//! Questions go to `POST {api_url}/ask/{agent}`. A non-streaming reply is
//! `{"response": "..."}`; a streamed reply is only consumed as SSE when the
//! server answers with `text/event-stream`.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;

use crate::client::{ClientError, Provider};
use crate::http::add_extra_headers;
use crate::model::{AskRequest, AskResponse};
use crate::options::Agent;

/// Provider for the first-party agent API.
#[derive(Debug, Clone)]
pub struct AgentApiProvider {
    api_url: String,
    extra_headers: Option<HashMap<String, String>>,
}

impl AgentApiProvider {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            extra_headers: None,
        }
    }

    pub fn with_extra_headers(mut self, headers: Option<HashMap<String, String>>) -> Self {
        self.extra_headers = headers;
        self
    }

    fn ask_url(&self, agent: Agent) -> String {
        format!("{}/ask/{}", self.api_url, agent)
    }
}

#[async_trait]
impl Provider for AgentApiProvider {
    fn name(&self) -> &'static str {
        "agent-api"
    }

    fn build_request(
        &self,
        http: &reqwest::Client,
        agent: Agent,
        question: &str,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let req = http
            .post(self.ask_url(agent))
            .header(CONTENT_TYPE, "application/json");

        add_extra_headers(req, &self.extra_headers).json(&AskRequest { question, stream })
    }

    fn error_message(&self, _status: reqwest::StatusCode, body: &str) -> String {
        format!("Failed to get agent response: {}", body)
    }

    fn complete_answer(&self, body: &[u8]) -> Result<String, ClientError> {
        let reply: AskResponse = serde_json::from_slice(body)?;
        Ok(reply.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let provider = AgentApiProvider::new("http://localhost:9000/");
        let request = provider
            .build_request(&reqwest::Client::new(), Agent::Stella, "gm?", true)
            .build()
            .unwrap();

        assert_eq!(request.url().as_str(), "http://localhost:9000/ask/Stella");
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        let body: serde_json::Value =
            serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "question": "gm?", "stream": true }));
    }

    #[test]
    fn test_complete_answer() {
        let provider = AgentApiProvider::new("http://localhost");
        assert_eq!(
            provider.complete_answer(br#"{"response":"SOL looks strong"}"#).unwrap(),
            "SOL looks strong"
        );
        assert!(matches!(provider.complete_answer(b"{}"), Err(ClientError::Parse(_))));
    }

    #[test]
    fn test_error_message_includes_body() {
        let provider = AgentApiProvider::new("http://localhost");
        assert_eq!(
            provider.error_message(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "Failed to get agent response: boom"
        );
    }
}
