//! OpenRouter chat completions.
//!
//! The agent persona is sent as the system message and the question as the user
//! message. Streaming replies are consumed as SSE whenever streaming was
//! requested; OpenRouter interleaves `: OPENROUTER PROCESSING` keep-alives.
//! See: <https://openrouter.ai/docs/api-reference/overview>

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::collections::HashMap;

use crate::client::{ClientError, Provider};
use crate::http::add_extra_headers;
use crate::model::{ChatCompletion, ChatMessage, ChatRequest};
use crate::options::{Agent, OpenRouterConfig, SecretString};

const REFERER: &str = "https://chainmind.network";

/// Provider for the OpenRouter aggregator.
#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    api_key: SecretString,
    base_url: String,
    model: String,
    extra_headers: Option<HashMap<String, String>>,
}

impl OpenRouterProvider {
    pub fn new(config: &OpenRouterConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            model: config.model().to_string(),
            extra_headers: None,
        }
    }

    pub fn with_extra_headers(mut self, headers: Option<HashMap<String, String>>) -> Self {
        self.extra_headers = headers;
        self
    }

    /// System prompt describing the agent.
    pub fn persona(agent: Agent) -> String {
        format!(
            "You are {}, an AI agent specialized in Solana blockchain analysis.",
            agent
        )
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn build_request(
        &self,
        http: &reqwest::Client,
        agent: Agent,
        question: &str,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(Self::persona(agent)),
                ChatMessage::user(question),
            ],
            stream,
        };

        let req = http
            .post(format!("{}/chat/completions", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key.expose_secret()))
            .header("HTTP-Referer", REFERER)
            .header("X-Title", format!("ChainMind {}", agent));

        add_extra_headers(req, &self.extra_headers).json(&body)
    }

    fn error_message(&self, _status: reqwest::StatusCode, body: &str) -> String {
        match serde_json::from_str::<OpenRouterErrorResponse>(body) {
            Ok(error_resp) => match error_resp.error.code {
                Some(code) => format!("OpenRouter API error ({}): {}", code, error_resp.error.message),
                None => format!("OpenRouter API error: {}", error_resp.error.message),
            },
            Err(_) => format!("OpenRouter API error: {}", body),
        }
    }

    fn complete_answer(&self, body: &[u8]) -> Result<String, ClientError> {
        let completion: ChatCompletion = serde_json::from_slice(body)?;
        completion
            .into_content()
            .ok_or(ClientError::EmptyResponse("OpenRouter"))
    }

    fn is_event_stream(&self, _response: &reqwest::Response, requested: bool) -> bool {
        requested
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OpenRouterErrorResponse {
    error: OpenRouterError,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenRouterError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}
