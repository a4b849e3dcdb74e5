//! Wire types for the agent APIs and the real-time event streams.

use serde::{Deserialize, Serialize};

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for an OpenAI-compatible chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Request body for the first-party ask endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
    pub stream: bool,
}

/// Non-streaming reply of the first-party ask endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    pub response: String,
}

/// Non-streaming chat completion reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub message: Option<CompletionMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// `choices[0].message.content`, if present.
    pub fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
    }
}

/// One streamed chat completion chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A trade observed on a token or wallet stream.
///
/// Amounts and prices are kept as the strings the gateway sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub symbol: String,
    pub side: TradeSide,
    pub token_amount: String,
    pub price: String,
    pub timestamp: String,
    pub agent_comment: String,
}

/// A liquidity change observed on a pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityEvent {
    pub pool: String,
    pub token_a: String,
    pub token_b: String,
    pub amount_a: String,
    pub amount_b: String,
    pub timestamp: String,
    pub agent_comment: String,
}

/// An event delivered by a socket subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Trade(TradeEvent),
    Liquidity(LiquidityEvent),
}

/// Kind of event a subscription route carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Trade,
    Liquidity,
}

impl EventKind {
    /// Decode one socket message of this kind.
    pub fn decode(self, raw: &str) -> Result<StreamEvent, serde_json::Error> {
        match self {
            EventKind::Trade => serde_json::from_str(raw).map(StreamEvent::Trade),
            EventKind::Liquidity => serde_json::from_str(raw).map(StreamEvent::Liquidity),
        }
    }
}
