//! Client configuration and per-call options.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::client::ClientError;
use crate::model::StreamEvent;

pub const DEFAULT_API_URL: &str = "https://api.chainmind.network";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// The agent persona a client speaks for.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
pub enum Agent {
    Stella,
    Matrix,
    Lumina,
    Nebula,
}

impl Agent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Stella => "Stella",
            Agent::Matrix => "Matrix",
            Agent::Lumina => "Lumina",
            Agent::Nebula => "Nebula",
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Agent {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Stella" => Ok(Agent::Stella),
            "Matrix" => Ok(Agent::Matrix),
            "Lumina" => Ok(Agent::Lumina),
            "Nebula" => Ok(Agent::Nebula),
            other => Err(ClientError::Config(format!("unknown agent: {}", other))),
        }
    }
}

/// Which upstream answers questions.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// The first-party agent API.
    #[default]
    Default,
    /// The OpenRouter model aggregator.
    #[serde(alias = "aggregator")]
    OpenRouter,
}

impl FromStr for LlmProvider {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(LlmProvider::Default),
            "openrouter" | "aggregator" => Ok(LlmProvider::OpenRouter),
            other => Err(ClientError::Config(format!("unknown LLM provider: {}", other))),
        }
    }
}

/// Credentials and overrides for OpenRouter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRouterConfig {
    pub api_key: SecretString,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
        }
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_OPENROUTER_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_OPENROUTER_BASE_URL)
    }
}

/// HTTP transport settings applied to every request.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Request timeout
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl TransportOptions {
    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}

/// Everything needed to construct a [`ChainMind`](crate::agent::ChainMind) client.
///
/// # Example
/// ```rust
/// use chainmind::options::{Agent, ClientConfig, LlmProvider, OpenRouterConfig};
///
/// let config = ClientConfig::new(Agent::Stella)
///     .with_provider(LlmProvider::OpenRouter)
///     .with_open_router(OpenRouterConfig::new("sk-or-...").with_model("openai/gpt-4o".to_string()));
/// assert_eq!(config.api_url(), "https://api.chainmind.network");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub agent: Agent,

    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub llm_provider: LlmProvider,

    #[serde(default)]
    pub open_router: Option<OpenRouterConfig>,

    #[serde(skip)]
    pub transport: TransportOptions,
}

impl ClientConfig {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            api_url: None,
            llm_provider: LlmProvider::Default,
            open_router: None,
            transport: TransportOptions::default(),
        }
    }

    /// Read configuration from `CHAINMIND_*` and `OPENROUTER_*` environment variables.
    ///
    /// `CHAINMIND_AGENT` is required. An `OPENROUTER_API_KEY` enables the
    /// OpenRouter settings but does not select the provider on its own.
    pub fn from_env() -> Result<Self, ClientError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let agent = var("CHAINMIND_AGENT")
            .ok_or_else(|| ClientError::Config("CHAINMIND_AGENT is not set".to_string()))?
            .parse()?;

        let mut config = Self::new(agent);
        config.api_url = var("CHAINMIND_API_URL");
        if let Some(provider) = var("CHAINMIND_LLM_PROVIDER") {
            config.llm_provider = provider.parse()?;
        }
        config.open_router = var("OPENROUTER_API_KEY").map(|key| OpenRouterConfig {
            api_key: SecretString::new(key),
            model: var("OPENROUTER_MODEL"),
            base_url: var("OPENROUTER_BASE_URL"),
        });

        Ok(config)
    }

    /// Override the first-party API base URL.
    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = Some(api_url);
        self
    }

    pub fn with_provider(mut self, provider: LlmProvider) -> Self {
        self.llm_provider = provider;
        self
    }

    pub fn with_open_router(mut self, open_router: OpenRouterConfig) -> Self {
        self.open_router = Some(open_router);
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}

type TokenCallback<'a> = Box<dyn FnMut(&str) + Send + 'a>;
type AskErrorCallback<'a> = Box<dyn FnOnce(ClientError) + Send + 'a>;

/// Options for a single [`ask`](crate::agent::ChainMind::ask) call.
#[derive(Default)]
pub struct AskOptions<'a> {
    pub stream: bool,
    pub(crate) on_token: Option<TokenCallback<'a>>,
    pub(crate) on_error: Option<AskErrorCallback<'a>>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl<'a> AskOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a streamed answer.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Called once per streamed token, before the token is appended to the answer.
    pub fn on_token(mut self, f: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_token = Some(Box::new(f));
        self
    }

    /// Receive errors instead of having them returned; the call then resolves to
    /// an empty answer.
    pub fn on_error(mut self, f: impl FnOnce(ClientError) + Send + 'a) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Stop a streamed answer when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl fmt::Debug for AskOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskOptions")
            .field("stream", &self.stream)
            .field("on_token", &self.on_token.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

type DataCallback = Box<dyn FnMut(StreamEvent) + Send>;
type WatchErrorCallback = Box<dyn FnMut(ClientError) + Send>;

/// Callbacks for a socket subscription.
#[derive(Default)]
pub struct WatchOptions {
    pub(crate) on_data: Option<DataCallback>,
    pub(crate) on_error: Option<WatchErrorCallback>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_data(mut self, f: impl FnMut(StreamEvent) + Send + 'static) -> Self {
        self.on_data = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(ClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("on_data", &self.on_data.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
