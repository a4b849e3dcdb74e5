//! The `ChainMind` client: one configured agent, asked questions over HTTP and
//! watched over WebSocket.

use tracing::{debug, warn};

use crate::client::{ClientError, Provider};
use crate::http::build_http_client;
use crate::options::{Agent, AskOptions, ClientConfig, LlmProvider, WatchOptions};
use crate::providers::{AgentApiProvider, OpenRouterProvider};
use crate::sse::SSEResponseExt;
use crate::stream::reduce_tokens;
use crate::subscribe::{socket_url, StreamRoute, Subscription};

/// Client for a single agent.
///
/// Construction validates the configuration and performs no network I/O.
/// Sessions are independent: every `ask` call and every subscription owns its
/// own buffers, and each subscription is controlled through the handle it
/// returns.
///
/// # Example
/// ```no_run
/// use chainmind::agent::ChainMind;
/// use chainmind::options::{Agent, AskOptions, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ChainMind::new(ClientConfig::new(Agent::Stella))?;
///
///     let answer = client
///         .ask("What is moving on Raydium?", AskOptions::new().streaming().on_token(|t| print!("{t}")))
///         .await?;
///     println!("\n{answer}");
///     Ok(())
/// }
/// ```
pub struct ChainMind {
    agent: Agent,
    api_url: String,
    http: reqwest::Client,
    provider: Box<dyn Provider>,
}

impl ChainMind {
    /// Create a client from `config`.
    ///
    /// Fails with [`ClientError::Config`] when OpenRouter is selected without
    /// OpenRouter credentials.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let extra_headers = config.transport.extra_headers.clone();
        let provider: Box<dyn Provider> = match config.llm_provider {
            LlmProvider::Default => {
                Box::new(AgentApiProvider::new(config.api_url()).with_extra_headers(extra_headers))
            }
            LlmProvider::OpenRouter => {
                let open_router = config.open_router.as_ref().ok_or_else(|| {
                    ClientError::Config(
                        "OpenRouter configuration is required when using OpenRouter as LLM provider"
                            .to_string(),
                    )
                })?;
                Box::new(OpenRouterProvider::new(open_router).with_extra_headers(extra_headers))
            }
        };

        Ok(Self {
            agent: config.agent,
            api_url: config.api_url().to_string(),
            http: build_http_client(&config.transport)?,
            provider,
        })
    }

    /// Create a client with a custom provider.
    pub fn with_provider(config: ClientConfig, provider: impl Provider + 'static) -> Result<Self, ClientError> {
        Ok(Self {
            agent: config.agent,
            api_url: config.api_url().to_string(),
            http: build_http_client(&config.transport)?,
            provider: Box::new(provider),
        })
    }

    pub fn agent(&self) -> Agent {
        self.agent
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Ask the agent a question and return its full answer.
    ///
    /// With [`AskOptions::streaming`], tokens are handed to `on_token` as they
    /// arrive and the returned string is their concatenation. When an `on_error`
    /// callback is supplied, failures are passed to it and the call resolves to an
    /// empty string; otherwise they are returned. Cancellation through
    /// [`AskOptions::with_cancel`] abandons the request at any stage and resolves
    /// to [`ClientError::StreamCancelled`] without invoking any callback.
    pub async fn ask(&self, question: &str, options: AskOptions<'_>) -> Result<String, ClientError> {
        let AskOptions {
            stream,
            mut on_token,
            on_error,
            cancel,
        } = options;

        let request = async {
            debug!(agent = %self.agent, provider = self.provider.name(), stream, "asking agent");
            let response = self.provider.send(&self.http, self.agent, question, stream).await?;

            if self.provider.is_event_stream(&response, stream) {
                let mut emit = |token: &str| {
                    if let Some(on_token) = on_token.as_mut() {
                        on_token(token);
                    }
                };
                reduce_tokens(
                    response.sse(),
                    self.provider.delta_extractor(),
                    &mut emit,
                    cancel.as_ref(),
                )
                .await
            } else {
                let body = response.bytes().await?;
                self.provider.complete_answer(&body)
            }
        };

        // Covers connecting and reading a non-streamed body too, not just the token stream.
        let result: Result<String, ClientError> = match cancel.as_ref() {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ClientError::StreamCancelled),
                result = request => result,
            },
            None => request.await,
        };

        match result {
            Err(ClientError::StreamCancelled) => Err(ClientError::StreamCancelled),
            Err(e) => match on_error {
                Some(on_error) => {
                    on_error(e);
                    Ok(String::new())
                }
                None => Err(e),
            },
            Ok(answer) => Ok(answer),
        }
    }

    /// Subscribe to trades of one token.
    pub async fn watch_token(&self, token_address: &str, options: WatchOptions) -> Result<Subscription, ClientError> {
        self.subscribe(
            StreamRoute::TokenTrades {
                token: token_address.to_string(),
            },
            options,
        )
        .await
    }

    /// Subscribe to trades made by one wallet.
    pub async fn watch_wallet(&self, wallet_address: &str, options: WatchOptions) -> Result<Subscription, ClientError> {
        self.subscribe(
            StreamRoute::AccountTrades {
                account: wallet_address.to_string(),
            },
            options,
        )
        .await
    }

    /// Subscribe to the agent's Raydium liquidity analysis.
    pub async fn watch_liquidity(&self, options: WatchOptions) -> Result<Subscription, ClientError> {
        self.subscribe(StreamRoute::Liquidity, options).await
    }

    /// Open a subscription on any route.
    pub async fn subscribe(&self, route: StreamRoute, options: WatchOptions) -> Result<Subscription, ClientError> {
        let url = socket_url(&self.api_url, self.agent, &route)?;
        Subscription::connect(&url, route, options).await.inspect_err(|e| {
            warn!(agent = %self.agent, error = %e, "failed to open subscription");
        })
    }
}

impl std::fmt::Debug for ChainMind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainMind")
            .field("agent", &self.agent)
            .field("api_url", &self.api_url)
            .field("provider", &self.provider.name())
            .finish()
    }
}
