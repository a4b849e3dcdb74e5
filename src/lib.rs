//! # chainmind - ChainMind agent client
//!
//! Ask ChainMind's Solana analysis agents questions and follow their real-time
//! trade and liquidity streams.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Answers from the first-party agent API or through OpenRouter
//! - Token-by-token streaming via Server-Sent Events, tolerant of frames split
//!   across network reads
//! - WebSocket subscriptions with typed trade and liquidity events
//! - Logging through `tracing`; nothing is written to stdout by the library
//!
//! ## Architecture
//!
//! A streamed answer flows through two stages shared by every provider:
//!
//! 1. **[`sse`]**: buffers raw chunks into complete lines and classifies them into frames
//! 2. **[`stream`]**: extracts delta tokens, calls the token callback and accumulates the answer
//!
//! [`providers`] only decide how a request is built and how a complete reply is read.
//!
//! ## Example
//! ```no_run
//! use chainmind::agent::ChainMind;
//! use chainmind::model::StreamEvent;
//! use chainmind::options::{Agent, AskOptions, ClientConfig, WatchOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChainMind::new(ClientConfig::new(Agent::Stella))?;
//!
//!     let answer = client.ask("Summarise today's SOL flows", AskOptions::new()).await?;
//!     println!("{}", answer);
//!
//!     let subscription = client
//!         .watch_liquidity(WatchOptions::new().on_data(|event| {
//!             if let StreamEvent::Liquidity(change) = event {
//!                 println!("{}: {}", change.pool, change.agent_comment);
//!             }
//!         }))
//!         .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     subscription.stop();
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod client;
pub mod http;
pub mod model;
pub mod options;
pub mod providers;
pub mod sse;
pub mod stream;
pub mod subscribe;

// Re-exports for convenience
pub use agent::ChainMind;
pub use client::{ClientError, Provider};
pub use model::{LiquidityEvent, StreamEvent, TradeEvent};
pub use options::{Agent, AskOptions, ClientConfig, LlmProvider, OpenRouterConfig, WatchOptions};
pub use subscribe::Subscription;
