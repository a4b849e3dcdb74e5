//! Stream an answer token by token, through OpenRouter if configured.
//!
//! Run with:
//! ```bash
//! export CHAINMIND_AGENT="Matrix"
//! export CHAINMIND_LLM_PROVIDER="openrouter"
//! export OPENROUTER_API_KEY="your-api-key"
//! cargo run --example ask_streaming
//! ```
//!
//! Press Ctrl-C to stop the stream early.

use std::io::Write;

use chainmind::options::{AskOptions, ClientConfig};
use chainmind::{ChainMind, ClientError};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = ChainMind::new(ClientConfig::from_env()?)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    print!("Response: ");
    let options = AskOptions::new()
        .streaming()
        .with_cancel(cancel)
        .on_token(|token| {
            print!("{}", token);
            let _ = std::io::stdout().flush();
        })
        .on_error(|e| eprintln!("\nError in stream: {}", e));

    match client.ask("Write a haiku about Solana memecoins.", options).await {
        Ok(answer) => println!("\n\n=== Stream Complete ({} chars) ===", answer.chars().count()),
        Err(ClientError::StreamCancelled) => println!("\n\n=== Stream Cancelled ==="),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
