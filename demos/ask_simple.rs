//! Ask an agent a question and print the complete answer.
//!
//! Run with:
//! ```bash
//! export CHAINMIND_AGENT="Stella"
//! cargo run --example ask_simple -- "What is the SOL outlook today?"
//! ```

use chainmind::options::{AskOptions, ClientConfig};
use chainmind::ChainMind;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What is the SOL outlook today?".to_string());

    let client = ChainMind::new(ClientConfig::from_env()?)?;
    println!("Asking {} via {}...\n", client.agent(), client.provider_name());

    let answer = client.ask(&question, AskOptions::new()).await?;
    println!("{}", answer);

    Ok(())
}
