//! Follow the trades of one token for a minute.
//!
//! Run with:
//! ```bash
//! export CHAINMIND_AGENT="Lumina"
//! cargo run --example watch_token -- DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263
//! ```

use std::time::Duration;

use chainmind::options::{ClientConfig, WatchOptions};
use chainmind::{ChainMind, StreamEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let token = std::env::args()
        .nth(1)
        .ok_or("usage: watch_token <token address>")?;

    let client = ChainMind::new(ClientConfig::from_env()?)?;

    let options = WatchOptions::new()
        .on_data(|event| match event {
            StreamEvent::Trade(trade) => println!(
                "{} {:?} {} @ {} - {}",
                trade.symbol, trade.side, trade.token_amount, trade.price, trade.agent_comment
            ),
            StreamEvent::Liquidity(change) => println!("{}: {}", change.pool, change.agent_comment),
        })
        .on_error(|e| eprintln!("subscription error: {}", e));

    let subscription = client.watch_token(&token, options).await?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(60)) => subscription.stop(),
        _ = tokio::signal::ctrl_c() => subscription.stop(),
    }
    subscription.closed().await;

    Ok(())
}
