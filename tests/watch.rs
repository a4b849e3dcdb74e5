use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chainmind::model::TradeSide;
use chainmind::options::{Agent, ClientConfig, WatchOptions};
use chainmind::{ChainMind, ClientError, StreamEvent};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

#[derive(Debug)]
enum Seen {
    Event(StreamEvent),
    Error(ClientError),
}

fn trade(symbol: &str, side: &str) -> String {
    json!({
        "symbol": symbol,
        "side": side,
        "tokenAmount": "1500",
        "price": "0.0021",
        "timestamp": "2024-05-01T12:00:00Z",
        "agentComment": "momentum building"
    })
    .to_string()
}

fn collect(tx: mpsc::UnboundedSender<Seen>) -> WatchOptions {
    let errors = tx.clone();
    WatchOptions::new()
        .on_data(move |event| {
            let _ = tx.send(Seen::Event(event));
        })
        .on_error(move |error| {
            let _ = errors.send(Seen::Error(error));
        })
}

// Sends `messages`, then waits for the client to close and reports it.
async fn serve_messages(mut socket: WebSocket, messages: Vec<String>, closed: Option<oneshot::Sender<()>>) {
    for message in messages {
        if socket.send(Message::Text(message)).await.is_err() {
            return;
        }
    }
    match closed {
        Some(closed) => {
            while let Some(Ok(msg)) = socket.recv().await {
                if let Message::Close(_) = msg {
                    let _ = closed.send(());
                    return;
                }
            }
        }
        None => {
            let _ = socket.send(Message::Close(None)).await;
        }
    }
}

async fn create_gateway() -> (String, mpsc::UnboundedReceiver<String>, oneshot::Receiver<()>) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = oneshot::channel();
    let closed_tx = Arc::new(std::sync::Mutex::new(Some(closed_tx)));

    let app = Router::new()
        .route(
            "/token-trades-stream/:agent",
            get(
                move |ws: WebSocketUpgrade,
                      Path(agent): Path<String>,
                      Query(query): Query<HashMap<String, String>>| {
                    let _ = request_tx.send(format!("{}:{}", agent, query.get("tokens").cloned().unwrap_or_default()));
                    let closed = closed_tx.lock().unwrap().take();
                    async move {
                        ws.on_upgrade(move |socket| {
                            serve_messages(
                                socket,
                                vec![trade("BONK", "buy"), "{not json".to_string(), trade("BONK", "sell")],
                                closed,
                            )
                        })
                    }
                },
            ),
        )
        .route(
            "/account-trades-stream/:agent",
            get(|ws: WebSocketUpgrade| async move {
                // Keeps sending until the client goes away.
                ws.on_upgrade(|mut socket| async move {
                    while socket.send(Message::Text(trade("WIF", "buy"))).await.is_ok() {}
                })
            }),
        )
        .route(
            "/raydium-liquidity-stream/:agent",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|socket| {
                    let change = json!({
                        "pool": "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2",
                        "tokenA": "SOL",
                        "tokenB": "USDC",
                        "amountA": "12000",
                        "amountB": "1800000",
                        "timestamp": "2024-05-01T12:00:00Z",
                        "agentComment": "liquidity added"
                    });
                    serve_messages(socket, vec![change.to_string()], None)
                })
                .into_response()
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", server_addr), request_rx, closed_rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for subscription callback")
        .expect("subscription callbacks dropped")
}

#[tokio::test]
async fn token_subscription_delivers_typed_events() {
    let (base_url, mut requests, closed) = create_gateway().await;
    let client = ChainMind::new(ClientConfig::new(Agent::Lumina).with_api_url(base_url)).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client.watch_token("BONK mint", collect(tx)).await.unwrap();

    assert_eq!(requests.recv().await.unwrap(), "Lumina:BONK mint");

    match next(&mut rx).await {
        Seen::Event(StreamEvent::Trade(trade)) => {
            assert_eq!(trade.symbol, "BONK");
            assert_eq!(trade.side, TradeSide::Buy);
        }
        other => panic!("expected trade, got {:?}", other),
    }
    assert!(matches!(next(&mut rx).await, Seen::Error(ClientError::Parse(_))));
    match next(&mut rx).await {
        Seen::Event(StreamEvent::Trade(trade)) => assert_eq!(trade.side, TradeSide::Sell),
        other => panic!("expected trade, got {:?}", other),
    }

    subscription.stop();
    subscription.stop();
    assert!(subscription.is_stopped());

    timeout(Duration::from_secs(5), closed)
        .await
        .expect("server never saw the close frame")
        .unwrap();
    timeout(Duration::from_secs(5), subscription.closed())
        .await
        .expect("subscription did not finish");

    // The callbacks were owned by the finished task, so the channel is now closed.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn liquidity_subscription_ends_when_server_closes() {
    let (base_url, _, _) = create_gateway().await;
    let client = ChainMind::new(ClientConfig::new(Agent::Stella).with_api_url(base_url)).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client.watch_liquidity(collect(tx)).await.unwrap();

    match next(&mut rx).await {
        Seen::Event(StreamEvent::Liquidity(change)) => {
            assert_eq!(change.token_a, "SOL");
            assert_eq!(change.amount_b, "1800000");
        }
        other => panic!("expected liquidity event, got {:?}", other),
    }

    timeout(Duration::from_secs(5), subscription.closed())
        .await
        .expect("subscription did not end after server close");
}

#[tokio::test]
async fn concurrent_subscriptions_are_independent() {
    let (base_url, _, _) = create_gateway().await;
    let client = ChainMind::new(ClientConfig::new(Agent::Matrix).with_api_url(base_url)).unwrap();

    let (token_tx, mut token_rx) = mpsc::unbounded_channel();
    let (pool_tx, mut pool_rx) = mpsc::unbounded_channel();
    let tokens = client.watch_token("BONK", collect(token_tx)).await.unwrap();
    let pools = client.watch_liquidity(collect(pool_tx)).await.unwrap();

    assert!(matches!(next(&mut token_rx).await, Seen::Event(StreamEvent::Trade(_))));
    assert!(matches!(next(&mut pool_rx).await, Seen::Event(StreamEvent::Liquidity(_))));

    pools.stop();
    assert!(!tokens.is_stopped());
    assert!(matches!(next(&mut token_rx).await, Seen::Error(ClientError::Parse(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_callback_starts_after_stop_returns() {
    let (base_url, _, _) = create_gateway().await;
    let client = ChainMind::new(ClientConfig::new(Agent::Matrix).with_api_url(base_url)).unwrap();

    for _ in 0..20 {
        let stopped = Arc::new(AtomicBool::new(false));
        let late = Arc::new(AtomicUsize::new(0));
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();

        let options = {
            let stopped = stopped.clone();
            let late = late.clone();
            WatchOptions::new().on_data(move |_| {
                if stopped.load(Ordering::SeqCst) {
                    late.fetch_add(1, Ordering::SeqCst);
                }
                let _ = first_tx.send(());
            })
        };
        let subscription = client.watch_wallet("flood", options).await.unwrap();

        timeout(Duration::from_secs(5), first_rx.recv())
            .await
            .expect("no event before stop")
            .unwrap();
        subscription.stop();
        stopped.store(true, Ordering::SeqCst);

        // Give the reader task a chance to deliver anything it already received.
        tokio::time::sleep(Duration::from_millis(20)).await;
        timeout(Duration::from_secs(5), subscription.closed())
            .await
            .expect("subscription did not finish after stop");

        assert_eq!(late.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn connection_failure_is_returned() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ChainMind::new(ClientConfig::new(Agent::Stella).with_api_url(format!("http://{}", addr))).unwrap();
    let result = client.watch_wallet("wallet", WatchOptions::new()).await;
    assert!(matches!(result, Err(ClientError::WebSocket(_))));
}
