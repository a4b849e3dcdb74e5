//! Real-time event subscriptions over WebSocket.
//!
//! Each `watch_*` call opens its own socket and returns a [`Subscription`] that
//! owns it. Messages are decoded into [`StreamEvent`]s and delivered to the
//! callbacks on a background task until the server closes the socket, a socket
//! error occurs, or the subscription is stopped.

use futures::{SinkExt, StreamExt};
use parking_lot::ReentrantMutex;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::model::{EventKind, StreamEvent};
use crate::options::{Agent, WatchOptions};

/// The gateway stream a subscription reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRoute {
    /// Trades of one token.
    TokenTrades { token: String },
    /// Trades made by one wallet.
    AccountTrades { account: String },
    /// Raydium liquidity changes.
    Liquidity,
}

impl StreamRoute {
    pub fn segment(&self) -> &'static str {
        match self {
            StreamRoute::TokenTrades { .. } => "token-trades-stream",
            StreamRoute::AccountTrades { .. } => "account-trades-stream",
            StreamRoute::Liquidity => "raydium-liquidity-stream",
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            StreamRoute::TokenTrades { .. } | StreamRoute::AccountTrades { .. } => EventKind::Trade,
            StreamRoute::Liquidity => EventKind::Liquidity,
        }
    }

    fn query(&self) -> Option<String> {
        match self {
            StreamRoute::TokenTrades { token } => Some(format!("tokens={}", urlencoding::encode(token))),
            StreamRoute::AccountTrades { account } => {
                Some(format!("accounts={}", urlencoding::encode(account)))
            }
            StreamRoute::Liquidity => None,
        }
    }
}

impl fmt::Display for StreamRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Build the socket URL for `route` from an HTTP(S) API base URL.
///
/// ```
/// use chainmind::options::Agent;
/// use chainmind::subscribe::{socket_url, StreamRoute};
///
/// let url = socket_url(
///     "https://api.chainmind.network",
///     Agent::Stella,
///     &StreamRoute::TokenTrades { token: "So11111111111111111111111111111111111111112".into() },
/// )
/// .unwrap();
/// assert_eq!(
///     url,
///     "wss://api.chainmind.network/token-trades-stream/Stella?tokens=So11111111111111111111111111111111111111112"
/// );
/// ```
pub fn socket_url(api_url: &str, agent: Agent, route: &StreamRoute) -> Result<String, ClientError> {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("wss://") || base.starts_with("ws://") {
        base.to_string()
    } else {
        return Err(ClientError::Config(format!(
            "API URL must use http, https, ws or wss: {}",
            api_url
        )));
    };

    let mut url = format!("{}/{}/{}", base, route.segment(), agent);
    if let Some(query) = route.query() {
        url.push('?');
        url.push_str(&query);
    }
    Ok(url)
}

/// Handle to one open socket subscription.
///
/// Stopping is idempotent, and no callback starts once [`stop`](Self::stop)
/// has returned. Dropping the handle stops the subscription.
pub struct Subscription {
    route: StreamRoute,
    cancel: CancellationToken,
    gate: Arc<ReentrantMutex<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Connect to `url` and start delivering events for `route`.
    pub async fn connect(url: &str, route: StreamRoute, options: WatchOptions) -> Result<Self, ClientError> {
        debug!(url, "opening subscription");
        let (socket, _) = connect_async(url).await?;

        let cancel = CancellationToken::new();
        let gate = Arc::new(ReentrantMutex::new(()));
        let delivery = Delivery {
            route: route.clone(),
            options,
            cancel: cancel.clone(),
            gate: gate.clone(),
        };
        let task = tokio::spawn(run(socket, delivery));

        Ok(Self {
            route,
            cancel,
            gate,
            task: Some(task),
        })
    }

    pub fn route(&self) -> &StreamRoute {
        &self.route
    }

    /// Close the socket. Calling this more than once has no further effect.
    ///
    /// Waits for a callback running on another thread to return. Calling `stop`
    /// from inside a callback is allowed.
    pub fn stop(&self) {
        self.cancel.cancel();
        drop(self.gate.lock());
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the session has ended, normally or on error.
    pub async fn closed(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(route = %self.route, error = %e, "subscription task failed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("route", &self.route)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Callback side of a subscription, owned by its reader task.
struct Delivery {
    route: StreamRoute,
    options: WatchOptions,
    cancel: CancellationToken,
    // Held while a callback is checked and invoked, so `stop` can wait it out.
    gate: Arc<ReentrantMutex<()>>,
}

impl Delivery {
    fn message(&mut self, raw: &str) -> ControlFlow<()> {
        debug!(route = %self.route, raw, "subscription message");
        match self.route.event_kind().decode(raw) {
            Ok(event) => {
                debug!(route = %self.route, ?event, "decoded subscription event");
                let gate = self.gate.clone();
                let _guard = gate.lock();
                if self.cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                if let Some(on_data) = self.options.on_data.as_mut() {
                    on_data(event);
                }
                ControlFlow::Continue(())
            }
            Err(e) => self.error(ClientError::from(e)),
        }
    }

    fn error(&mut self, error: ClientError) -> ControlFlow<()> {
        let gate = self.gate.clone();
        let _guard = gate.lock();
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        match self.options.on_error.as_mut() {
            Some(on_error) => on_error(error),
            None => warn!(route = %self.route, error = %error, "subscription error"),
        }
        ControlFlow::Continue(())
    }
}

async fn run<S>(mut socket: S, mut delivery: Delivery)
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let cancel = delivery.cancel.clone();

    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            msg = socket.next() => Some(msg),
        };

        let flow = match msg {
            None => break,
            Some(Some(Ok(Message::Text(text)))) => delivery.message(&text),
            Some(Some(Ok(Message::Binary(bytes)))) => match String::from_utf8(bytes) {
                Ok(text) => delivery.message(&text),
                Err(e) => {
                    debug!(route = %delivery.route, error = %e, "ignoring non-UTF-8 binary message");
                    ControlFlow::Continue(())
                }
            },
            Some(Some(Ok(Message::Close(frame)))) => {
                debug!(route = %delivery.route, ?frame, "subscription closed by server");
                return;
            }
            Some(Some(Ok(_))) => ControlFlow::Continue(()),
            Some(Some(Err(e))) => {
                let _ = delivery.error(ClientError::from(e));
                return;
            }
            Some(None) => return,
        };

        if flow.is_break() {
            break;
        }
    }

    if let Err(e) = socket.close().await {
        debug!(route = %delivery.route, error = %e, "error closing socket");
    }
}
