use crate::backoff::Backoff;
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::stream::{self, FeedEvent, FeedStream};
use crate::types::{parse_payload, Channel, FeedMessage, SubscribeRequest};
use aggregator::TradeEvent;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a listening session stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    ServerClosed,
    ConsumerGone,
}

/// Client for the Coinbase `matches` channel.
#[derive(Debug, Clone)]
pub struct CoinbaseFeed {
    config: Arc<FeedConfig>,
}

impl CoinbaseFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[inline]
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Dials the feed, retrying until the connect timeout runs out.
    pub async fn connect(&self) -> Result<WsStream, FeedError> {
        let url = self.config.url.as_str();
        let retry = Duration::from_millis(self.config.connect_retry_interval_ms.max(1));
        let deadline = Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);

        loop {
            match timeout_at(deadline, connect_async(url)).await {
                Ok(Ok((ws, _))) => {
                    info!("Connected to websocket: {}", url);
                    return Ok(ws);
                }
                Ok(Err(e)) => {
                    error!("Cannot connect to websocket {}: {}", url, e);
                }
                Err(_) => break,
            }

            if Instant::now() + retry > deadline {
                break;
            }
            sleep(retry).await;
        }

        Err(FeedError::ConnectTimeout {
            url: url.to_string(),
            timeout_ms: self.config.connect_timeout_ms,
        })
    }

    /// Sends the subscription and waits up to the connect timeout for the
    /// server to acknowledge it.
    pub async fn subscribe(&self, ws: &mut WsStream) -> Result<Vec<Channel>, FeedError> {
        if self.config.product_ids.is_empty() {
            return Err(FeedError::NoProducts);
        }

        info!("Subscribing for trading pairs: {:?}", self.config.product_ids);
        let request = SubscribeRequest::matches(&self.config.product_ids);
        ws.send(Message::Text(serde_json::to_string(&request)?))
            .await?;

        let deadline = Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);
        timeout_at(deadline, Self::await_ack(ws))
            .await
            .map_err(|_| FeedError::SubscribeTimeout {
                timeout_ms: self.config.connect_timeout_ms,
            })?
    }

    async fn await_ack(ws: &mut WsStream) -> Result<Vec<Channel>, FeedError> {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<FeedMessage>(&text)? {
                    FeedMessage::Subscriptions { channels } => {
                        info!("Subscription confirmed: {:?}", channels);
                        return Ok(channels);
                    }
                    FeedMessage::Error { message, reason } => {
                        return Err(FeedError::SubscriptionRejected { message, reason });
                    }
                    other => {
                        debug!("Ignoring message before subscription ack: {:?}", other);
                    }
                },
                Some(Ok(Message::Close(_))) | None => return Err(FeedError::ConnectionClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Reads frames until the server closes, the consumer goes away or
    /// `shutdown` fires. Trades are validated before they are forwarded.
    pub async fn listen(
        &self,
        ws: &mut WsStream,
        events: &mpsc::Sender<FeedEvent>,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd, FeedError> {
        let period = Duration::from_secs(self.config.ping_interval_secs.max(1));
        let mut keepalive = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                _ = keepalive.tick() => {
                    debug!("Sending keepalive ping");
                    ws.send(Message::Ping(Vec::new())).await?;
                }
                frame = ws.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::ServerClosed),
                    };

                    match message {
                        Message::Text(text) => {
                            debug!("Received text message: {}", text);
                            let event = match parse_payload(&text) {
                                Ok(Some(m)) => match TradeEvent::try_from(&m) {
                                    Ok(trade) => FeedEvent::Trade(trade),
                                    Err(e) => {
                                        warn!("Rejecting trade {} for {}: {}", m.trade_id, m.product_id, e);
                                        FeedEvent::Rejected(e.to_string())
                                    }
                                },
                                Ok(None) => {
                                    debug!("Ignoring non-trade message");
                                    continue;
                                }
                                Err(e @ FeedError::Exchange { .. }) => return Err(e),
                                Err(e) => {
                                    warn!("Skipping unparseable message: {}", e);
                                    continue;
                                }
                            };
                            if events.send(event).await.is_err() {
                                return Ok(SessionEnd::ConsumerGone);
                            }
                        }
                        Message::Binary(_) => {
                            debug!("Ignoring binary message");
                        }
                        Message::Ping(_) => {
                            // tungstenite queues the pong itself
                            debug!("Received ping");
                        }
                        Message::Pong(_) => {
                            debug!("Received pong");
                        }
                        Message::Close(frame) => {
                            info!("Received close from server: {:?}", frame);
                            return Ok(SessionEnd::ServerClosed);
                        }
                        Message::Frame(_) => {}
                    }
                }
            }
        }
    }

    async fn session(
        &self,
        events: &mpsc::Sender<FeedEvent>,
        shutdown: &CancellationToken,
        backoff: &mut Backoff,
    ) -> Result<SessionEnd, FeedError> {
        let mut ws = self.connect().await?;
        self.subscribe(&mut ws).await?;
        backoff.reset();

        if events.send(FeedEvent::Connected).await.is_err() {
            return Ok(SessionEnd::ConsumerGone);
        }

        let end = self.listen(&mut ws, events, shutdown).await;
        info!("Closing websocket connection");
        if let Err(e) = ws.close(None).await {
            warn!("Failed to close websocket cleanly: {}", e);
        }
        end
    }

    /// Runs sessions back to back, reconnecting with backoff, until shutdown,
    /// a fatal error, or the consumer dropping its stream.
    pub async fn run(
        self,
        events: mpsc::Sender<FeedEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), FeedError> {
        let mut backoff = Backoff::new(&self.config.reconnect);

        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => Ok(SessionEnd::Shutdown),
                outcome = self.session(&events, &shutdown, &mut backoff) => outcome,
            };

            match outcome {
                Ok(SessionEnd::Shutdown) => {
                    info!("Feed stopped by shutdown");
                    return Ok(());
                }
                Ok(SessionEnd::ConsumerGone) => {
                    info!("Feed consumer dropped, stopping");
                    return Ok(());
                }
                Ok(SessionEnd::ServerClosed) => {
                    warn!("Feed closed by server");
                }
                Err(e) if e.is_fatal() => {
                    error!("Feed failed: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Feed session failed: {}", e);
                }
            }

            if events.send(FeedEvent::Disconnected).await.is_err() {
                return Ok(());
            }

            let delay = backoff.next_delay().ok_or(FeedError::ReconnectExhausted {
                attempts: backoff.attempts(),
            })?;
            info!(
                "Reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                backoff.attempts()
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(
        self,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (FeedStream, JoinHandle<Result<(), FeedError>>) {
        let (sender, stream) = stream::channel(capacity);
        let handle = tokio::spawn(self.run(sender, shutdown));
        (stream, handle)
    }
}
