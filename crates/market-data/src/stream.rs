use aggregator::TradeEvent;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected,
    Trade(TradeEvent),
    /// A trade message that failed validation; carries the reason.
    Rejected(String),
    Disconnected,
}

/// Bounded channel between the feed task and its consumer.
pub fn channel(capacity: usize) -> (mpsc::Sender<FeedEvent>, FeedStream) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (sender, FeedStream::new(receiver))
}

#[derive(Debug)]
pub struct FeedStream {
    receiver: mpsc::Receiver<FeedEvent>,
}

impl FeedStream {
    #[inline]
    pub fn new(receiver: mpsc::Receiver<FeedEvent>) -> Self {
        Self { receiver }
    }

    #[inline]
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.receiver.recv().await
    }
}

impl Stream for FeedStream {
    type Item = FeedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
