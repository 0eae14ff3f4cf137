use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::AppResult;

use super::{InboundEvent, Ingestor};

/// Abstraction over the upstream event stream. The production transport
/// (Kafka or similar) lives outside this crate's scope; `ChannelEventTransport`
/// is an in-process stand-in used for local development and tests.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn recv(&mut self) -> AppResult<Option<InboundEvent>>;
}

pub struct ChannelEventTransport {
    receiver: mpsc::Receiver<InboundEvent>,
}

impl ChannelEventTransport {
    pub fn new(capacity: usize) -> (mpsc::Sender<InboundEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { receiver: rx })
    }
}

#[async_trait]
impl EventTransport for ChannelEventTransport {
    async fn recv(&mut self) -> AppResult<Option<InboundEvent>> {
        Ok(self.receiver.recv().await)
    }
}

/// Drains a transport into the Ingestor until it closes or shutdown fires.
/// This is what actually makes C7 reachable: without a spawned consumer,
/// `Ingestor::handle_event` has nothing driving it.
pub fn spawn_event_consumer(
    mut transport: impl EventTransport + 'static,
    ingestor: Ingestor,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = transport.recv() => {
                    match event {
                        Ok(Some(event)) => {
                            if let Err(e) = ingestor.handle_event(event).await {
                                tracing::warn!(error = %e, "event ingestion failed");
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "event transport read failed");
                            break;
                        }
                    }
                }
            }
        }
    })
}
