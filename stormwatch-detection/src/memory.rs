//! In-process frame transport
//!
//! [`MemoryTransport`] and its [`MemoryServer`] handle stand in for the
//! Detection Server: the server side pushes messages, closes or breaks
//! subscriptions, and refuses devices, while the client side sees the same
//! [`FrameChannel`] contract as the WebSocket transport.

use crate::transport::{ChannelEvent, FrameChannel, FrameTransport};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stormwatch_core::StormwatchError;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

struct Subscription {
    sender: mpsc::UnboundedSender<ChannelEvent>,
    closed_by_client: Arc<AtomicBool>,
}

impl Subscription {
    fn is_live(&self) -> bool {
        !self.closed_by_client.load(Ordering::SeqCst) && !self.sender.is_closed()
    }
}

#[derive(Default)]
struct Shared {
    subscriptions: DashMap<String, Vec<Subscription>>,
    refused: DashMap<String, String>,
    opened: Notify,
}

/// Client half: hands out channels backed by the paired [`MemoryServer`]
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Server half: drives the channels opened through the paired [`MemoryTransport`]
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Shared>,
}

/// Create a connected transport/server pair
pub fn memory_transport() -> (MemoryTransport, MemoryServer) {
    let shared = Arc::new(Shared::default());
    (
        MemoryTransport {
            shared: shared.clone(),
        },
        MemoryServer { shared },
    )
}

#[async_trait]
impl FrameTransport for MemoryTransport {
    async fn open(&self, device_id: &str) -> Result<Box<dyn FrameChannel>, StormwatchError> {
        if let Some(reason) = self.shared.refused.get(device_id) {
            return Err(StormwatchError::Connection {
                device_id: device_id.to_string(),
                reason: reason.clone(),
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let closed_by_client = Arc::new(AtomicBool::new(false));
        self.shared
            .subscriptions
            .entry(device_id.to_string())
            .or_default()
            .push(Subscription {
                sender,
                closed_by_client: closed_by_client.clone(),
            });
        self.shared.opened.notify_waiters();
        debug!(device_id, "Memory subscription opened");

        Ok(Box::new(MemoryChannel {
            receiver,
            closed_by_client,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryServer {
    /// Push a text message to every live subscription of `device_id`.
    ///
    /// Returns the number of subscriptions reached.
    pub fn push(&self, device_id: &str, text: impl Into<String>) -> usize {
        self.broadcast(device_id, ChannelEvent::Message(text.into()))
    }

    /// Push a raw channel event to every live subscription of `device_id`
    pub fn push_event(&self, device_id: &str, event: ChannelEvent) -> usize {
        self.broadcast(device_id, event)
    }

    /// Push to one subscription by open order, live or not.
    ///
    /// Lets tests deliver a late message on a subscription the client has
    /// already abandoned. Returns whether the message was queued.
    pub fn push_to(&self, device_id: &str, index: usize, text: impl Into<String>) -> bool {
        self.shared
            .subscriptions
            .get(device_id)
            .and_then(|subs| {
                subs.get(index)
                    .map(|sub| sub.sender.send(ChannelEvent::Message(text.into())).is_ok())
            })
            .unwrap_or(false)
    }

    /// End every live subscription of `device_id` from the server side
    pub fn close_remote(&self, device_id: &str, reason: Option<&str>) -> usize {
        self.broadcast(
            device_id,
            ChannelEvent::Closed {
                reason: reason.map(str::to_string),
            },
        )
    }

    /// Make future opens for `device_id` fail
    pub fn refuse(&self, device_id: &str, reason: impl Into<String>) {
        self.shared
            .refused
            .insert(device_id.to_string(), reason.into());
    }

    /// Accept opens for `device_id` again
    pub fn accept(&self, device_id: &str) {
        self.shared.refused.remove(device_id);
    }

    /// Total subscriptions ever opened for `device_id`
    pub fn open_count(&self, device_id: &str) -> usize {
        self.shared
            .subscriptions
            .get(device_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Subscriptions of `device_id` that are still open on the client side
    pub fn live_subscriptions(&self, device_id: &str) -> usize {
        self.shared
            .subscriptions
            .get(device_id)
            .map(|subs| subs.iter().filter(|sub| sub.is_live()).count())
            .unwrap_or(0)
    }

    /// Wait until at least `count` subscriptions were opened for `device_id`
    pub async fn wait_for_opens(&self, device_id: &str, count: usize) {
        loop {
            let opened = self.shared.opened.notified();
            if self.open_count(device_id) >= count {
                return;
            }
            opened.await;
        }
    }

    fn broadcast(&self, device_id: &str, event: ChannelEvent) -> usize {
        let Some(subs) = self.shared.subscriptions.get(device_id) else {
            return 0;
        };
        subs.iter()
            .filter(|sub| sub.is_live())
            .filter(|sub| sub.sender.send(event.clone()).is_ok())
            .count()
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("devices", &self.shared.subscriptions.len())
            .finish()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport").finish_non_exhaustive()
    }
}

struct MemoryChannel {
    receiver: mpsc::UnboundedReceiver<ChannelEvent>,
    closed_by_client: Arc<AtomicBool>,
}

#[async_trait]
impl FrameChannel for MemoryChannel {
    async fn next_event(&mut self) -> ChannelEvent {
        match self.receiver.recv().await {
            Some(event) => event,
            None => ChannelEvent::Closed { reason: None },
        }
    }

    async fn close(&mut self) {
        self.closed_by_client.store(true, Ordering::SeqCst);
        self.receiver.close();
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.closed_by_client.store(true, Ordering::SeqCst);
    }
}
