//! Live stream session: one epoch-tagged subscription to a device's frame stream
//!
//! A [`StreamSession`] owns `connection_status` and `current_frame` in the
//! session state. Every write it makes is guarded inside the store's critical
//! section: the session's epoch must still be the current epoch and the
//! subscription must not have been torn down. Once [`StreamSession::close`]
//! returns, nothing this session receives can touch the state again.

use crate::transport::{ChannelEvent, FrameChannel, FrameTransport};
use std::sync::Arc;
use stormwatch_core::{
    decode_stream_message, ConnectionStatus, Epoch, EventReporter, NotificationTrigger,
    SessionEvent, SessionState, SessionStore, StormwatchError, StreamFrame, StreamMessage,
};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared collaborators a stream session needs
#[derive(Clone)]
pub struct SessionContext {
    /// Session state
    pub store: SessionStore,
    /// Transport subscriptions are opened on
    pub transport: Arc<dyn FrameTransport>,
    /// Notification trigger fed with accepted frames
    pub trigger: Arc<NotificationTrigger>,
    /// Event reporter
    pub events: EventReporter,
    /// Runtime subscription tasks are spawned on
    pub runtime: Handle,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

/// What happened to one pushed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Decoded and written to the state
    Accepted {
        /// Whether the notification sink was invoked
        notified: bool,
    },
    /// Malformed; state untouched
    Rejected,
    /// Error report from the server; state untouched
    ServerReported,
    /// From a superseded or closed subscription; state untouched
    Stale,
}

/// Handle to one live subscription
pub struct StreamSession {
    device_id: String,
    epoch: Epoch,
    subscription_id: Uuid,
    store: SessionStore,
    events: EventReporter,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Open a subscription for `device_id` tagged with `epoch`.
    ///
    /// Sets the status to `Connecting` and clears the previous frame if `epoch`
    /// is the current epoch, then connects in the background on the context's
    /// runtime. Callable from any thread.
    pub fn open(ctx: &SessionContext, device_id: impl Into<String>, epoch: Epoch) -> Self {
        let device_id = device_id.into();
        let subscription_id = Uuid::new_v4();

        let handler = FrameHandler {
            device_id: device_id.clone(),
            epoch,
            store: ctx.store.clone(),
            trigger: ctx.trigger.clone(),
            events: ctx.events.clone(),
        };

        let started = ctx.store.update(|state| {
            if state.reconnect_epoch != epoch {
                return false;
            }
            state.connection_status = ConnectionStatus::Connecting;
            state.current_frame = None;
            true
        });
        if started {
            ctx.events.report(SessionEvent::ConnectionChanged {
                epoch,
                status: ConnectionStatus::Connecting,
            });
        } else {
            debug!(%device_id, %epoch, "Opening a subscription for a superseded epoch");
        }

        info!(%device_id, %epoch, %subscription_id, transport = ctx.transport.name(), "Subscription opened");
        ctx.events.report(SessionEvent::SubscriptionOpened {
            device_id: device_id.clone(),
            epoch,
        });

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = ctx.runtime.spawn(run_subscription(handler, ctx.transport.clone(), shutdown_rx));

        Self {
            device_id,
            epoch,
            subscription_id,
            store: ctx.store.clone(),
            events: ctx.events.clone(),
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Record that no subscription exists for `epoch`: status `Idle`, no frame.
    ///
    /// Used when the selection is cleared; does nothing once `epoch` is superseded.
    pub fn mark_idle(store: &SessionStore, epoch: Epoch) -> bool {
        store.update(|state| {
            if state.reconnect_epoch != epoch {
                return false;
            }
            let changed =
                state.connection_status != ConnectionStatus::Idle || state.current_frame.is_some();
            state.connection_status = ConnectionStatus::Idle;
            state.current_frame = None;
            changed
        })
    }

    /// Tear the subscription down. Idempotent.
    ///
    /// Sets the status to `Closed` if this session's epoch is still current.
    /// The close handshake with the server finishes in the background.
    pub fn close(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };

        let epoch = self.epoch;
        let changed = self.store.update(|state| {
            if state.reconnect_epoch != epoch || state.connection_status == ConnectionStatus::Closed {
                return false;
            }
            state.connection_status = ConnectionStatus::Closed;
            true
        });
        // The receiver is gone if the task already ended
        let _ = shutdown.send(());

        info!(device_id = %self.device_id, %epoch, subscription_id = %self.subscription_id, "Subscription closed");
        self.events.report(SessionEvent::SubscriptionClosed {
            device_id: self.device_id.clone(),
            epoch,
        });
        if changed {
            self.events.report(SessionEvent::ConnectionChanged {
                epoch,
                status: ConnectionStatus::Closed,
            });
        }
    }

    /// Close and wait for the background task, including the close handshake
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(device_id = %self.device_id, "Subscription task panicked: {}", e);
                }
            }
        }
    }

    /// Device this session is bound to
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Epoch this session is tagged with
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Identifier used in logs
    pub fn subscription_id(&self) -> Uuid {
        self.subscription_id
    }

    /// Whether [`StreamSession::close`] has run
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none()
    }

    /// Status of this subscription; `Closed` once superseded or torn down
    pub fn status(&self) -> ConnectionStatus {
        if self.is_closed() {
            return ConnectionStatus::Closed;
        }
        self.store.read(|state| {
            if state.reconnect_epoch == self.epoch {
                state.connection_status
            } else {
                ConnectionStatus::Closed
            }
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("device_id", &self.device_id)
            .field("epoch", &self.epoch)
            .field("subscription_id", &self.subscription_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn run_subscription(
    handler: FrameHandler,
    transport: Arc<dyn FrameTransport>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let opened = tokio::select! {
        biased;
        _ = &mut shutdown => {
            debug!(device_id = %handler.device_id, epoch = %handler.epoch, "Closed before the subscription was established");
            return;
        }
        result = transport.open(&handler.device_id) => result,
    };

    let mut channel: Box<dyn FrameChannel> = match opened {
        Ok(channel) => channel,
        Err(error) => {
            handler.fail(error);
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                channel.close().await;
                return;
            }
            event = channel.next_event() => match event {
                ChannelEvent::Message(text) => {
                    handler.handle_text(&text);
                }
                ChannelEvent::Undecodable { reason } => {
                    handler.reject(StormwatchError::MessageDecode { reason });
                }
                ChannelEvent::Closed { reason } => {
                    handler.fail(StormwatchError::Connection {
                        device_id: handler.device_id.clone(),
                        reason: match reason {
                            Some(reason) => format!("closed by server: {}", reason),
                            None => "closed by server".to_string(),
                        },
                    });
                    return;
                }
                ChannelEvent::Error(error) => {
                    handler.fail(error);
                    return;
                }
            }
        }
    }
}

/// Applies what one subscription receives to the session state
pub(crate) struct FrameHandler {
    pub(crate) device_id: String,
    pub(crate) epoch: Epoch,
    pub(crate) store: SessionStore,
    pub(crate) trigger: Arc<NotificationTrigger>,
    pub(crate) events: EventReporter,
}

impl FrameHandler {
    /// Whether this subscription may still write to `state`
    fn owns(&self, state: &SessionState) -> bool {
        state.reconnect_epoch == self.epoch && state.connection_status.is_active()
    }

    pub(crate) fn handle_text(&self, text: &str) -> Delivery {
        if !self.store.read(|state| self.owns(state)) {
            return self.drop_stale();
        }

        match decode_stream_message(text) {
            Ok(StreamMessage::Frame(frame)) => self.accept(frame),
            Ok(StreamMessage::ServerError(message)) => {
                warn!(device_id = %self.device_id, epoch = %self.epoch, "Server reported: {}", message);
                self.events.report(SessionEvent::ServerReported {
                    epoch: self.epoch,
                    message,
                });
                Delivery::ServerReported
            }
            Err(error) => {
                self.reject(error);
                Delivery::Rejected
            }
        }
    }

    fn accept(&self, frame: StreamFrame) -> Delivery {
        let mut muted = false;
        let mut went_live = false;
        let accepted = self.store.update(|state| {
            if !self.owns(state) {
                return false;
            }
            went_live = state.connection_status != ConnectionStatus::Live;
            muted = state.muted;
            state.connection_status = ConnectionStatus::Live;
            state.current_frame = Some(frame.clone());
            true
        });
        if !accepted {
            return self.drop_stale();
        }

        if went_live {
            info!(device_id = %self.device_id, epoch = %self.epoch, "Subscription live");
            self.events.report(SessionEvent::ConnectionChanged {
                epoch: self.epoch,
                status: ConnectionStatus::Live,
            });
        }
        self.events.report(SessionEvent::FrameAccepted {
            epoch: self.epoch,
            threat_count: frame.threats.len(),
        });

        let notified = self.trigger.observe(&self.device_id, self.epoch, &frame, muted);
        Delivery::Accepted { notified }
    }

    pub(crate) fn reject(&self, error: StormwatchError) {
        debug!(device_id = %self.device_id, epoch = %self.epoch, "Discarding message: {}", error);
        self.events.report(SessionEvent::MessageRejected {
            epoch: self.epoch,
            error,
        });
    }

    pub(crate) fn fail(&self, error: StormwatchError) {
        let failed = self.store.update(|state| {
            if !self.owns(state) {
                return false;
            }
            state.connection_status = ConnectionStatus::Failed;
            true
        });
        if !failed {
            debug!(device_id = %self.device_id, epoch = %self.epoch, "Ignoring failure of a superseded subscription: {}", error);
            return;
        }

        warn!(device_id = %self.device_id, epoch = %self.epoch, "Subscription failed: {}", error);
        self.events.report(SessionEvent::ConnectionFailed {
            epoch: self.epoch,
            error,
        });
        self.events.report(SessionEvent::ConnectionChanged {
            epoch: self.epoch,
            status: ConnectionStatus::Failed,
        });
    }

    fn drop_stale(&self) -> Delivery {
        let current_epoch = self.store.read(|state| state.reconnect_epoch);
        debug!(device_id = %self.device_id, message_epoch = %self.epoch, %current_epoch, "Dropping stale message");
        self.events.report(SessionEvent::StaleMessageDropped {
            message_epoch: self.epoch,
            current_epoch,
        });
        Delivery::Stale
    }
}
