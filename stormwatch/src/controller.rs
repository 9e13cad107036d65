//! Session controller: composes device registry, stream session, history poller
//! and notification trigger into one client session

use crate::config::ClientConfig;
use crate::event::{EventHub, EventStream};
use crate::view::ViewModel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stormwatch_capture::{platform_provider, DeviceProvider, DeviceRegistry};
use stormwatch_core::{
    CaptureDevice, Epoch, EventReporter, NotificationSink, NotificationTrigger, SessionState,
    SessionStore, StormwatchError, TerminalBellSink, Theme,
};
use stormwatch_detection::{
    AlertHistoryPoller, FrameTransport, HistorySource, HttpHistorySource, SessionContext,
    StreamSession, WebSocketTransport,
};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Fluent builder for a [`SessionController`]
///
/// Every collaborator is optional; the defaults talk to the configured
/// Detection Server, enumerate the host's cameras and ring the terminal bell.
pub struct SessionControllerBuilder {
    config: ClientConfig,
    device_provider: Option<Arc<dyn DeviceProvider>>,
    transport: Option<Arc<dyn FrameTransport>>,
    history_source: Option<Arc<dyn HistorySource>>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    hub: Option<(EventHub, EventReporter)>,
}

impl SessionControllerBuilder {
    fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            device_provider: None,
            transport: None,
            history_source: None,
            notification_sink: None,
            hub: None,
        }
    }

    /// Use `config` instead of the defaults
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Enumerate devices through `provider`
    pub fn device_provider(mut self, provider: Arc<dyn DeviceProvider>) -> Self {
        self.device_provider = Some(provider);
        self
    }

    /// Open subscriptions through `transport`
    pub fn transport(mut self, transport: Arc<dyn FrameTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Poll history from `source`
    pub fn history_source(mut self, source: Arc<dyn HistorySource>) -> Self {
        self.history_source = Some(source);
        self
    }

    /// Render threat notifications through `sink`
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    /// Open an event stream before the session starts, so startup events are seen
    pub fn event_stream(&mut self) -> EventStream {
        self.hub.get_or_insert_with(EventHub::start).0.subscribe()
    }

    /// Build the controller, enumerate devices, start history polling and
    /// select the first device when configured to.
    ///
    /// Enumeration failure is not an error here: it is reported as an event and
    /// the session starts with an empty device list.
    pub async fn start(mut self) -> Result<SessionController, StormwatchError> {
        self.config.validate()?;
        let config = self.config;

        let device_provider: Arc<dyn DeviceProvider> = match self.device_provider {
            Some(provider) => provider,
            None => Arc::from(platform_provider()),
        };
        let transport: Arc<dyn FrameTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(WebSocketTransport::new(config.server.clone())?),
        };
        let history_source: Arc<dyn HistorySource> = match self.history_source {
            Some(source) => source,
            None => Arc::new(HttpHistorySource::new(&config.server)?),
        };
        let notification_sink: Arc<dyn NotificationSink> = match self.notification_sink {
            Some(sink) => sink,
            None => Arc::new(TerminalBellSink),
        };
        let (hub, events) = match self.hub.take() {
            Some(hub) => hub,
            None => EventHub::start(),
        };

        let store = SessionStore::new(SessionState {
            muted: config.start_muted,
            theme: config.initial_theme,
            ..SessionState::default()
        });

        let controller = SessionController {
            registry: DeviceRegistry::new(device_provider, store.clone(), events.clone()),
            poller: AlertHistoryPoller::new(history_source, store.clone(), events.clone()),
            context: SessionContext {
                store: store.clone(),
                transport,
                trigger: Arc::new(NotificationTrigger::new(notification_sink, events.clone())),
                events,
                runtime: Handle::current(),
            },
            store,
            session: Mutex::new(None),
            hub,
            shut_down: AtomicBool::new(false),
            config,
        };

        controller.poller.start(controller.config.poll_interval)?;

        if let Ok(devices) = controller.registry.list_devices().await {
            if controller.config.auto_select_first_device {
                if let Some(first) = devices.first() {
                    controller.select_device(&first.id);
                }
            }
        }

        info!(
            devices = controller.registry.devices().len(),
            transport = controller.context.transport.name(),
            "Session started"
        );
        Ok(controller)
    }
}

impl std::fmt::Debug for SessionControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionControllerBuilder")
            .field("config", &self.config)
            .field("device_provider", &self.device_provider.as_ref().map(|p| p.backend_name()))
            .field("transport", &self.transport.as_ref().map(|t| t.name()))
            .finish_non_exhaustive()
    }
}

/// One monitoring client session
///
/// Owns the merged [`SessionState`] and is the only writer of the selected
/// device, the mute flag, the theme and the reconnect epoch. Mutators return
/// nothing; their effects show up in later snapshots and on the event stream.
pub struct SessionController {
    config: ClientConfig,
    store: SessionStore,
    registry: DeviceRegistry,
    context: SessionContext,
    session: Mutex<Option<StreamSession>>,
    poller: AlertHistoryPoller,
    hub: EventHub,
    shut_down: AtomicBool,
}

impl SessionController {
    /// Start configuring a session
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::new()
    }

    /// Snapshot of the merged session state
    pub fn state(&self) -> SessionState {
        self.store.snapshot()
    }

    /// Presentation model of the current state
    pub fn view(&self) -> ViewModel {
        self.store.read(ViewModel::project)
    }

    /// Receiver woken on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    /// Stream of session events reported from now on
    pub fn events(&self) -> EventStream {
        self.hub.subscribe()
    }

    /// Configuration the session was started with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Devices from the last enumeration
    pub fn devices(&self) -> Vec<CaptureDevice> {
        self.registry.devices()
    }

    /// Bind the live subscription to `device_id`.
    ///
    /// Callable from any thread; the subscription runs on the runtime the
    /// session was started on.
    ///
    /// The previous subscription is closed first, then the epoch advances and
    /// a new subscription opens. Reselecting the same device restarts it, which
    /// is how a `Failed` subscription is recovered. An empty id clears the
    /// selection and leaves no subscription open.
    pub fn select_device(&self, device_id: &str) {
        if self.is_shut_down() {
            warn!(device_id, "Ignoring device selection after shutdown");
            return;
        }

        let mut slot = self.session.lock();
        if let Some(mut previous) = slot.take() {
            previous.close();
        }

        let selection = (!device_id.is_empty()).then(|| device_id.to_string());
        if let Some(id) = &selection {
            if self.registry.find(id).is_none() {
                debug!(device_id = %id, "Selected device is not in the enumerated list");
            }
        }

        let mut epoch = Epoch::default();
        self.store.update(|state| {
            epoch = state.reconnect_epoch.next();
            state.reconnect_epoch = epoch;
            state.selected_device_id = selection.clone();
            true
        });

        match selection {
            Some(id) => {
                info!(device_id = %id, %epoch, "Device selected");
                *slot = Some(StreamSession::open(&self.context, id, epoch));
            }
            None => {
                info!(%epoch, "Device selection cleared");
                StreamSession::mark_idle(&self.store, epoch);
            }
        }
    }

    /// Suppress or allow threat notifications from the next accepted frame on
    pub fn set_muted(&self, muted: bool) {
        let changed = self.store.update(|state| {
            if state.muted == muted {
                return false;
            }
            state.muted = muted;
            true
        });
        if changed {
            info!(muted, "Notifications {}", if muted { "muted" } else { "unmuted" });
        }
    }

    /// Switch the presentation theme
    pub fn set_theme(&self, theme: Theme) {
        self.store.update(|state| {
            if state.theme == theme {
                return false;
            }
            state.theme = theme;
            true
        });
    }

    /// Flip between dark and light
    pub fn toggle_theme(&self) {
        self.store.update(|state| {
            state.theme = state.theme.toggled();
            true
        });
    }

    /// Re-enumerate devices; the current selection is left alone
    pub async fn refresh_devices(&self) -> Result<Vec<CaptureDevice>, StormwatchError> {
        self.registry.refresh().await
    }

    /// Fetch history once outside the polling schedule.
    ///
    /// After shutdown nothing is fetched and the size of the retained
    /// snapshot is returned.
    pub async fn refresh_history(&self) -> Result<usize, StormwatchError> {
        if self.is_shut_down() {
            warn!("Ignoring history refresh after shutdown");
            return Ok(self.store.read(|state| state.history_snapshot.len()));
        }
        self.poller.fetch_now().await
    }

    /// End the session: close the subscription and stop polling. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut session) = self.session.lock().take() {
            session.close();
        }
        self.poller.stop();
        info!("Session ended");
    }

    /// Whether [`SessionController::shutdown`] has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("registry", &self.registry)
            .field("session", &*self.session.lock())
            .field("poller", &self.poller)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
