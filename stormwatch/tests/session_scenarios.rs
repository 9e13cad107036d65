//! End-to-end session scenarios driven through the in-memory transport
//!
//! Each test starts a full `SessionController` with a static device list, a
//! scripted history source and a recording notification sink, then plays the
//! Detection Server's side through `MemoryServer`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stormwatch::*;
use tokio_test::assert_ok;

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<ThreatAlert>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.alerts.lock().len()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, alert: &ThreatAlert) -> Result<(), StormwatchError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedHistory {
    answers: Mutex<VecDeque<Result<Vec<AlertLogEntry>, StormwatchError>>>,
    calls: AtomicUsize,
}

impl ScriptedHistory {
    fn new(answers: Vec<Result<Vec<AlertLogEntry>, StormwatchError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl HistorySource for ScriptedHistory {
    async fn fetch(&self) -> Result<Vec<AlertLogEntry>, StormwatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct Harness {
    controller: SessionController,
    server: MemoryServer,
    sink: Arc<RecordingSink>,
    history: Arc<ScriptedHistory>,
}

fn config(auto_select: bool, poll_interval: Duration) -> ClientConfig {
    ClientConfig {
        auto_select_first_device: auto_select,
        poll_interval,
        ..ClientConfig::default()
    }
}

async fn start(devices: &[&str], history: Arc<ScriptedHistory>, config: ClientConfig) -> Harness {
    let (transport, server) = memory_transport();
    let sink = Arc::new(RecordingSink::default());
    let devices = devices
        .iter()
        .map(|id| DeviceInfo::video(*id, format!("Camera {}", id)))
        .collect();

    let controller = assert_ok!(
        SessionController::builder()
            .config(config)
            .device_provider(Arc::new(StaticDeviceProvider::new(devices)))
            .transport(Arc::new(transport))
            .history_source(history.clone())
            .notification_sink(sink.clone())
            .start()
            .await
    );

    Harness {
        controller,
        server,
        sink,
        history,
    }
}

async fn wait_until(controller: &SessionController, condition: impl Fn(&SessionState) -> bool) {
    let mut receiver = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let reached = condition(&receiver.borrow_and_update());
            if reached {
                return;
            }
            receiver.changed().await.unwrap();
        }
    })
    .await
    .expect("session state never reached the expected condition");
}

fn showing(state: &SessionState, image: &str) -> bool {
    state
        .current_frame
        .as_ref()
        .map(|frame| frame.image == image)
        .unwrap_or(false)
}

fn quiet_history() -> Arc<ScriptedHistory> {
    ScriptedHistory::new(Vec::new())
}

const HOUR: Duration = Duration::from_secs(3600);

// ============================================================================
// LIVE FEED SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_live_feed_mute_and_malformed_messages() {
    let h = start(&["cam1"], quiet_history(), config(false, HOUR)).await;
    let mut rejections = h
        .controller
        .events()
        .filtered(EventFilter::specific(vec!["message_rejected".to_string()]));

    h.controller.select_device("cam1");
    assert_eq!(h.controller.state().connection_status, ConnectionStatus::Connecting);
    h.server.wait_for_opens("cam1", 1).await;

    // Frame without threats: accepted, no notification
    h.server.push("cam1", r#"{"image":"AAA","threats":[]}"#);
    wait_until(&h.controller, |s| showing(s, "AAA")).await;
    let state = h.controller.state();
    assert_eq!(state.connection_status, ConnectionStatus::Live);
    assert!(state.current_frame.unwrap().threats.is_empty());
    assert_eq!(h.sink.count(), 0);

    // Threat frame while unmuted: exactly one notification
    h.server.push("cam1", r#"{"image":"BBB","threats":["weapon"]}"#);
    wait_until(&h.controller, |s| showing(s, "BBB")).await;
    assert_eq!(h.sink.count(), 1);
    assert_eq!(h.sink.alerts.lock()[0].threats, vec!["weapon".to_string()]);

    // Threat frame while muted: state updates, no notification
    h.controller.set_muted(true);
    h.server.push("cam1", r#"{"image":"CCC","threats":["weapon"]}"#);
    wait_until(&h.controller, |s| showing(s, "CCC")).await;
    assert_eq!(h.sink.count(), 1);

    // Missing image: rejected and reported, state untouched
    let before = h.controller.state();
    h.server.push("cam1", r#"{"threats":["fire"]}"#);
    let rejection = tokio::time::timeout(Duration::from_secs(5), rejections.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        rejection.error().map(|e| e.error_code()),
        Some("MESSAGE_DECODE_FAILED")
    );
    assert_eq!(h.controller.state(), before);
    assert_eq!(h.sink.count(), 1);
}

#[tokio::test]
async fn test_sustained_threats_notify_every_frame() {
    let h = start(&["cam1"], quiet_history(), config(true, HOUR)).await;
    h.server.wait_for_opens("cam1", 1).await;

    for image in ["T1", "T2", "T3"] {
        h.server.push(
            "cam1",
            format!(r#"{{"image":"{}","threats":["person","weapon"]}}"#, image),
        );
    }
    wait_until(&h.controller, |s| showing(s, "T3")).await;
    assert_eq!(h.sink.count(), 3);
}

#[tokio::test]
async fn test_quick_switch_discards_previous_device() {
    let h = start(&["cam1", "cam2"], quiet_history(), config(false, HOUR)).await;

    h.controller.select_device("cam1");
    let first_epoch = h.controller.state().reconnect_epoch;
    h.server.wait_for_opens("cam1", 1).await;

    h.controller.select_device("cam2");
    let second_epoch = h.controller.state().reconnect_epoch;
    assert!(second_epoch > first_epoch);
    h.server.wait_for_opens("cam2", 1).await;

    // Late delivery on the abandoned cam1 subscription
    h.server.push_to("cam1", 0, r#"{"image":"OLD","threats":["weapon"]}"#);
    h.server.push("cam2", r#"{"image":"NEW","threats":[]}"#);
    wait_until(&h.controller, |s| showing(s, "NEW")).await;

    let state = h.controller.state();
    assert_eq!(state.selected_device_id.as_deref(), Some("cam2"));
    assert_eq!(state.reconnect_epoch, second_epoch);
    assert_eq!(h.sink.count(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(showing(&h.controller.state(), "NEW"));
    assert_eq!(h.sink.count(), 0);
}

#[tokio::test]
async fn test_failure_needs_reselection() {
    let h = start(&["cam1"], quiet_history(), config(true, HOUR)).await;
    h.server.wait_for_opens("cam1", 1).await;
    h.server.push("cam1", r#"{"image":"AAA","threats":[]}"#);
    wait_until(&h.controller, |s| s.connection_status == ConnectionStatus::Live).await;

    h.server.close_remote("cam1", Some("detector restarting"));
    wait_until(&h.controller, |s| s.connection_status == ConnectionStatus::Failed).await;

    // No automatic reconnection
    tokio::task::yield_now().await;
    assert_eq!(h.server.open_count("cam1"), 1);

    h.controller.select_device("cam1");
    assert_eq!(h.controller.state().connection_status, ConnectionStatus::Connecting);
    h.server.wait_for_opens("cam1", 2).await;
    h.server.push("cam1", r#"{"image":"BBB","threats":[]}"#);
    wait_until(&h.controller, |s| showing(s, "BBB")).await;
    assert_eq!(h.controller.state().connection_status, ConnectionStatus::Live);
}

#[tokio::test]
async fn test_refused_subscription_fails() {
    let (transport, server) = memory_transport();
    server.refuse("cam1", "unknown camera");
    let controller = assert_ok!(
        SessionController::builder()
            .config(config(true, HOUR))
            .device_provider(Arc::new(StaticDeviceProvider::new(vec![DeviceInfo::video(
                "cam1", "Lobby"
            )])))
            .transport(Arc::new(transport))
            .history_source(quiet_history())
            .notification_sink(Arc::new(RecordingSink::default()))
            .start()
            .await
    );

    wait_until(&controller, |s| s.connection_status == ConnectionStatus::Failed).await;
    assert_eq!(controller.state().selected_device_id.as_deref(), Some("cam1"));
}

#[tokio::test]
async fn test_clearing_selection_goes_idle() {
    let h = start(&["cam1"], quiet_history(), config(true, HOUR)).await;
    h.server.wait_for_opens("cam1", 1).await;
    h.server.push("cam1", r#"{"image":"AAA","threats":[]}"#);
    wait_until(&h.controller, |s| showing(s, "AAA")).await;

    h.controller.select_device("");
    let state = h.controller.state();
    assert_eq!(state.selected_device_id, None);
    assert_eq!(state.connection_status, ConnectionStatus::Idle);
    assert!(state.current_frame.is_none());
    assert_eq!(h.controller.view().feed, FeedView::Waiting {
        message: "Waiting for camera input...".to_string()
    });
}

// ============================================================================
// HISTORY SCENARIOS
// ============================================================================

fn history_entry() -> Vec<AlertLogEntry> {
    vec![AlertLogEntry {
        id: "1".to_string(),
        timestamp: "2024-05-01T10:00:00Z".parse().unwrap(),
        threats: vec![ThreatEvent::new("fire")],
    }]
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_keeps_history() {
    let history = ScriptedHistory::new(vec![
        Ok(history_entry()),
        Err(StormwatchError::HistoryFetch {
            reason: "history request timed out".to_string(),
            status: None,
        }),
    ]);
    let (transport, _server) = memory_transport();
    let mut builder = SessionController::builder()
        .config(config(false, Duration::from_secs(5)))
        .device_provider(Arc::new(StaticDeviceProvider::new(Vec::new())))
        .transport(Arc::new(transport))
        .history_source(history.clone())
        .notification_sink(Arc::new(RecordingSink::default()));
    let mut events = builder.event_stream().filtered(EventFilter::history_only());
    let controller = assert_ok!(builder.start().await);

    assert_eq!(
        events.next().await,
        Some(SessionEvent::HistoryUpdated { entries: 1 })
    );
    assert_eq!(controller.state().history_snapshot, history_entry());

    let failed = events.next().await.unwrap();
    assert_eq!(failed.event_type(), "history_fetch_failed");
    assert_eq!(controller.state().history_snapshot, history_entry());
    assert_eq!(history.calls.load(Ordering::SeqCst), 2);
    assert_eq!(controller.view().history[0].threats, vec!["FIRE"]);
}

// ============================================================================
// SESSION LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_auto_selects_first_device() {
    let h = start(&["cam1", "cam2"], quiet_history(), config(true, HOUR)).await;

    let state = h.controller.state();
    assert_eq!(state.selected_device_id.as_deref(), Some("cam1"));
    assert_eq!(state.reconnect_epoch, Epoch(1));
    assert_eq!(state.devices.len(), 2);
    assert_eq!(h.controller.devices()[1].id, "cam2");
    h.server.wait_for_opens("cam1", 1).await;
    assert_eq!(h.server.open_count("cam2"), 0);
}

#[tokio::test]
async fn test_select_device_from_plain_thread() {
    let Harness {
        controller, server, ..
    } = start(&["cam1"], quiet_history(), config(false, HOUR)).await;
    let controller = Arc::new(controller);

    let selector = controller.clone();
    let joined = std::thread::spawn(move || selector.select_device("cam1")).join();
    assert!(joined.is_ok());
    assert_eq!(controller.state().connection_status, ConnectionStatus::Connecting);

    server.wait_for_opens("cam1", 1).await;
    server.push("cam1", r#"{"image":"AAA","threats":[]}"#);
    wait_until(&controller, |s| s.connection_status == ConnectionStatus::Live).await;
    assert!(showing(&controller.state(), "AAA"));
}

#[tokio::test]
async fn test_history_refresh_after_shutdown_is_ignored() {
    let history = ScriptedHistory::new(vec![Ok(history_entry())]);
    let h = start(&[], history, config(false, HOUR)).await;
    wait_until(&h.controller, |s| s.history_snapshot == history_entry()).await;

    h.controller.shutdown();
    h.history.answers.lock().push_back(Ok(Vec::new()));
    let calls = h.history.calls.load(Ordering::SeqCst);

    assert_eq!(assert_ok!(h.controller.refresh_history().await), 1);
    assert_eq!(h.history.calls.load(Ordering::SeqCst), calls);
    assert_eq!(h.controller.state().history_snapshot, history_entry());
}

#[tokio::test]
async fn test_enumeration_failure_still_starts() {
    let (transport, server) = memory_transport();
    let mut builder = SessionController::builder()
        .config(config(true, HOUR))
        .device_provider(Arc::new(UnavailableProvider))
        .transport(Arc::new(transport))
        .history_source(quiet_history())
        .notification_sink(Arc::new(RecordingSink::default()));
    let mut errors = builder.event_stream().filtered(EventFilter::errors_only());
    let controller = assert_ok!(builder.start().await);

    let event = errors.next().await.unwrap();
    assert_eq!(event.event_type(), "device_enumeration_failed");

    let state = controller.state();
    assert!(state.devices.is_empty());
    assert_eq!(state.selected_device_id, None);
    assert_eq!(state.connection_status, ConnectionStatus::Idle);
    assert_eq!(server.open_count("cam1"), 0);
}

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let h = start(&["cam1"], quiet_history(), config(true, Duration::from_secs(1))).await;
    h.server.wait_for_opens("cam1", 1).await;

    h.controller.shutdown();
    h.controller.shutdown();
    assert!(h.controller.is_shut_down());
    assert_eq!(h.controller.state().connection_status, ConnectionStatus::Closed);

    h.controller.select_device("cam1");
    assert_eq!(h.controller.state().reconnect_epoch, Epoch(1));

    let calls = h.history.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.history.calls.load(Ordering::SeqCst), calls);
    assert_eq!(h.server.open_count("cam1"), 1);
}

#[tokio::test]
async fn test_theme_and_mute_flow_into_view() {
    let h = start(
        &["cam1"],
        quiet_history(),
        ClientConfig {
            start_muted: true,
            initial_theme: Theme::Light,
            ..config(false, HOUR)
        },
    )
    .await;

    let view = h.controller.view();
    assert!(view.muted);
    assert_eq!(view.theme, Theme::Light);
    assert_eq!(view.status, ConnectionStatus::Idle);

    h.controller.toggle_theme();
    h.controller.set_muted(false);
    let view = h.controller.view();
    assert_eq!(view.theme, Theme::Dark);
    assert!(!view.muted);

    h.controller.set_theme(Theme::Light);
    assert_eq!(h.controller.state().theme, Theme::Light);
}

#[tokio::test]
async fn test_refresh_devices_keeps_selection() {
    let h = start(&["cam1"], quiet_history(), config(true, HOUR)).await;
    let epoch = h.controller.state().reconnect_epoch;

    let devices = assert_ok!(h.controller.refresh_devices().await);
    assert_eq!(devices.len(), 1);
    assert_eq!(h.controller.state().reconnect_epoch, epoch);
    assert_eq!(h.controller.state().selected_device_id.as_deref(), Some("cam1"));
}
