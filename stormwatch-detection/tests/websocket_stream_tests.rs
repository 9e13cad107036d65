//! Stream sessions against a real WebSocket server

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use stormwatch_core::*;
use stormwatch_detection::*;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// What the fake Detection Server does after the handshake
#[derive(Clone, Copy)]
enum Script {
    /// Push a few frames, then wait for the client to close
    PushThenWait,
    /// Push one frame, then close from the server side
    PushThenClose,
}

struct FakeServer {
    config: DetectionServerConfig,
    request_uri: Arc<Mutex<Option<String>>>,
    client_closed: oneshot::Receiver<bool>,
}

async fn start_server(script: Script) -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request_uri = Arc::new(Mutex::new(None));
    let (closed_tx, closed_rx) = oneshot::channel();

    let uri_slot = request_uri.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let record_uri = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            *uri_slot.lock() = Some(request.uri().to_string());
            Ok(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, record_uri)
            .await
            .unwrap();

        ws.send(Message::Text(r#"{"image":"Zmlyc3Q=","threats":[]}"#.to_string()))
            .await
            .unwrap();

        match script {
            Script::PushThenWait => {
                ws.send(Message::Text("definitely not json".to_string()))
                    .await
                    .unwrap();
                ws.send(Message::Binary(
                    br#"{"image":"c2Vjb25k","threats":["weapon"]}"#.to_vec(),
                ))
                .await
                .unwrap();

                let mut saw_close = false;
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        saw_close = true;
                        break;
                    }
                }
                let _ = closed_tx.send(saw_close);
            }
            Script::PushThenClose => {
                ws.close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "server restarting".into(),
                }))
                .await
                .unwrap();
                let _ = closed_tx.send(false);
            }
        }
    });

    FakeServer {
        config: DetectionServerConfig::new(&format!("http://{}", addr)).unwrap(),
        request_uri,
        client_closed: closed_rx,
    }
}

fn context(config: DetectionServerConfig, store: &SessionStore, events: EventReporter) -> SessionContext {
    SessionContext {
        store: store.clone(),
        transport: Arc::new(WebSocketTransport::new(config).unwrap()),
        trigger: Arc::new(NotificationTrigger::new(Arc::new(LogSink), events.clone())),
        events,
        runtime: tokio::runtime::Handle::current(),
    }
}

fn selected(device_id: &str, epoch: Epoch) -> SessionStore {
    SessionStore::new(SessionState {
        selected_device_id: Some(device_id.to_string()),
        reconnect_epoch: epoch,
        ..SessionState::default()
    })
}

async fn wait_until(store: &SessionStore, condition: impl Fn(&SessionState) -> bool) {
    let mut receiver = store.subscribe();
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

#[tokio::test]
async fn test_frames_flow_and_close_handshake() {
    let server = start_server(Script::PushThenWait).await;
    let store = selected("cam 1", Epoch(1));
    let (events, mut receiver) = EventReporter::channel();
    let ctx = context(server.config.clone(), &store, events);

    let session = StreamSession::open(&ctx, "cam 1", Epoch(1));
    wait_until(&store, |state| {
        state
            .current_frame
            .as_ref()
            .map(|frame| frame.image == "c2Vjb25k")
            .unwrap_or(false)
    })
    .await;

    let state = store.snapshot();
    assert_eq!(state.connection_status, ConnectionStatus::Live);
    let frame = state.current_frame.unwrap();
    assert_eq!(frame.threat_labels(), vec!["weapon"]);
    assert_eq!(frame.image.decode().unwrap(), b"second".to_vec());

    let uri = server.request_uri.lock().clone().unwrap();
    assert_eq!(uri, "/video/ws?deviceId=cam+1");

    session.shutdown().await;
    assert_eq!(store.snapshot().connection_status, ConnectionStatus::Closed);
    assert!(server.client_closed.await.unwrap());

    let mut seen = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        seen.push(event.event_type());
    }
    assert!(seen.contains(&"message_rejected"));
    assert!(seen.contains(&"threat_notified"));
    assert_eq!(seen.iter().filter(|t| **t == "frame_accepted").count(), 2);
}

#[tokio::test]
async fn test_remote_close_fails_subscription() {
    let server = start_server(Script::PushThenClose).await;
    let store = selected("cam1", Epoch(3));
    let ctx = context(server.config.clone(), &store, EventReporter::disabled());

    let session = StreamSession::open(&ctx, "cam1", Epoch(3));
    wait_until(&store, |state| state.connection_status == ConnectionStatus::Failed).await;

    // The last good frame survives the failure
    let state = store.snapshot();
    assert_eq!(state.current_frame.unwrap().image, "Zmlyc3Q=");
    assert_eq!(session.status(), ConnectionStatus::Failed);
    assert!(!server.client_closed.await.unwrap());
}

#[tokio::test]
async fn test_unreachable_server_fails_subscription() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = DetectionServerConfig::new(&format!("http://127.0.0.1:{}", port)).unwrap();
    let store = selected("cam1", Epoch(1));
    let (events, mut receiver) = EventReporter::channel();
    let ctx = context(config, &store, events);

    let _session = StreamSession::open(&ctx, "cam1", Epoch(1));
    wait_until(&store, |state| state.connection_status == ConnectionStatus::Failed).await;

    let mut failure = None;
    while let Ok(event) = receiver.try_recv() {
        if let SessionEvent::ConnectionFailed { error, .. } = event {
            failure = Some(error);
        }
    }
    assert_eq!(failure.unwrap().error_code(), "CONNECTION_FAILED");
}
