//! Headless monitor for a Stormwatch Detection Server
//!
//! Connects to the server named by `STORMWATCH_SERVER_URL` (default
//! `http://localhost:8000`), follows the first camera and prints every threat
//! frame and history refresh until Ctrl-C.
//!
//! ```text
//! STORMWATCH_SERVER_URL=http://10.0.0.5:8000 RUST_LOG=debug \
//!     cargo run --example headless_monitor
//! ```

use anyhow::Context;
use stormwatch::{
    init_logging, ClientConfig, SessionController, SessionDiagnostics, SessionEvent,
    DEFAULT_LOG_DIRECTIVE,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(DEFAULT_LOG_DIRECTIVE)?;

    let config = ClientConfig::from_env().context("reading client configuration")?;
    println!("🛰️  Monitoring {}", config.server.base_url);

    let controller = SessionController::builder()
        .config(config)
        .start()
        .await
        .context("starting monitoring session")?;

    let devices = controller.devices();
    if devices.is_empty() {
        println!("📷 No cameras found, waiting for history only");
    }
    for device in &devices {
        println!("📷 {}", device.display_name());
    }

    let mut events = controller.events();
    let mut diagnostics = SessionDiagnostics::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => {
                let Some(event) = event else { break };
                diagnostics.record(&event);
                match &event {
                    SessionEvent::ConnectionChanged { status, .. } => {
                        println!("🔌 Connection {:?}", status);
                    }
                    SessionEvent::FrameAccepted { threat_count, .. } if *threat_count > 0 => {
                        println!("🚨 {}", controller.view().threats.join(", "));
                    }
                    SessionEvent::HistoryUpdated { entries } => {
                        println!("📜 History holds {} alerts", entries);
                    }
                    other => {
                        if let Some(error) = other.error() {
                            println!("⚠️  {}: {}", other.event_type(), error);
                        }
                    }
                }
            }
        }
    }

    controller.shutdown();
    println!("📊 {}", diagnostics.summary());
    Ok(())
}
