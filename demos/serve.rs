//! Run a hub on 0.0.0.0:8080 with a file-backed device list.
//!
//! Point a device (or curl) at it:
//!   curl -X POST localhost:8080/api/meter \
//!     -d '{"mac":"AABBCCDDEEFF","ch0":12.3,"battery":90,"timestamp":"2024-01-01T00:00:00"}'

use std::sync::Arc;

use meterhub::{
    AppState, BroadcastSink, EventSink, Hub, IngestJournal, JournalMode, JsonFileStore,
    LogNotifier, Reconciler, WelcomeAnnouncer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = JsonFileStore::open("meterhub-devices.json")?;
    let bus = Arc::new(BroadcastSink::new(64));
    let sink: Arc<dyn EventSink> = bus.clone();

    let hub = Hub::new(Box::new(config), sink.clone())
        .with_journal(IngestJournal::new(JournalMode::Diffed, "meterhub-journal.ndjson")?);

    let notifier = Arc::new(LogNotifier);
    let announcer = Arc::new(WelcomeAnnouncer::new(notifier.clone(), bus));
    let reconciler = Reconciler::new(notifier, sink).with_announcer(announcer);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("meterhub listening on {}", listener.local_addr()?);
    meterhub::serve(listener, AppState::new(hub, reconciler)).await?;
    Ok(())
}
