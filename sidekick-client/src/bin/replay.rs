//! Offline transcript replay.
//!
//! Feeds a recorded assistance-object stream through a full session and
//! prints the resulting client state. No backend is contacted: lookups
//! fail fast, so only embedded type keys resolve.

use async_trait::async_trait;
use serde_json::Value;
use sidekick_client::api::{ApiError, AssistanceDirectory};
use sidekick_client::config::ClientConfig;
use sidekick_client::error::ClientError;
use sidekick_client::persistence::{self, PersistenceError};
use sidekick_client::session::{run_session, AssistanceSession, SessionEvent, SessionNotice};
use sidekick_client::stores::SessionData;
use sidekick_core::{format_timestamp, keys, AssistanceObject};
use sidekick_exchange::ExchangeOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct OfflineDirectory;

#[async_trait]
impl AssistanceDirectory for OfflineDirectory {
    async fn fetch_assistance_type(&self, _a_id: &str) -> Result<String, ApiError> {
        Err(ApiError::Config("lookups disabled in offline replay".to_string()))
    }

    async fn fetch_type_data(&self, _type_key: &str) -> Result<Value, ApiError> {
        Err(ApiError::Config("lookups disabled in offline replay".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    init_tracing();

    let config = ClientConfig::load()?;
    let Some(path) = transcript_path() else {
        eprintln!("usage: replay [--config <path>] <transcript.json>");
        std::process::exit(2);
    };
    let transcript = load_transcript(&path)?;
    tracing::info!(
        path = %path.display(),
        objects = transcript.len(),
        "Replaying transcript"
    );

    let mut session = AssistanceSession::new(ExchangeOptions {
        max_lookup_attempts: config.max_lookup_attempts,
    });
    session.initialize(SessionData {
        backend_url: config.backend_url.clone(),
        pseudo_id: config.auth.pseudo_id.clone(),
        token: config.auth.token.clone(),
        ..SessionData::default()
    });

    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(256);
    let (notice_tx, mut notice_rx) = mpsc::channel::<SessionNotice>(256);

    let notice_task = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(notice) = notice_rx.recv().await {
            tracing::debug!(notice = ?notice, "Session notice");
            count += 1;
        }
        count
    });

    let feeder_tx = event_tx.clone();
    tokio::spawn(async move {
        for obj in transcript {
            let _ = feeder_tx.send(SessionEvent::Inbound(obj)).await;
        }
        // Let completions of spawned lookups loop back before stopping.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = feeder_tx.send(SessionEvent::Shutdown).await;
    });

    let directory: Arc<dyn AssistanceDirectory> = Arc::new(OfflineDirectory);
    let session = run_session(session, directory, event_rx, event_tx, notice_tx).await;
    let notices = notice_task.await.unwrap_or_default();

    print_summary(&session, notices);

    persistence::save(&config.snapshot_path, &session.snapshot())?;
    tracing::info!(path = %config.snapshot_path.display(), "Snapshot saved");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sidekick_client=debug,sidekick_exchange=debug,info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// First argument that is not the `--config <path>` pair.
fn transcript_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        return Some(PathBuf::from(arg));
    }
    None
}

fn load_transcript(path: &Path) -> Result<Vec<AssistanceObject>, PersistenceError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn print_summary(session: &AssistanceSession, notices: usize) {
    let exchange = session.exchange();
    println!(
        "Messages: {} visible, {} unseen",
        exchange.items().len(),
        exchange.new_items()
    );
    for item in exchange.items() {
        println!("  {}", render_item(item));
    }
    println!("Groups: {}", exchange.groups().len());
    println!("State updates: {}", exchange.state_updates().len());
    println!("Operations: {}", exchange.operation_items().len());
    println!("Notices: {}", notices);
    println!("Features: {:#?}", session.feature_flags());
}

fn render_item(item: &AssistanceObject) -> String {
    let timestamp = item
        .timestamp
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string());
    let kind = item.object_type.as_deref().unwrap_or("?");
    let text = item
        .value_opt(keys::MESSAGE)
        .and_then(Value::as_str)
        .unwrap_or("");
    format!("[{}] {:<16} {}", timestamp, kind, text)
}
