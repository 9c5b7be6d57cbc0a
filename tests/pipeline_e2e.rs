// tests/pipeline_e2e.rs
//
// End-to-end run over a local RSS feed and webhook: fetch → dedup →
// deliver → persist, then the idempotence check on a second run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use newsdrop::config::BotConfig;
use newsdrop::deliver::PostMode;
use newsdrop::pipeline::run_news_post;
use newsdrop::secrets::{SecretStore, StaticSecrets};
use newsdrop::sources::types::SourceName;
use newsdrop::store::MemoryBlobStore;

const FEED_XML: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Wire</title>
    <item>
      <title>Alpha</title>
      <link>https://wire.example/alpha</link>
    </item>
    <item>
      <title>Beta</title>
      <link>https://wire.example/beta</link>
    </item>
  </channel>
</rss>"#;

async fn webhook(
    State(payloads): State<Arc<Mutex<Vec<serde_json::Value>>>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    payloads.lock().unwrap().push(payload);
    StatusCode::NO_CONTENT
}

async fn spawn_servers() -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
    let payloads: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
    let app = Router::new()
        .route("/webhook", post(webhook))
        .route(
            "/feed.xml",
            axum::routing::get(|| async { FEED_XML.to_string() }),
        )
        .with_state(payloads.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), payloads)
}

#[tokio::test]
async fn run_delivers_once_then_goes_quiet() {
    let (base, payloads) = spawn_servers().await;

    let cfg = BotConfig {
        active_sources: vec![SourceName::Rss],
        rss_feed_urls: vec![format!("{base}/feed.xml")],
        post_mode: PostMode::Channel,
        discord_secret_id: "DISCORD_TEST_SECRET".into(),
        retry_delay: Duration::ZERO,
        ..BotConfig::default()
    };
    let secrets: Arc<dyn SecretStore> = Arc::new(StaticSecrets::new().with(
        "DISCORD_TEST_SECRET",
        &[("webhookUrl", &format!("{base}/webhook"))],
    ));
    let store = MemoryBlobStore::new();

    let report = run_news_post(&cfg, Arc::clone(&secrets), &store)
        .await
        .expect("first run");
    assert_eq!(report.fetched, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);
    {
        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["embeds"][0]["title"], "Alpha");
        assert_eq!(sent[1]["embeds"][0]["title"], "Beta");
    }

    // Unchanged feed + persisted state: the second run delivers nothing.
    let report = run_news_post(&cfg, Arc::clone(&secrets), &store)
        .await
        .expect("second run");
    assert_eq!(report.fetched, 0);
    assert_eq!(report.delivered, 0);
    assert_eq!(payloads.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn run_without_webhook_still_succeeds() {
    let (base, payloads) = spawn_servers().await;

    let cfg = BotConfig {
        active_sources: vec![SourceName::Rss],
        rss_feed_urls: vec![format!("{base}/feed.xml")],
        post_mode: PostMode::Channel,
        discord_secret_id: "DISCORD_TEST_SECRET".into(),
        retry_delay: Duration::ZERO,
        ..BotConfig::default()
    };
    // Secret exists but has no webhookUrl field.
    let secrets: Arc<dyn SecretStore> =
        Arc::new(StaticSecrets::new().with("DISCORD_TEST_SECRET", &[("token", "t")]));
    let store = MemoryBlobStore::new();

    let report = run_news_post(&cfg, secrets, &store)
        .await
        .expect("run should not error");
    assert_eq!(report.fetched, 2);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 0);
    assert!(payloads.lock().unwrap().is_empty());
}
