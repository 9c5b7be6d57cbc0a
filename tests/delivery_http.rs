// tests/delivery_http.rs
//
// Dispatcher + ThreadManager against a local mock of the Discord API:
// per-post failure isolation, missing-webhook skip, and forum-mode
// pre-flight archival.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};

use newsdrop::config::BotConfig;
use newsdrop::deliver::{DeliveryOutcome, Dispatcher, PostMode};
use newsdrop::secrets::StaticSecrets;
use newsdrop::sources::types::{Post, SourceName};

#[derive(Clone, Default)]
struct MockDiscord {
    webhook_payloads: Arc<Mutex<Vec<serde_json::Value>>>,
    archived: Arc<Mutex<Vec<String>>>,
    active_threads: Arc<Mutex<serde_json::Value>>,
}

async fn webhook(
    State(state): State<MockDiscord>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    if payload["embeds"][0]["title"] == "boom" {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.webhook_payloads.lock().unwrap().push(payload);
    StatusCode::NO_CONTENT
}

async fn active_threads(State(state): State<MockDiscord>) -> Json<serde_json::Value> {
    Json(state.active_threads.lock().unwrap().clone())
}

async fn archive(
    State(state): State<MockDiscord>,
    Path(channel_id): Path<String>,
) -> Json<serde_json::Value> {
    state.archived.lock().unwrap().push(channel_id);
    Json(serde_json::json!({}))
}

/// Serve the mock on an ephemeral port; returns its base URL and handles.
async fn spawn_mock(threads: serde_json::Value) -> (String, MockDiscord) {
    let state = MockDiscord {
        active_threads: Arc::new(Mutex::new(threads)),
        ..MockDiscord::default()
    };
    let app = Router::new()
        .route("/webhook", post(webhook))
        .route("/guilds/{guild}/threads/active", get(active_threads))
        .route("/channels/{channel_id}", patch(archive))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn config(api_base: &str, mode: PostMode, max_active: usize) -> BotConfig {
    BotConfig {
        post_mode: mode,
        max_active_threads: max_active,
        discord_api_base: api_base.to_string(),
        discord_secret_id: "DISCORD_TEST_SECRET".into(),
        archive_delay: Duration::ZERO,
        ..BotConfig::default()
    }
}

fn secrets_with_webhook(base: &str) -> Arc<StaticSecrets> {
    Arc::new(StaticSecrets::new().with(
        "DISCORD_TEST_SECRET",
        &[
            ("webhookUrl", &format!("{base}/webhook")),
            ("forumChannelId", "forum-1"),
            ("forumServerId", "guild-1"),
            ("token", "bot-token"),
            ("publicKey", "pk"),
        ],
    ))
}

fn titled_post(title: &str) -> Post {
    let mut post = Post::new(SourceName::Rss, format!("rss:{title}"));
    post.title = title.to_string();
    post.content = "body".into();
    post.author_name = "Wire".into();
    post
}

#[tokio::test]
async fn failed_post_does_not_block_the_rest_of_the_batch() {
    let (base, mock) = spawn_mock(serde_json::json!({ "threads": [] })).await;
    let cfg = config(&base, PostMode::Channel, 200);
    let dispatcher = Dispatcher::new(&cfg, secrets_with_webhook(&base));

    let batch = [titled_post("first"), titled_post("boom"), titled_post("third")];
    let mut outcomes = Vec::new();
    for post in &batch {
        outcomes.push(dispatcher.deliver(post).await);
    }

    assert!(matches!(outcomes[0], DeliveryOutcome::Delivered));
    assert!(matches!(outcomes[1], DeliveryOutcome::Failed(_)));
    assert!(matches!(outcomes[2], DeliveryOutcome::Delivered));

    let recorded = mock.webhook_payloads.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0]["username"], "Wire");
    assert_eq!(recorded[1]["embeds"][0]["title"], "third");
    // Channel mode: no thread_name field at all.
    assert!(recorded[0].get("thread_name").is_none());
}

#[tokio::test]
async fn missing_webhook_url_skips_delivery_without_requests() {
    let (base, mock) = spawn_mock(serde_json::json!({ "threads": [] })).await;
    let cfg = config(&base, PostMode::Forum, 200);
    let secrets = Arc::new(
        StaticSecrets::new().with("DISCORD_TEST_SECRET", &[("token", "bot-token")]),
    );
    let dispatcher = Dispatcher::new(&cfg, secrets);

    for post in [titled_post("a"), titled_post("b")] {
        let outcome = dispatcher.deliver(&post).await;
        assert!(matches!(outcome, DeliveryOutcome::Skipped(_)));
    }
    assert!(mock.webhook_payloads.lock().unwrap().is_empty());
    assert!(mock.archived.lock().unwrap().is_empty());
}

#[tokio::test]
async fn forum_mode_archives_oldest_excess_before_posting() {
    // Five active threads in the target forum plus one belonging to another
    // channel that must be left alone.
    let threads = serde_json::json!({
        "threads": [
            { "id": "14", "parent_id": "forum-1" },
            { "id": "10", "parent_id": "forum-1" },
            { "id": "12", "parent_id": "forum-1" },
            { "id": "13", "parent_id": "forum-1" },
            { "id": "11", "parent_id": "forum-1" },
            { "id": "1",  "parent_id": "general" }
        ]
    });
    let (base, mock) = spawn_mock(threads).await;
    let cfg = config(&base, PostMode::Forum, 3);
    let dispatcher = Dispatcher::new(&cfg, secrets_with_webhook(&base));

    let outcome = dispatcher.deliver(&titled_post("fresh news")).await;
    assert!(matches!(outcome, DeliveryOutcome::Delivered));

    // Oldest two archived, ascending, other channels untouched.
    assert_eq!(*mock.archived.lock().unwrap(), vec!["10", "11"]);

    let recorded = mock.webhook_payloads.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0]["thread_name"], "fresh news");
}

#[tokio::test]
async fn unreachable_thread_listing_still_delivers_the_post() {
    let (base, mock) = spawn_mock(serde_json::json!({ "threads": [] })).await;
    let mut cfg = config(&base, PostMode::Forum, 3);
    // Point thread management at a dead endpoint while the webhook works.
    cfg.discord_api_base = "http://127.0.0.1:9".into();
    let dispatcher = Dispatcher::new(&cfg, secrets_with_webhook(&base));

    let outcome = dispatcher.deliver(&titled_post("still goes out")).await;
    assert!(matches!(outcome, DeliveryOutcome::Delivered));
    assert_eq!(mock.webhook_payloads.lock().unwrap().len(), 1);
}
