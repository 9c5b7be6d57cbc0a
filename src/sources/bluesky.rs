// src/sources/bluesky.rs
//! Bluesky adapter: authenticates with the atproto XRPC API, walks the
//! account's saved feeds and maps feed items into [`Post`]s.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::secrets::{field, SecretStore};
use crate::sources::types::{ArticlePreview, FetchOutcome, NewsSource, Post, SourceName};
use crate::sources::headline;

pub const DEFAULT_API_BASE: &str = "https://bsky.social/xrpc";

const SAVED_FEEDS_PREF: &str = "app.bsky.actor.defs#savedFeedsPrefV2";
const MAX_RETRIES: u8 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct Session {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
}

#[derive(Debug, Deserialize)]
struct Preferences {
    #[serde(default)]
    preferences: Vec<Preference>,
}

#[derive(Debug, Deserialize)]
struct Preference {
    #[serde(rename = "$type", default)]
    kind: String,
    #[serde(default)]
    items: Vec<SavedFeed>,
}

#[derive(Debug, Deserialize)]
struct SavedFeed {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct FeedGenerator {
    view: GeneratorView,
}

#[derive(Debug, Deserialize)]
struct GeneratorView {
    #[serde(rename = "displayName", default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
pub struct FeedItem {
    pub post: FeedPost,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedPost {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub record: PostRecord,
    #[serde(default)]
    pub embed: Option<PostEmbed>,
    #[serde(rename = "likeCount", default)]
    pub like_count: u64,
    #[serde(rename = "repostCount", default)]
    pub repost_count: u64,
    #[serde(rename = "replyCount", default)]
    pub reply_count: u64,
    #[serde(rename = "quoteCount", default)]
    pub quote_count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub handle: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostEmbed {
    #[serde(default)]
    pub external: Option<ExternalEmbed>,
    #[serde(default)]
    pub images: Vec<EmbedImage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExternalEmbed {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumb: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbedImage {
    #[serde(default)]
    pub fullsize: String,
}

/// The `at://` record URI doubles as the dedup key: stable across fetches
/// and namespaced by scheme, so it can never collide with `rss:` ids.
pub fn map_item(item: &FeedItem, seen: &HashSet<String>) -> Option<Post> {
    let post = &item.post;
    if post.uri.is_empty() {
        tracing::warn!("skipping bluesky item with missing post uri");
        return None;
    }
    if seen.contains(&post.uri) {
        tracing::debug!(uri = %post.uri, "skipping already processed post");
        return None;
    }

    let record_key = post.uri.rsplit('/').next().unwrap_or_default();
    let permalink = format!(
        "https://bsky.app/profile/{}/post/{}",
        post.author.handle, record_key
    );
    let external = post.embed.as_ref().and_then(|e| e.external.as_ref());

    let mut out = Post::new(SourceName::Bluesky, post.uri.clone());
    out.title = if post.record.text.is_empty() {
        "Untitled Post".to_string()
    } else {
        headline(&post.record.text)
    };
    out.content = if post.record.text.is_empty() {
        "No Content".to_string()
    } else {
        post.record.text.clone()
    };
    out.author_name = post.author.display_name.clone();
    out.author_handle = post.author.handle.clone();
    out.author_avatar_url = post.author.avatar.clone();
    // Prefer the wrapped article's URL over the post permalink.
    out.post_url = external
        .map(|e| e.uri.clone())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| permalink.clone());
    out.canonical_link = permalink;
    // Image resolution order: external-embed thumbnail, first inline image,
    // empty.
    out.image_url = external
        .map(|e| e.thumb.clone())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            post.embed
                .as_ref()
                .and_then(|e| e.images.first())
                .map(|i| i.fullsize.clone())
        })
        .unwrap_or_default();
    out.engagement.likes = post.like_count;
    out.engagement.reposts = post.repost_count;
    out.engagement.replies = post.reply_count;
    out.engagement.quotes = post.quote_count;
    out.article = external
        .filter(|e| !e.title.is_empty())
        .map(|e| ArticlePreview {
            title: e.title.clone(),
            description: e.description.clone(),
            url: e.uri.clone(),
        });
    Some(out)
}

pub struct BlueskySource {
    secrets: Arc<dyn SecretStore>,
    secret_id: String,
    api_base: String,
    limit: usize,
    client: reqwest::Client,
    retry_delay: Duration,
}

impl BlueskySource {
    pub fn new(secrets: Arc<dyn SecretStore>, secret_id: impl Into<String>, limit: usize) -> Self {
        Self {
            secrets,
            secret_id: secret_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            limit,
            client: reqwest::Client::new(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn create_session(&self, username: &str, password: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .post(format!("{}/com.atproto.server.createSession", self.api_base))
            .json(&serde_json::json!({ "identifier": username, "password": password }))
            .send()
            .await
            .context("bluesky createSession")?;
        if !resp.status().is_success() {
            // Bad credentials disable the source for this run, nothing more.
            tracing::warn!(status = %resp.status(), "bluesky authentication rejected");
            return Ok(None);
        }
        let session: Session = resp.json().await.context("bluesky session body")?;
        Ok(Some(session.access_jwt))
    }

    async fn saved_feed_uris(&self, jwt: &str) -> Result<Vec<String>> {
        let prefs: Preferences = self
            .client
            .get(format!("{}/app.bsky.actor.getPreferences", self.api_base))
            .bearer_auth(jwt)
            .send()
            .await
            .context("bluesky getPreferences")?
            .error_for_status()
            .context("bluesky getPreferences non-2xx")?
            .json()
            .await
            .context("bluesky preferences body")?;

        let uris = prefs
            .preferences
            .into_iter()
            .filter(|p| p.kind == SAVED_FEEDS_PREF)
            .flat_map(|p| p.items)
            .filter(|i| i.kind == "feed")
            .map(|i| i.value)
            .filter(|v| !v.is_empty())
            .collect();
        Ok(uris)
    }

    async fn fetch_feed_page(&self, jwt: &str, feed_uri: &str) -> Result<FeedPage> {
        let generator: FeedGenerator = self
            .client
            .get(format!("{}/app.bsky.feed.getFeedGenerator", self.api_base))
            .bearer_auth(jwt)
            .query(&[("feed", feed_uri)])
            .send()
            .await
            .context("bluesky getFeedGenerator")?
            .error_for_status()
            .context("bluesky getFeedGenerator non-2xx")?
            .json()
            .await
            .context("bluesky generator body")?;
        tracing::info!(feed = %generator.view.display_name, "processing feed");

        let page: FeedPage = self
            .client
            .get(format!("{}/app.bsky.feed.getFeed", self.api_base))
            .bearer_auth(jwt)
            .query(&[("feed", feed_uri), ("limit", &self.limit.to_string())])
            .send()
            .await
            .context("bluesky getFeed")?
            .error_for_status()
            .context("bluesky getFeed non-2xx")?
            .json()
            .await
            .context("bluesky feed body")?;
        Ok(page)
    }
}

#[async_trait]
impl NewsSource for BlueskySource {
    async fn fetch_latest(&self, seen: &HashSet<String>) -> Result<FetchOutcome> {
        let creds = match self.secrets.get_secret(&self.secret_id) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = ?e, "bluesky credentials not found");
                return Ok(FetchOutcome::Skipped("credentials not configured".into()));
            }
        };
        let (Some(username), Some(password)) =
            (field(&creds, "username"), field(&creds, "password"))
        else {
            return Ok(FetchOutcome::Skipped("credentials incomplete".into()));
        };

        let Some(jwt) = self.create_session(&username, &password).await? else {
            return Ok(FetchOutcome::Skipped("authentication failed".into()));
        };

        let feed_uris = self.saved_feed_uris(&jwt).await?;
        if feed_uris.is_empty() {
            return Ok(FetchOutcome::Skipped("no saved feeds".into()));
        }
        tracing::info!(count = feed_uris.len(), "found saved feeds");

        let mut posts: Vec<Post> = Vec::new();
        let mut emitted: HashSet<String> = seen.clone();

        for feed_uri in &feed_uris {
            let mut page = None;
            for attempt in 1..=MAX_RETRIES {
                match self.fetch_feed_page(&jwt, feed_uri).await {
                    Ok(p) => {
                        page = Some(p);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = ?e, feed = %feed_uri, attempt, "feed fetch failed");
                        if attempt < MAX_RETRIES {
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
            }
            // A single feed's failure never aborts the whole adapter.
            let Some(page) = page else {
                tracing::warn!(feed = %feed_uri, "abandoning feed after {MAX_RETRIES} attempts");
                continue;
            };

            for item in &page.feed {
                if let Some(post) = map_item(item, &emitted) {
                    emitted.insert(post.source_id.clone());
                    posts.push(post);
                }
            }
        }

        tracing::info!(count = posts.len(), "new bluesky posts across all feeds");
        Ok(FetchOutcome::Posts(posts))
    }

    fn name(&self) -> SourceName {
        SourceName::Bluesky
    }
}
