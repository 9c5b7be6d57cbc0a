// src/deliver/mod.rs
//! Delivery path: per-post webhook dispatch plus forum thread housekeeping.

pub mod embed;
pub mod threads;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::config::BotConfig;
use crate::deliver::embed::{format_embeds, Embed};
use crate::deliver::threads::ThreadManager;
use crate::secrets::{field, SecretStore};
use crate::sources::types::Post;

pub const USERNAME_FALLBACK: &str = "News Bot";
pub const THREAD_NAME_FALLBACK: &str = "News Thread";

/// Destination posting mode: forum creates a thread per post, channel posts
/// inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMode {
    Forum,
    Channel,
}

impl PostMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forum" => Some(PostMode::Forum),
            "channel" => Some(PostMode::Channel),
            _ => None,
        }
    }
}

/// Outcome of one post's delivery attempt. Failures are isolated per item;
/// the caller aggregates and keeps going.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    Skipped(String),
    Failed(anyhow::Error),
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    username: String,
    avatar_url: String,
    embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_name: Option<String>,
}

pub struct Dispatcher {
    secrets: Arc<dyn SecretStore>,
    secret_id: String,
    api_base: String,
    mode: PostMode,
    max_active_threads: usize,
    archive_delay: Duration,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(cfg: &BotConfig, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            secret_id: cfg.discord_secret_id.clone(),
            api_base: cfg.discord_api_base.clone(),
            mode: cfg.post_mode,
            max_active_threads: cfg.max_active_threads,
            archive_delay: cfg.archive_delay,
            client: reqwest::Client::new(),
        }
    }

    /// Send one post to the destination webhook. Secrets are resolved fresh
    /// on every call (explicit refresh policy, no caching across posts).
    /// Best-effort: one POST, no retry.
    pub async fn deliver(&self, post: &Post) -> DeliveryOutcome {
        let secret = match self.secrets.get_secret(&self.secret_id) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = ?e, "destination secret unavailable, skipping post");
                return DeliveryOutcome::Skipped("destination secret unavailable".into());
            }
        };
        let Some(webhook_url) = field(&secret, "webhookUrl") else {
            tracing::warn!("webhook URL not found, skipping post");
            return DeliveryOutcome::Skipped("webhook URL not configured".into());
        };

        let mut payload = WebhookPayload {
            username: if post.author_name.is_empty() {
                USERNAME_FALLBACK.to_string()
            } else {
                post.author_name.clone()
            },
            avatar_url: post.author_avatar_url.clone(),
            embeds: format_embeds(post),
            thread_name: None,
        };

        if self.mode == PostMode::Forum {
            payload.thread_name = Some(thread_name(post));

            // Pre-flight: make room under the active-thread cap before this
            // post creates a new thread.
            let creds = (
                field(&secret, "token"),
                field(&secret, "forumServerId"),
                field(&secret, "forumChannelId"),
            );
            if let (Some(token), Some(server), Some(channel)) = creds {
                let manager = ThreadManager::new(&self.api_base, token, server, channel)
                    .with_archive_delay(self.archive_delay);
                manager.enforce_capacity(self.max_active_threads).await;
            } else {
                tracing::warn!("forum credentials incomplete, skipping thread archival");
            }
        }

        let result = self
            .client
            .post(&webhook_url)
            .json(&payload)
            .send()
            .await
            .context("webhook post")
            .and_then(|resp| resp.error_for_status().context("webhook non-2xx"));

        match result {
            Ok(_) => {
                tracing::info!(source_id = %post.source_id, username = %payload.username, "posted to discord");
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(error = ?e, source_id = %post.source_id, "delivery failed");
                DeliveryOutcome::Failed(e)
            }
        }
    }
}

/// Forum thread title: post title, else author name, else a fixed fallback.
fn thread_name(post: &Post) -> String {
    if !post.title.is_empty() {
        post.title.clone()
    } else if !post.author_name.is_empty() {
        post.author_name.clone()
    } else {
        THREAD_NAME_FALLBACK.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::types::SourceName;

    #[test]
    fn post_mode_parses_config_tokens() {
        assert_eq!(PostMode::parse("Forum"), Some(PostMode::Forum));
        assert_eq!(PostMode::parse(" channel "), Some(PostMode::Channel));
        assert_eq!(PostMode::parse("dm"), None);
    }

    #[test]
    fn thread_name_falls_back_in_order() {
        let mut post = Post::new(SourceName::Bluesky, "at://x");
        assert_eq!(thread_name(&post), THREAD_NAME_FALLBACK);
        post.author_name = "Newsroom".into();
        assert_eq!(thread_name(&post), "Newsroom");
        post.title = "Headline".into();
        assert_eq!(thread_name(&post), "Headline");
    }

    #[test]
    fn payload_omits_thread_name_in_channel_mode() {
        let payload = WebhookPayload {
            username: "u".into(),
            avatar_url: String::new(),
            embeds: vec![],
            thread_name: None,
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert!(v.get("thread_name").is_none());
    }
}
