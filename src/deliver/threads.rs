// src/deliver/threads.rs
//! Forum thread capacity: query active threads, archive the oldest excess.
//!
//! Discord assigns thread ids monotonically with creation time, so "oldest
//! first" is an explicit ascending numeric-id sort, not an ordering the API
//! happens to return.

use std::time::Duration;

use anyhow::{Context, Result};
use metrics::counter;
use serde::Deserialize;

const DEFAULT_ARCHIVE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
}

#[derive(Debug, Deserialize)]
struct ActiveThreads {
    #[serde(default)]
    threads: Vec<ThreadRecord>,
}

/// FIFO eviction policy: the ids to archive, ascending, when `threads`
/// (already filtered to one forum channel) exceeds `max_active`.
/// Non-numeric ids are skipped with a warning and never counted.
pub fn oldest_excess(threads: &[ThreadRecord], max_active: usize) -> Vec<u64> {
    let mut ids: Vec<u64> = threads
        .iter()
        .filter_map(|t| match t.id.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(id = %t.id, "ignoring thread with non-numeric id");
                None
            }
        })
        .collect();
    if ids.len() <= max_active {
        return Vec::new();
    }
    let excess = ids.len() - max_active;
    ids.sort_unstable();
    ids.truncate(excess);
    ids
}

/// Executes the capacity policy against the Discord REST API.
pub struct ThreadManager {
    client: reqwest::Client,
    api_base: String,
    token: String,
    guild_id: String,
    channel_id: String,
    archive_delay: Duration,
}

impl ThreadManager {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            archive_delay: DEFAULT_ARCHIVE_DELAY,
        }
    }

    pub fn with_archive_delay(mut self, delay: Duration) -> Self {
        self.archive_delay = delay;
        self
    }

    /// Active threads under the configured forum channel, read fresh on
    /// every call; other channels in the guild may share the response and
    /// are filtered out.
    pub async fn active_threads(&self) -> Result<Vec<ThreadRecord>> {
        let url = format!("{}/guilds/{}/threads/active", self.api_base, self.guild_id);
        let body: ActiveThreads = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .context("fetching active threads")?
            .error_for_status()
            .context("active threads non-2xx")?
            .json()
            .await
            .context("active threads body")?;

        Ok(body
            .threads
            .into_iter()
            .filter(|t| t.parent_id == self.channel_id)
            .collect())
    }

    pub async fn archive_thread(&self, thread_id: u64) -> Result<()> {
        let url = format!("{}/channels/{}", self.api_base, thread_id);
        self.client
            .patch(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&serde_json::json!({ "archived": true }))
            .send()
            .await
            .context("archive request")?
            .error_for_status()
            .context("archive non-2xx")?;
        Ok(())
    }

    /// Archive the oldest threads above `max_active`, one at a time with a
    /// pacing delay for the platform's rate limits. Returns how many were
    /// archived. Failures are contained: a failed query is a no-op, a failed
    /// archive call does not stop the rest of the batch.
    pub async fn enforce_capacity(&self, max_active: usize) -> usize {
        let threads = match self.active_threads().await {
            Ok(threads) => threads,
            Err(e) => {
                tracing::warn!(error = ?e, "could not list active threads, skipping archival");
                return 0;
            }
        };

        let to_archive = oldest_excess(&threads, max_active);
        if to_archive.is_empty() {
            tracing::debug!(
                active = threads.len(),
                max_active,
                "thread count within cap"
            );
            return 0;
        }
        tracing::info!(
            active = threads.len(),
            max_active,
            excess = to_archive.len(),
            "archiving oldest threads"
        );

        let mut archived = 0usize;
        for thread_id in to_archive {
            match self.archive_thread(thread_id).await {
                Ok(()) => {
                    archived += 1;
                    counter!("news_threads_archived_total").increment(1);
                    tracing::info!(thread_id, "archived thread");
                }
                Err(e) => {
                    tracing::warn!(error = ?e, thread_id, "failed to archive thread");
                }
            }
            tokio::time::sleep(self.archive_delay).await;
        }
        archived
    }
}
