// src/sources/rss.rs
use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::sources::types::{FetchOutcome, NewsSource, Post, SourceName};
use crate::sources::clean_html;

const MAX_RETRIES: u8 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    author: Option<String>,
    description: Option<String>,
    // quick-xml's deserializer matches local names, so `media:content`
    // arrives as plain `content`.
    #[serde(rename = "content", default)]
    media: Vec<MediaContent>,
}

#[derive(Debug, Deserialize)]
struct MediaContent {
    #[serde(rename = "@url")]
    url: Option<String>,
}

/// Adapter over a configured list of RSS feeds. Each feed contributes at
/// most `limit` of its newest items per run.
pub struct RssSource {
    feeds: Vec<String>,
    limit: usize,
    client: reqwest::Client,
    retry_delay: Duration,
}

impl RssSource {
    pub fn new(feeds: Vec<String>, limit: usize) -> Self {
        Self {
            feeds,
            limit,
            client: reqwest::Client::new(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Parse one feed document into posts, newest-first as the feed lists them,
/// capped at `limit` and filtered against `seen`. Items without a guid or
/// link have no stable identity and are dropped.
pub fn parse_feed(xml: &str, limit: usize, seen: &HashSet<String>) -> Result<Vec<Post>> {
    let rss: Rss = from_str(xml).context("parsing rss xml")?;

    let mut out = Vec::new();
    for item in rss.channel.items.into_iter().take(limit) {
        let Some(identity) = item
            .guid
            .as_deref()
            .or(item.link.as_deref())
            .filter(|s| !s.trim().is_empty())
        else {
            tracing::warn!("skipping rss item with no guid or link");
            continue;
        };
        let source_id = format!("rss:{}", identity.trim());
        if seen.contains(&source_id) || out.iter().any(|p: &Post| p.source_id == source_id) {
            continue;
        }

        let link = item.link.as_deref().unwrap_or_default().trim().to_string();
        let mut post = Post::new(SourceName::Rss, source_id);
        // Feed titles pass through as written; only titles synthesized from
        // body text get clipped.
        post.title = clean_html(item.title.as_deref().unwrap_or_default());
        post.content = clean_html(item.description.as_deref().unwrap_or_default());
        post.author_name = item
            .author
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown Author")
            .to_string();
        post.post_url = link.clone();
        post.canonical_link = link;
        post.image_url = item
            .media
            .iter()
            .find_map(|m| m.url.clone())
            .unwrap_or_default();
        out.push(post);
    }
    Ok(out)
}

#[async_trait]
impl NewsSource for RssSource {
    async fn fetch_latest(&self, seen: &HashSet<String>) -> Result<FetchOutcome> {
        if self.feeds.is_empty() {
            return Ok(FetchOutcome::Skipped("no RSS feeds configured".into()));
        }

        let mut posts: Vec<Post> = Vec::new();
        // Merged view of caller-supplied ids and ids emitted earlier this
        // run, so the same article in two feeds is reported once.
        let mut emitted: HashSet<String> = seen.clone();

        for feed_url in &self.feeds {
            let mut fetched = None;
            for attempt in 1..=MAX_RETRIES {
                match self.fetch_one(feed_url).await {
                    Ok(body) => {
                        fetched = Some(body);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = ?e, feed = %feed_url, attempt, "rss fetch failed");
                        if attempt < MAX_RETRIES {
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
            }
            // One bad feed never aborts the rest.
            let Some(body) = fetched else {
                tracing::warn!(feed = %feed_url, "abandoning feed after {MAX_RETRIES} attempts");
                continue;
            };
            match parse_feed(&body, self.limit, &emitted) {
                Ok(new_posts) => {
                    for p in &new_posts {
                        emitted.insert(p.source_id.clone());
                    }
                    posts.extend(new_posts);
                }
                Err(e) => {
                    tracing::warn!(error = ?e, feed = %feed_url, "unparsable rss feed");
                }
            }
        }

        Ok(FetchOutcome::Posts(posts))
    }

    fn name(&self) -> SourceName {
        SourceName::Rss
    }
}

impl RssSource {
    async fn fetch_one(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("rss http get")?
            .error_for_status()
            .context("rss non-2xx")?;
        resp.text().await.context("rss body read")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example Wire</title>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/a</link>
      <guid>https://example.com/a</guid>
      <author>Jo Reporter</author>
      <description>&lt;p&gt;Lead   paragraph.&lt;/p&gt;</description>
      <media:content url="https://img.example.com/a.jpg" />
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/b</link>
    </item>
    <item>
      <title>No identity</title>
      <description>orphan</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_with_namespaced_ids() {
        let posts = parse_feed(FEED, 5, &HashSet::new()).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].source_id, "rss:https://example.com/a");
        assert_eq!(posts[0].title, "First & foremost");
        assert_eq!(posts[0].content, "Lead paragraph.");
        assert_eq!(posts[0].author_name, "Jo Reporter");
        assert_eq!(posts[0].image_url, "https://img.example.com/a.jpg");
        assert_eq!(posts[1].author_name, "Unknown Author");
        assert!(posts[1].image_url.is_empty());
    }

    #[test]
    fn long_feed_titles_are_kept_verbatim() {
        let title = "B".repeat(130);
        let xml = format!(
            r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <item>
      <title>{title}</title>
      <link>https://example.com/long</link>
    </item>
  </channel>
</rss>"#
        );
        let posts = parse_feed(&xml, 5, &HashSet::new()).unwrap();
        assert_eq!(posts[0].title.len(), 130);
        assert!(!posts[0].title.ends_with("..."));
    }

    #[test]
    fn first_media_url_wins_when_several_are_present() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <item>
      <title>Pics</title>
      <link>https://example.com/pics</link>
      <media:content url="https://img.example.com/one.jpg" />
      <media:content url="https://img.example.com/two.jpg" />
    </item>
  </channel>
</rss>"#;
        let posts = parse_feed(xml, 5, &HashSet::new()).unwrap();
        assert_eq!(posts[0].image_url, "https://img.example.com/one.jpg");
    }

    #[test]
    fn seen_items_are_filtered_before_return() {
        let seen: HashSet<String> = ["rss:https://example.com/a".to_string()].into();
        let posts = parse_feed(FEED, 5, &seen).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].source_id, "rss:https://example.com/b");
    }

    #[test]
    fn per_feed_item_cap_applies_before_dedup() {
        let posts = parse_feed(FEED, 1, &HashSet::new()).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].source_id, "rss:https://example.com/a");
    }
}
