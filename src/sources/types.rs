// src/sources/types.rs
use std::collections::HashSet;
use std::fmt;

use anyhow::Result;

/// Tag identifying which adapter produced a [`Post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    Bluesky,
    Rss,
}

impl SourceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Bluesky => "bluesky",
            SourceName::Rss => "rss",
        }
    }

    /// Case-insensitive parse of a config token ("bluesky", "rss").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bluesky" => Some(SourceName::Bluesky),
            "rss" => Some(SourceName::Rss),
            _ => None,
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engagement counts as reported by the source; zero when not reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
    pub quotes: u64,
}

/// External-article preview wrapped by a source item, if any.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArticlePreview {
    pub title: String,
    pub description: String,
    pub url: String,
}

/// Normalized unit of content every adapter produces and every sink consumes.
///
/// `source_id` is the dedup key. It must be stable across repeated fetches of
/// the same item and namespaced per source so identifiers from different
/// sources never collide in the shared seen-set (Bluesky uses the `at://`
/// record URI, RSS prefixes `rss:`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Post {
    pub source_id: String,
    pub title: String,
    pub content: String,
    pub author_name: String,
    pub author_handle: String,
    pub author_avatar_url: String,
    /// Resolved destination URL; prefers an embedded external-article URL
    /// over the source's own permalink.
    pub post_url: String,
    /// The source's own permalink.
    pub canonical_link: String,
    /// External-embed thumbnail, else first inline image, else empty.
    pub image_url: String,
    pub engagement: Engagement,
    pub article: Option<ArticlePreview>,
    pub origin: SourceName,
}

impl Post {
    /// Empty post skeleton; adapters fill in what their source reports.
    pub fn new(origin: SourceName, source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: String::new(),
            content: String::new(),
            author_name: String::new(),
            author_handle: String::new(),
            author_avatar_url: String::new(),
            post_url: String::new(),
            canonical_link: String::new(),
            image_url: String::new(),
            engagement: Engagement::default(),
            article: None,
            origin,
        }
    }
}

/// What a single adapter run produced.
#[derive(Debug)]
pub enum FetchOutcome {
    /// New posts, already filtered against the caller's seen-set.
    Posts(Vec<Post>),
    /// The source sat this run out (missing credentials, nothing configured).
    Skipped(String),
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetch the latest items and return only those whose `source_id` is not
    /// in `seen`. A hard `Err` is reserved for transport-level failure of the
    /// whole adapter; per-feed trouble is retried and then skipped inside.
    async fn fetch_latest(&self, seen: &HashSet<String>) -> Result<FetchOutcome>;

    fn name(&self) -> SourceName;
}
