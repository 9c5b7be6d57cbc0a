// src/sources/mod.rs
pub mod bluesky;
pub mod rss;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::sources::types::{FetchOutcome, NewsSource, Post, SourceName};
use crate::store::{BlobStore, SeenPosts};

/// Char budget for titles derived from body text.
const TITLE_BUDGET: usize = 100;

/// Discord caps embed descriptions at 4096 chars; stay under it.
const CONTENT_BUDGET: usize = 4000;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "news_source_posts_total",
            "New posts emitted by source adapters after dedup."
        );
        describe_counter!(
            "news_source_skipped_total",
            "Adapter runs skipped (missing credentials / nothing configured)."
        );
        describe_counter!("news_source_errors_total", "Adapter fetch failures.");
        describe_counter!(
            "news_state_save_failures_total",
            "Failed persists of the processed-posts blob."
        );
        describe_gauge!("news_seen_ids", "Size of the seen-id set after the run.");
    });
}

/// Strip HTML and normalize whitespace in source-provided text.
pub fn clean_html(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    if out.chars().count() > CONTENT_BUDGET {
        out = out.chars().take(CONTENT_BUDGET).collect();
    }

    out
}

/// Derive a thread-sized title from body text: first 100 chars plus an
/// ellipsis marker when the text was longer.
pub fn headline(text: &str) -> String {
    if text.chars().count() <= TITLE_BUDGET {
        return text.to_string();
    }
    let mut out: String = text.chars().take(TITLE_BUDGET).collect();
    out.push_str("...");
    out
}

/// Per-adapter outcome of one polling run, reported to the caller instead of
/// being swallowed into logs.
#[derive(Debug)]
pub enum SourceNote {
    Fetched { source: SourceName, count: usize },
    Skipped { source: SourceName, reason: String },
    Failed { source: SourceName, error: String },
}

impl std::fmt::Display for SourceNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceNote::Fetched { source, count } => write!(f, "{source}: {count} new"),
            SourceNote::Skipped { source, reason } => write!(f, "{source}: skipped ({reason})"),
            SourceNote::Failed { source, error } => write!(f, "{source}: failed ({error})"),
        }
    }
}

/// Run every enabled adapter in declared order and merge the results.
///
/// Owns the whole load→mutate→persist lifecycle of the seen-id set: one load
/// before the first adapter, one best-effort save after the last. A save
/// failure is logged and accepted (the next run may redeliver; documented
/// at-least-once behavior). An empty `sources` slice is a no-op, not an
/// error.
pub async fn fetch_all(
    sources: &[Box<dyn NewsSource>],
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
) -> (Vec<Post>, Vec<SourceNote>) {
    ensure_metrics_described();

    let mut seen = SeenPosts::load(store, bucket, key).await;
    let mut posts = Vec::new();
    let mut notes = Vec::new();

    for source in sources {
        match source.fetch_latest(seen.ids()).await {
            Ok(FetchOutcome::Posts(new_posts)) => {
                for p in &new_posts {
                    seen.insert(p.source_id.clone());
                }
                counter!("news_source_posts_total", "source" => source.name().as_str())
                    .increment(new_posts.len() as u64);
                notes.push(SourceNote::Fetched {
                    source: source.name(),
                    count: new_posts.len(),
                });
                posts.extend(new_posts);
            }
            Ok(FetchOutcome::Skipped(reason)) => {
                tracing::warn!(source = %source.name(), reason, "source skipped");
                counter!("news_source_skipped_total").increment(1);
                notes.push(SourceNote::Skipped {
                    source: source.name(),
                    reason,
                });
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = %source.name(), "source failed");
                counter!("news_source_errors_total").increment(1);
                notes.push(SourceNote::Failed {
                    source: source.name(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    if let Err(e) = seen.save(store, bucket, key).await {
        // Accepted risk: the next run redelivers whatever this save lost.
        tracing::warn!(error = ?e, bucket, key, "failed to persist processed posts");
        counter!("news_state_save_failures_total").increment(1);
    }
    gauge!("news_seen_ids").set(seen.len() as f64);

    (posts, notes)
}
