// src/pipeline.rs
//! One polling run, end to end: aggregate new posts from every enabled
//! source, then hand them one at a time to the delivery path.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::config::BotConfig;
use crate::deliver::{DeliveryOutcome, Dispatcher};
use crate::secrets::SecretStore;
use crate::sources;
use crate::sources::bluesky::BlueskySource;
use crate::sources::rss::RssSource;
use crate::sources::types::{NewsSource, SourceName};
use crate::store::BlobStore;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_runs_total", "Completed polling runs.");
        describe_counter!("news_posts_delivered_total", "Posts delivered to the webhook.");
        describe_counter!(
            "news_posts_skipped_total",
            "Posts whose delivery was skipped (no webhook configured)."
        );
        describe_counter!(
            "news_delivery_failures_total",
            "Posts whose webhook POST returned an error."
        );
    });
}

/// Coarse result of one run, surfaced to the trigger. Per-post status stays
/// in logs; the caller only gets counts and a human-readable summary.
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub source_notes: Vec<String>,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "fetched {} new posts ({}); delivered {}, skipped {}, failed {}",
            self.fetched,
            if self.source_notes.is_empty() {
                "no sources enabled".to_string()
            } else {
                self.source_notes.join("; ")
            },
            self.delivered,
            self.skipped,
            self.failed
        )
    }
}

/// Enabled adapters in the configured order.
fn build_sources(cfg: &BotConfig, secrets: Arc<dyn SecretStore>) -> Vec<Box<dyn NewsSource>> {
    cfg.active_sources
        .iter()
        .map(|name| -> Box<dyn NewsSource> {
            match name {
                SourceName::Bluesky => Box::new(
                    BlueskySource::new(
                        Arc::clone(&secrets),
                        cfg.bluesky_secret_id.clone(),
                        cfg.fetch_limit_per_feed,
                    )
                    .with_api_base(cfg.bluesky_api_base.clone())
                    .with_retry_delay(cfg.retry_delay),
                ),
                SourceName::Rss => Box::new(
                    RssSource::new(cfg.rss_feed_urls.clone(), cfg.fetch_limit_per_feed)
                        .with_retry_delay(cfg.retry_delay),
                ),
            }
        })
        .collect()
}

/// Run the whole pipeline once. Per-item and per-feed trouble is contained
/// inside; an `Err` here means the run itself could not be carried out.
pub async fn run_news_post(
    cfg: &BotConfig,
    secrets: Arc<dyn SecretStore>,
    store: &dyn BlobStore,
) -> Result<RunReport> {
    ensure_metrics_described();
    let started_at = Utc::now();

    let adapters = build_sources(cfg, Arc::clone(&secrets));
    let (posts, notes) =
        sources::fetch_all(&adapters, store, &cfg.state_bucket, &cfg.state_key).await;

    let dispatcher = Dispatcher::new(cfg, secrets);
    let mut delivered = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for post in &posts {
        match dispatcher.deliver(post).await {
            DeliveryOutcome::Delivered => {
                delivered += 1;
                counter!("news_posts_delivered_total").increment(1);
            }
            DeliveryOutcome::Skipped(_) => {
                skipped += 1;
                counter!("news_posts_skipped_total").increment(1);
            }
            DeliveryOutcome::Failed(_) => {
                failed += 1;
                counter!("news_delivery_failures_total").increment(1);
            }
        }
    }
    counter!("news_runs_total").increment(1);

    let report = RunReport {
        started_at,
        fetched: posts.len(),
        delivered,
        skipped,
        failed,
        source_notes: notes.iter().map(|n| n.to_string()).collect(),
    };
    tracing::info!(summary = %report.summary(), "news post run finished");
    Ok(report)
}
