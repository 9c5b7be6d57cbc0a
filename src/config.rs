// src/config.rs
//! All runtime configuration, collected once at startup and passed by
//! reference into components. No module does its own ambient env lookups.

use std::path::PathBuf;
use std::time::Duration;

use crate::deliver::PostMode;
use crate::sources::types::SourceName;

pub const DEFAULT_MAX_ACTIVE_THREADS: usize = 200;
pub const DEFAULT_FETCH_LIMIT_PER_FEED: usize = 5;

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Enabled sources, in the order adapters run.
    pub active_sources: Vec<SourceName>,
    /// Platform cap on concurrently active forum threads.
    pub max_active_threads: usize,
    pub post_mode: PostMode,
    pub fetch_limit_per_feed: usize,
    pub rss_feed_urls: Vec<String>,
    pub discord_secret_id: String,
    pub bluesky_secret_id: String,
    pub discord_api_base: String,
    pub bluesky_api_base: String,
    pub state_bucket: String,
    pub state_key: String,
    /// Root directory of the filesystem blob store.
    pub state_dir: PathBuf,
    /// Delay between per-feed fetch attempts.
    pub retry_delay: Duration,
    /// Pacing between consecutive thread-archive calls.
    pub archive_delay: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            active_sources: vec![SourceName::Bluesky, SourceName::Rss],
            max_active_threads: DEFAULT_MAX_ACTIVE_THREADS,
            post_mode: PostMode::Forum,
            fetch_limit_per_feed: DEFAULT_FETCH_LIMIT_PER_FEED,
            rss_feed_urls: Vec::new(),
            discord_secret_id: "DISCORD_BOT_SECRET".into(),
            bluesky_secret_id: "BLUESKY_SECRET".into(),
            discord_api_base: "https://discord.com/api/v10".into(),
            bluesky_api_base: crate::sources::bluesky::DEFAULT_API_BASE.into(),
            state_bucket: "news-bot-processed-posts".into(),
            state_key: "processed_posts.json".into(),
            state_dir: PathBuf::from(".newsdrop-state"),
            retry_delay: Duration::from_secs(2),
            archive_delay: Duration::from_secs(1),
        }
    }
}

impl BotConfig {
    /// Build from the environment (dotenv already loaded by the caller).
    /// Unparsable values fall back to defaults with a warning rather than
    /// aborting startup.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(raw) = std::env::var("ACTIVE_SOURCES") {
            cfg.active_sources = parse_sources(&raw);
        }
        if let Some(n) = env_parse::<usize>("MAX_ACTIVE_THREADS") {
            cfg.max_active_threads = n;
        }
        if let Ok(raw) = std::env::var("DISCORD_POST_TYPE") {
            match PostMode::parse(&raw) {
                Some(mode) => cfg.post_mode = mode,
                None => tracing::warn!(value = %raw, "unknown DISCORD_POST_TYPE, using forum"),
            }
        }
        if let Some(n) = env_parse::<usize>("FETCH_LIMIT_PER_FEED") {
            cfg.fetch_limit_per_feed = n;
        }
        if let Ok(raw) = std::env::var("RSS_FEEDS") {
            cfg.rss_feed_urls = parse_list(&raw);
        }
        if let Ok(v) = std::env::var("DISCORD_SECRET_ID") {
            cfg.discord_secret_id = v;
        }
        if let Ok(v) = std::env::var("BLUESKY_SECRET_ID") {
            cfg.bluesky_secret_id = v;
        }
        if let Ok(v) = std::env::var("DISCORD_API_BASE") {
            cfg.discord_api_base = v;
        }
        if let Ok(v) = std::env::var("BLUESKY_API_BASE") {
            cfg.bluesky_api_base = v;
        }
        if let Ok(v) = std::env::var("STATE_BUCKET") {
            cfg.state_bucket = v;
        }
        if let Ok(v) = std::env::var("STATE_KEY") {
            cfg.state_key = v;
        }
        if let Ok(v) = std::env::var("STATE_DIR") {
            cfg.state_dir = PathBuf::from(v);
        }
        if let Some(ms) = env_parse::<u64>("FEED_RETRY_DELAY_MS") {
            cfg.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("THREAD_ARCHIVE_DELAY_MS") {
            cfg.archive_delay = Duration::from_millis(ms);
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "unparsable config value, using default");
            None
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comma list of source names; unknown tokens are warned about and dropped,
/// duplicates keep the first occurrence so adapter order stays deterministic.
fn parse_sources(raw: &str) -> Vec<SourceName> {
    let mut out = Vec::new();
    for token in parse_list(raw) {
        match SourceName::parse(&token) {
            Some(name) if !out.contains(&name) => out.push(name),
            Some(_) => {}
            None => tracing::warn!(token = %token, "unknown source in ACTIVE_SOURCES"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_list_drops_unknown_and_duplicate_tokens() {
        let sources = parse_sources("rss, bluesky, telegram, rss");
        assert_eq!(sources, vec![SourceName::Rss, SourceName::Bluesky]);
        assert!(parse_sources("").is_empty());
    }

    #[test]
    fn comma_lists_are_trimmed() {
        assert_eq!(
            parse_list(" https://a/feed , ,https://b/feed"),
            vec!["https://a/feed".to_string(), "https://b/feed".to_string()]
        );
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_defaults_and_bad_values_fall_back() {
        std::env::set_var("MAX_ACTIVE_THREADS", "50");
        std::env::set_var("DISCORD_POST_TYPE", "channel");
        std::env::set_var("ACTIVE_SOURCES", "rss");
        std::env::set_var("FETCH_LIMIT_PER_FEED", "not-a-number");

        let cfg = BotConfig::from_env();
        assert_eq!(cfg.max_active_threads, 50);
        assert_eq!(cfg.post_mode, PostMode::Channel);
        assert_eq!(cfg.active_sources, vec![SourceName::Rss]);
        assert_eq!(cfg.fetch_limit_per_feed, DEFAULT_FETCH_LIMIT_PER_FEED);

        for key in [
            "MAX_ACTIVE_THREADS",
            "DISCORD_POST_TYPE",
            "ACTIVE_SOURCES",
            "FETCH_LIMIT_PER_FEED",
        ] {
            std::env::remove_var(key);
        }
    }
}
