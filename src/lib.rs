// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod deliver;
pub mod metrics;
pub mod pipeline;
pub mod secrets;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::BotConfig;
pub use crate::pipeline::{run_news_post, RunReport};
pub use crate::sources::types::{Post, SourceName};
