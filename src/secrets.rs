// src/secrets.rs
//! Opaque key-value secret lookup.
//!
//! The Discord secret carries `webhookUrl`, `forumChannelId`,
//! `forumServerId`, `token` and `publicKey`; the Bluesky secret carries
//! `username` and `password`. Where the values live is an infrastructure
//! concern; the bot only sees the map.

use std::collections::HashMap;

use anyhow::{Context, Result};

pub trait SecretStore: Send + Sync {
    fn get_secret(&self, secret_id: &str) -> Result<HashMap<String, String>>;
}

/// Reads the secret as a JSON object from the environment variable named by
/// the secret id (populated via dotenvy in local runs, injected in prod).
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get_secret(&self, secret_id: &str) -> Result<HashMap<String, String>> {
        let raw = std::env::var(secret_id)
            .with_context(|| format!("secret env var {secret_id} not set"))?;
        serde_json::from_str(&raw).with_context(|| format!("secret {secret_id} is not a JSON map"))
    }
}

/// Fixed secrets for tests and local tooling.
#[derive(Default)]
pub struct StaticSecrets {
    secrets: HashMap<String, HashMap<String, String>>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, secret_id: &str, entries: &[(&str, &str)]) -> Self {
        let map = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.secrets.insert(secret_id.to_string(), map);
        self
    }
}

impl SecretStore for StaticSecrets {
    fn get_secret(&self, secret_id: &str) -> Result<HashMap<String, String>> {
        self.secrets
            .get(secret_id)
            .cloned()
            .with_context(|| format!("no static secret registered for {secret_id}"))
    }
}

/// Non-empty field lookup; treats "" the same as absent.
pub fn field(map: &HashMap<String, String>, name: &str) -> Option<String> {
    map.get(name).map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}
