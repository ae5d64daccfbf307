//! In-process K/V backend
//!
//! Holds full (prefixed) paths in a `DashMap` with an optional expiry per entry.
//! Expired entries are invisible to readers and purged lazily.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::{key_with_prefix, strip_key_prefix, KvConfig, KvStore};
use crate::error::{RegistratorError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory store with TTL support
#[derive(Debug, Clone)]
pub struct MemoryStore {
    prefix: String,
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub const NAME: &'static str = "memory";

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Registry constructor
    pub fn construct(config: &KvConfig) -> Result<Arc<dyn KvStore>> {
        Ok(Arc::new(Self::new(config.prefix.clone())))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|entry| entry.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn backend_name(&self) -> &str {
        Self::NAME
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn read(&self, key: &str, recursive: bool) -> Result<HashMap<String, String>> {
        self.purge_expired();
        let path = key_with_prefix(&self.prefix, key);
        debug!("memory.read(): '{}' (recursive: {})", path, recursive);

        if let Some(entry) = self.entries.get(&path) {
            let mut result = HashMap::new();
            result.insert(strip_key_prefix(&self.prefix, &path), entry.value.clone());
            return Ok(result);
        }

        // Treat the path as a directory and collect its immediate children.
        let dir = format!("{}/", path);
        let mut result = HashMap::new();
        for entry in self.entries.iter() {
            let Some(rest) = entry.key().strip_prefix(&dir) else {
                continue;
            };
            if let Some((child, _)) = rest.split_once('/') {
                return Err(RegistratorError::UnsupportedNestedKey {
                    key: strip_key_prefix(&self.prefix, &format!("{}{}", dir, child)),
                });
            }
            result.insert(strip_key_prefix(&self.prefix, entry.key()), entry.value().value.clone());
        }

        if result.is_empty() {
            return Err(RegistratorError::key_not_found(path));
        }
        Ok(result)
    }

    async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let path = key_with_prefix(&self.prefix, key);
        debug!("memory.write(): '{}' (ttl: {}s)", path, ttl.as_secs());
        let expires_at = if ttl.is_zero() { None } else { Some(Instant::now() + ttl) };
        self.entries.insert(
            path,
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = key_with_prefix(&self.prefix, key);
        debug!("memory.delete(): '{}'", path);
        self.entries.remove(&path);
        Ok(())
    }
}
