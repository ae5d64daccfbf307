//! Pluggable key/value store abstraction
//!
//! Every backend scopes its keys under a configured root prefix. Callers only ever
//! see keys relative to that prefix; the backends prepend it on the way in and strip
//! it on the way out.
//!
//! Backends are selected by name through [`registry`], so adding a new store never
//! touches the watcher or syncer.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RegistratorError, Result};

pub mod etcd;
pub mod memory;
pub mod registry;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use registry::{available_backends, create_backend, BackendConstructor, BackendRegistry};

/// Abstract key/value store interface.
///
/// Implementations are shared between the watcher and the syncer through an `Arc`
/// and must tolerate concurrent calls without external locking.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Name the backend was registered under
    fn backend_name(&self) -> &str;

    /// Root prefix all keys live under
    fn prefix(&self) -> &str;

    /// Read a key, or the immediate children of a directory when `recursive` is set.
    ///
    /// An empty `key` addresses the prefix itself. A missing key yields
    /// [`RegistratorError::KeyNotFound`]; a child directory yields
    /// [`RegistratorError::UnsupportedNestedKey`].
    async fn read(&self, key: &str, recursive: bool) -> Result<HashMap<String, String>>;

    /// Upsert a key with a time-to-live
    async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete a key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Backend construction parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvConfig {
    pub backend: String,
    pub host: String,
    pub port: u16,
    pub prefix: String,
    /// Upper bound for a single store round-trip
    pub request_timeout: Duration,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            backend: "etcd".to_string(),
            host: "etcd".to_string(),
            port: 2379,
            prefix: "fs_registrations".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Join a key onto the prefix. An empty key addresses the prefix itself.
pub fn key_with_prefix(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_start_matches('/');
    if key.is_empty() {
        prefix.to_string()
    } else if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

/// Strip the prefix (and surrounding slashes) from a full key as returned by a store
pub fn strip_key_prefix(prefix: &str, full_key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = full_key.trim_start_matches('/');
    let key = match key.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => key,
    };
    key.trim_start_matches('/').to_string()
}

/// Bound a store or switch round-trip by `limit`
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(RegistratorError::Timeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_with_prefix() {
        assert_eq!(key_with_prefix("fs_registrations", ""), "fs_registrations");
        assert_eq!(key_with_prefix("fs_registrations", "1000@x"), "fs_registrations/1000@x");
        assert_eq!(key_with_prefix("/fs_registrations/", "/1000@x"), "fs_registrations/1000@x");
    }

    #[test]
    fn test_strip_key_prefix() {
        assert_eq!(strip_key_prefix("fs_registrations", "/fs_registrations/1000@x"), "1000@x");
        assert_eq!(strip_key_prefix("fs_registrations", "fs_registrations/1000@x"), "1000@x");
        assert_eq!(strip_key_prefix("fs_registrations", "/fs_registrations"), "");
        assert_eq!(strip_key_prefix("other", "/fs_registrations/1000@x"), "fs_registrations/1000@x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("write", Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        match result {
            Err(RegistratorError::Timeout { operation, seconds }) => {
                assert_eq!(operation, "write");
                assert_eq!(seconds, 2);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
