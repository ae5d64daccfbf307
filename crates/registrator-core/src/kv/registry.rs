//! Name-keyed table of K/V backend constructors
//!
//! The default table is built once, from an explicit list, the first time it is
//! used. Nothing registers itself as a side effect of being linked in.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use super::{EtcdStore, KvConfig, KvStore, MemoryStore};
use crate::error::{RegistratorError, Result};

/// Builds a backend from its configuration
pub type BackendConstructor = fn(&KvConfig) -> Result<Arc<dyn KvStore>>;

static DEFAULT_REGISTRY: Lazy<BackendRegistry> = Lazy::new(|| {
    BackendRegistry::new()
        .register(EtcdStore::NAME, EtcdStore::construct)
        .register(MemoryStore::NAME, MemoryStore::construct)
});

/// Immutable once built; cheap to share by reference.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<&'static str, BackendConstructor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table holding every backend shipped with this crate
    pub fn global() -> &'static BackendRegistry {
        &DEFAULT_REGISTRY
    }

    /// Add a constructor. A duplicate name keeps the first registration.
    pub fn register(mut self, name: &'static str, constructor: BackendConstructor) -> Self {
        if self.constructors.contains_key(name) {
            warn!("K/V backend '{}' already registered, ignoring duplicate", name);
            return self;
        }
        self.constructors.insert(name, constructor);
        self
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Construct the backend named by `config.backend`
    pub fn create(&self, config: &KvConfig) -> Result<Arc<dyn KvStore>> {
        let constructor = self.constructors.get(config.backend.as_str()).ok_or_else(|| {
            RegistratorError::BackendNotFound {
                name: config.backend.clone(),
                available: self.names().into_iter().map(String::from).collect(),
            }
        })?;
        debug!("Constructing K/V backend '{}'", config.backend);
        constructor(config)
    }
}

/// Names of all backends in the global registry
pub fn available_backends() -> Vec<&'static str> {
    BackendRegistry::global().names()
}

/// Construct a backend from the global registry
pub fn create_backend(config: &KvConfig) -> Result<Arc<dyn KvStore>> {
    BackendRegistry::global().create(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str) -> KvConfig {
        KvConfig {
            backend: backend.to_string(),
            host: "10.2.3.4".to_string(),
            port: 2379,
            prefix: "someprefix".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_available_backends() {
        assert_eq!(available_backends(), vec!["etcd", "memory"]);
    }

    #[tokio::test]
    async fn test_create_backend() {
        let store = create_backend(&config("etcd")).unwrap();
        assert_eq!(store.backend_name(), "etcd");
        assert_eq!(store.prefix(), "someprefix");

        let store = create_backend(&config("memory")).unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.prefix(), "someprefix");
    }

    #[test]
    fn test_create_unknown_backend() {
        match create_backend(&config("nonexistent")) {
            Err(RegistratorError::BackendNotFound { name, available }) => {
                assert_eq!(name, "nonexistent");
                assert_eq!(available, vec!["etcd".to_string(), "memory".to_string()]);
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        fn fails(_: &KvConfig) -> Result<Arc<dyn KvStore>> {
            Err(RegistratorError::backend_io("second constructor"))
        }

        let registry = BackendRegistry::new()
            .register("memory", MemoryStore::construct)
            .register("memory", fails);

        assert_eq!(registry.names(), vec!["memory"]);
        assert!(registry.contains("memory"));
        assert!(registry.create(&config("memory")).is_ok());
    }
}
