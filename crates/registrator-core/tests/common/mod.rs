//! Scripted stand-ins for the switch and a store that can be told to fail

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use registrator_core::esl::{EslMessage, EventHeaders};
use registrator_core::kv::MemoryStore;
use registrator_core::{KvStore, RegistrationSource, RegistrationValue, RegistratorError, Result, SwitchEvents};

pub const TTL: Duration = Duration::from_secs(300);

pub fn advertise() -> RegistrationValue {
    RegistrationValue::new("192.168.99.100", 5061)
}

pub fn other_instance() -> RegistrationValue {
    RegistrationValue::new("192.168.99.101", 5061)
}

pub fn subscription_ack() -> EslMessage {
    let mut message = EslMessage::default();
    message.headers.insert("Content-Type".to_string(), "command/reply".to_string());
    message
        .headers
        .insert("Reply-Text".to_string(), "+OK event listener enabled json".to_string());
    message
}

pub fn sofia_event(subclass: &str, user: &str, host: &str) -> EventHeaders {
    let mut headers = HashMap::new();
    headers.insert("Event-Name".to_string(), "CUSTOM".to_string());
    headers.insert("Event-Subclass".to_string(), format!("sofia::{}", subclass));
    headers.insert("username".to_string(), user.to_string());
    headers.insert("from-host".to_string(), host.to_string());
    headers
}

/// Replays a fixed acknowledgement and event list.
///
/// Once the script runs out the stream either closes or blocks forever.
pub struct ScriptedEvents {
    ack: EslMessage,
    events: VecDeque<Result<EventHeaders>>,
    block_when_drained: bool,
}

impl ScriptedEvents {
    pub fn new(events: Vec<Result<EventHeaders>>) -> Self {
        Self {
            ack: subscription_ack(),
            events: events.into(),
            block_when_drained: false,
        }
    }

    pub fn with_ack(mut self, ack: EslMessage) -> Self {
        self.ack = ack;
        self
    }

    pub fn blocking_when_drained(mut self) -> Self {
        self.block_when_drained = true;
        self
    }
}

#[async_trait]
impl SwitchEvents for ScriptedEvents {
    async fn subscribe_registration_events(&mut self) -> Result<EslMessage> {
        Ok(self.ack.clone())
    }

    async fn next_event(&mut self) -> Result<EventHeaders> {
        match self.events.pop_front() {
            Some(event) => event,
            None if self.block_when_drained => std::future::pending().await,
            None => Err(RegistratorError::ConnectionClosed {
                peer: "scripted".to_string(),
            }),
        }
    }
}

/// Reports a fixed user list, or fails when `users` is `None`
#[derive(Clone)]
pub struct StaticInventory {
    users: Option<Vec<String>>,
    calls: Arc<AtomicUsize>,
}

impl StaticInventory {
    pub fn new(users: &[&str]) -> Self {
        Self {
            users: Some(users.iter().map(|u| u.to_string()).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            users: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationSource for StaticInventory {
    async fn registered_users(&mut self, _profiles: &[String]) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.users.clone().ok_or_else(|| RegistratorError::ConnectionClosed {
            peer: "inventory".to_string(),
        })
    }
}

/// Memory store that rejects writes and deletes for selected keys
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Vec<String>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, failing: &[&str]) -> Self {
        Self {
            inner,
            failing: failing.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.iter().any(|k| k == key) {
            return Err(RegistratorError::backend_io(format!("refusing {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    fn backend_name(&self) -> &str {
        "flaky"
    }

    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    async fn read(&self, key: &str, recursive: bool) -> Result<HashMap<String, String>> {
        self.inner.read(key, recursive).await
    }

    async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check(key)?;
        self.inner.write(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.delete(key).await
    }
}

/// Sorted keys currently stored, with decoded values
pub async fn stored(store: &dyn KvStore) -> Vec<(String, RegistrationValue)> {
    let raw = match store.read("", true).await {
        Ok(raw) => raw,
        Err(e) if e.is_key_not_found() => HashMap::new(),
        Err(e) => panic!("read failed: {}", e),
    };
    let mut entries: Vec<_> = raw
        .into_iter()
        .map(|(k, v)| (k, RegistrationValue::from_json(&v).unwrap()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Seed a store entry the way some instance would have written it
pub async fn seed(store: &dyn KvStore, key: &str, owner: &RegistrationValue) {
    store.write(key, &owner.to_json().unwrap(), TTL).await.unwrap();
}
