//! Registration data model and its K/V value codec

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// SIP endpoint identity, `user@domain`.
///
/// Treated as an opaque mapping key; nothing beyond the constructor looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationKey(String);

impl RegistrationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build a key from the user and host fields of a switch event
    pub fn from_parts(user: &str, domain: &str) -> Self {
        Self(format!("{}@{}", user, domain))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegistrationKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for RegistrationKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Where to route to reach the bridge instance owning a registration.
///
/// This is the advertise identity of an instance, not the endpoint's own address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationValue {
    pub host: String,
    pub port: u16,
}

impl RegistrationValue {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Encode as the store's value slot: `{"host":"..","port":..}`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored value
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }
}

impl fmt::Display for RegistrationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Snapshot of registrations, keyed by endpoint identity.
///
/// Snapshots are values: the syncer builds a fresh one per pass and hands it to
/// `reconcile` by reference, nothing mutates a snapshot another task can see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registrations {
    entries: HashMap<RegistrationKey, RegistrationValue>,
}

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// "Current" snapshot: every user the switch reports, stamped with our advertise identity
    pub fn from_users<S: AsRef<str>>(users: &[S], advertise: &RegistrationValue) -> Self {
        users
            .iter()
            .map(|user| (RegistrationKey::new(user.as_ref()), advertise.clone()))
            .collect()
    }

    /// "Last" snapshot: raw K/V entries decoded into values.
    ///
    /// A single undecodable entry fails the whole snapshot.
    pub fn from_kv_entries(entries: &HashMap<String, String>) -> Result<Self> {
        let mut result = Self::new();
        for (key, raw) in entries {
            let value = RegistrationValue::from_json(raw)?;
            result.insert(RegistrationKey::new(key.as_str()), value);
        }
        Ok(result)
    }

    /// Only the entries advertised by `identity`
    pub fn owned_by(&self, identity: &RegistrationValue) -> Self {
        self.entries
            .iter()
            .filter(|(_, value)| *value == identity)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn insert(&mut self, key: RegistrationKey, value: RegistrationValue) -> Option<RegistrationValue> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &RegistrationKey) -> Option<&RegistrationValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &RegistrationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RegistrationKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegistrationKey, &RegistrationValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(RegistrationKey, RegistrationValue)> for Registrations {
    fn from_iter<I: IntoIterator<Item = (RegistrationKey, RegistrationValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
