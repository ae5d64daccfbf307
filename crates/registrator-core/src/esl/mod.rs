//! FreeSWITCH event socket (ESL) collaborator
//!
//! The watcher and the syncer each talk to the switch through one of two narrow
//! traits, so each loop can own its own connection and be driven by a scripted
//! source in tests. [`EslConnection`] implements both over TCP.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub mod connection;
pub mod event;
pub mod status;

pub use connection::EslConnection;
pub use event::{
    parse_registration_event, validate_subscription_reply, RegistrationEvent, RegistrationEventKind,
};
pub use status::{parse_profile_registrations, SofiaRegistration};

/// Flat field map of a decoded switch event
pub type EventHeaders = HashMap<String, String>;

/// One framed ESL message: a header block and an optional body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EslMessage {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl EslMessage {
    /// Header lookup, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.header("Reply-Text")
    }
}

/// Live registration events, consumed by the watcher
#[async_trait]
pub trait SwitchEvents: Send {
    /// Subscribe to register/unregister/expire events, returning the raw acknowledgement
    async fn subscribe_registration_events(&mut self) -> Result<EslMessage>;

    /// Wait for the next event.
    ///
    /// Benign stream conditions come back as `TransientIo`; the caller may keep reading.
    async fn next_event(&mut self) -> Result<EventHeaders>;
}

/// Full inventory of registered users, consumed by the syncer
#[async_trait]
pub trait RegistrationSource: Send {
    /// Users (`user@host`) registered across `profiles`, without duplicates
    async fn registered_users(&mut self, profiles: &[String]) -> Result<Vec<String>>;
}
