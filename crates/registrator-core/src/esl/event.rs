//! Registration event parsing and subscription handshake checks

use std::fmt;

use super::{EslMessage, EventHeaders};
use crate::error::{RegistratorError, Result};
use crate::types::RegistrationKey;

/// Event classes the watcher subscribes to
pub const REGISTRATION_SUBCLASSES: [&str; 3] = ["sofia::register", "sofia::unregister", "sofia::expire"];

pub const SUBSCRIBE_COMMAND: &str = "event json CUSTOM sofia::register sofia::unregister sofia::expire";

pub const SUBSCRIBE_CONTENT_TYPE: &str = "command/reply";
pub const SUBSCRIBE_REPLY_TEXT: &str = "+OK event listener enabled json";

/// What happened to a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEventKind {
    Register,
    Unregister,
    Expire,
}

impl RegistrationEventKind {
    fn from_subclass(subclass: &str) -> Option<Self> {
        match subclass {
            "sofia::register" => Some(Self::Register),
            "sofia::unregister" => Some(Self::Unregister),
            "sofia::expire" => Some(Self::Expire),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Unregister => "unregister",
            Self::Expire => "expire",
        }
    }
}

impl fmt::Display for RegistrationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed registration event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEvent {
    pub kind: RegistrationEventKind,
    pub key: RegistrationKey,
}

/// Check the acknowledgement of [`SUBSCRIBE_COMMAND`]
pub fn validate_subscription_reply(reply: &EslMessage) -> Result<()> {
    let content_type = reply.content_type().unwrap_or_default();
    if content_type != SUBSCRIBE_CONTENT_TYPE {
        return Err(RegistratorError::protocol(format!(
            "subscription reply has content-type '{}', expected '{}'",
            content_type, SUBSCRIBE_CONTENT_TYPE
        )));
    }
    let reply_text = reply.reply_text().unwrap_or_default();
    if reply_text != SUBSCRIBE_REPLY_TEXT {
        return Err(RegistratorError::protocol(format!(
            "subscription reply text '{}', expected '{}'",
            reply_text, SUBSCRIBE_REPLY_TEXT
        )));
    }
    Ok(())
}

/// Turn a sofia register/unregister/expire event into `(kind, user@host)`.
///
/// These events lack the full `<user>` we see in status listings, so the key is
/// built from `username` and `from-host`.
pub fn parse_registration_event(event: &EventHeaders) -> Result<RegistrationEvent> {
    for field in ["Event-Subclass", "username", "from-host"] {
        match event.get(field) {
            None => {
                return Err(RegistratorError::protocol(format!(
                    "'{}' field does not exist in FreeSWITCH event",
                    field
                )));
            }
            Some(value) if value.is_empty() => {
                return Err(RegistratorError::protocol(format!(
                    "'{}' field cannot be empty in FreeSWITCH event",
                    field
                )));
            }
            Some(_) => {}
        }
    }

    let subclass = &event["Event-Subclass"];
    let kind = RegistrationEventKind::from_subclass(subclass).ok_or_else(|| {
        RegistratorError::protocol(format!(
            "'Event-Subclass' is '{}', must be one of: {}",
            subclass,
            REGISTRATION_SUBCLASSES.join(", ")
        ))
    })?;

    Ok(RegistrationEvent {
        kind,
        key: RegistrationKey::from_parts(&event["username"], &event["from-host"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn register_event() -> EventHeaders {
        [
            ("call-id", "AbtneHy2nQkhY-S.ypzYrl25I9zEIPGN"),
            ("contact", "\"Firstname Lastname\" <sip:someuser@192.168.99.1:58843;ob>"),
            ("expires", "300"),
            ("Event-Name", "CUSTOM"),
            ("Event-Subclass", "sofia::register"),
            ("from-host", "sip.somedomain.com"),
            ("from-user", "someuser"),
            ("network-ip", "192.168.99.1"),
            ("network-port", "58843"),
            ("profile-name", "someprofile"),
            ("status", "Registered(UDP)"),
            ("username", "someuser"),
            ("user-agent", "Telephone 1.1.7"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn reply(content_type: &str, reply_text: &str) -> EslMessage {
        let mut message = EslMessage::default();
        message.headers.insert("Content-Type".to_string(), content_type.to_string());
        message.headers.insert("Reply-Text".to_string(), reply_text.to_string());
        message
    }

    #[test]
    fn test_parse_register_event() {
        let event = parse_registration_event(&register_event()).unwrap();
        assert_eq!(
            event,
            RegistrationEvent {
                kind: RegistrationEventKind::Register,
                key: RegistrationKey::new("someuser@sip.somedomain.com"),
            }
        );
    }

    #[test]
    fn test_parse_unregister_and_expire() {
        let mut headers = register_event();
        headers.insert("Event-Subclass".to_string(), "sofia::unregister".to_string());
        assert_eq!(parse_registration_event(&headers).unwrap().kind, RegistrationEventKind::Unregister);

        headers.insert("Event-Subclass".to_string(), "sofia::expire".to_string());
        assert_eq!(parse_registration_event(&headers).unwrap().kind, RegistrationEventKind::Expire);
    }

    #[test]
    fn test_missing_or_empty_fields_are_protocol_violations() {
        for field in ["Event-Subclass", "username", "from-host"] {
            let mut headers = register_event();
            headers.remove(field);
            assert!(matches!(
                parse_registration_event(&headers),
                Err(RegistratorError::ProtocolViolation { .. })
            ));

            let mut headers = register_event();
            headers.insert(field.to_string(), String::new());
            assert!(matches!(
                parse_registration_event(&headers),
                Err(RegistratorError::ProtocolViolation { .. })
            ));
        }
    }

    #[test]
    fn test_unknown_subclass_is_rejected() {
        let mut headers = register_event();
        headers.insert("Event-Subclass".to_string(), "sofia::gateway_state".to_string());
        let err = parse_registration_event(&headers).unwrap_err();
        assert!(err.to_string().contains("sofia::register, sofia::unregister, sofia::expire"));
    }

    #[test]
    fn test_subscription_reply_validation() {
        assert!(validate_subscription_reply(&reply("command/reply", "+OK event listener enabled json")).is_ok());
        assert!(validate_subscription_reply(&reply("api/response", "+OK event listener enabled json")).is_err());
        assert!(validate_subscription_reply(&reply("command/reply", "-ERR no reply")).is_err());
        assert!(validate_subscription_reply(&EslMessage::default()).is_err());
    }
}
