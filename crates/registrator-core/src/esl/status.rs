//! Parsing of `sofia xmlstatus profile <name> reg` responses

use serde::Deserialize;

use crate::error::{RegistratorError, Result};

#[derive(Debug, Default, Deserialize)]
struct ProfileStatus {
    #[serde(default)]
    registrations: RegistrationList,
}

#[derive(Debug, Default, Deserialize)]
struct RegistrationList {
    #[serde(rename = "registration", default)]
    entries: Vec<SofiaRegistration>,
}

/// One `<registration>` element of a profile status listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SofiaRegistration {
    #[serde(rename = "call-id", default)]
    pub call_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub host: String,
    #[serde(rename = "network-ip", default)]
    pub network_ip: String,
    #[serde(rename = "network-port", default)]
    pub network_port: String,
}

/// Decode a status response body into its registration entries.
///
/// FreeSWITCH declares these documents ISO-8859-1; they are widened to UTF-8 first.
pub fn parse_profile_registrations(body: &[u8]) -> Result<Vec<SofiaRegistration>> {
    let text = decode_body(body);
    let trimmed = text.trim();

    if trimmed.starts_with("-ERR") {
        return Err(RegistratorError::protocol(format!("sofia status query failed: {}", trimmed)));
    }
    if !trimmed.starts_with('<') {
        return Err(RegistratorError::protocol(format!(
            "unexpected sofia status response: {}",
            trimmed.lines().next().unwrap_or_default()
        )));
    }

    let status: ProfileStatus = quick_xml::de::from_str(strip_declaration(trimmed))?;
    Ok(status.registrations.entries)
}

fn decode_body(body: &[u8]) -> String {
    let head = String::from_utf8_lossy(&body[..body.len().min(100)]).to_ascii_lowercase();
    if head.contains("iso-8859-1") {
        body.iter().map(|&b| b as char).collect()
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

fn strip_declaration(xml: &str) -> &str {
    if xml.starts_with("<?xml") {
        if let Some(end) = xml.find("?>") {
            return xml[end + 2..].trim_start();
        }
    }
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_REGISTRATIONS: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<profile>
  <registrations>
    <registration>
        <call-id>5c3e8a5a-1d5d-4c6f</call-id>
        <user>1000@sip.testserver.tld</user>
        <contact>&quot;1000&quot; &lt;sip:1000@127.0.0.1:49201&gt;</contact>
        <agent>sipsak 0.9.6</agent>
        <status>Registered(UDP)(unknown) EXP(2016-08-05 04:17:51) EXPSECS(3599)</status>
        <ping-status>Reachable</ping-status>
        <ping-time>0.00</ping-time>
        <host>6ff0e1f477a1</host>
        <network-ip>192.168.99.1</network-ip>
        <network-port>49201</network-port>
        <sip-auth-user>1000</sip-auth-user>
        <sip-auth-realm>sip.testserver.tld</sip-auth-realm>
        <mwi-account>1000@sip.testserver.tld</mwi-account>
    </registration>
    <registration>
        <call-id>77aa</call-id>
        <user>1001@sip.testserver.tld</user>
        <contact>sip:1001@127.0.0.1:49202</contact>
        <agent>sipsak 0.9.6</agent>
        <status>Registered(UDP)</status>
        <host>6ff0e1f477a1</host>
        <network-ip>192.168.99.1</network-ip>
        <network-port>49202</network-port>
    </registration>
  </registrations>
</profile>
"#;

    #[test]
    fn test_parse_registrations() {
        let entries = parse_profile_registrations(TWO_REGISTRATIONS.as_bytes()).unwrap();
        let users: Vec<&str> = entries.iter().map(|e| e.user.as_str()).collect();
        assert_eq!(users, vec!["1000@sip.testserver.tld", "1001@sip.testserver.tld"]);
        assert_eq!(entries[0].contact, "\"1000\" <sip:1000@127.0.0.1:49201>");
        assert_eq!(entries[0].network_port, "49201");
        assert_eq!(entries[1].call_id, "77aa");
    }

    #[test]
    fn test_parse_empty_profile() {
        let body = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<profile>\n  <registrations>\n  </registrations>\n</profile>\n";
        assert!(parse_profile_registrations(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_latin1_body_is_widened() {
        let mut body = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<profile><registrations><registration><user>ren".to_vec();
        body.push(0xE9);
        body.extend_from_slice(b"@sip.example.com</user></registration></registrations></profile>");

        let entries = parse_profile_registrations(&body).unwrap();
        assert_eq!(entries[0].user, "ren\u{e9}@sip.example.com");
    }

    #[test]
    fn test_error_responses_are_protocol_violations() {
        let err = parse_profile_registrations(b"-ERR Command not found!\n").unwrap_err();
        assert!(matches!(err, RegistratorError::ProtocolViolation { .. }));

        let err = parse_profile_registrations(b"Invalid Profile!\n").unwrap_err();
        assert!(matches!(err, RegistratorError::ProtocolViolation { .. }));
    }
}
