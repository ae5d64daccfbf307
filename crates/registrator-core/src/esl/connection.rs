//! Inbound ESL client over TCP

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

use super::event::SUBSCRIBE_COMMAND;
use super::status::parse_profile_registrations;
use super::{EslMessage, EventHeaders, RegistrationSource, SwitchEvents};
use crate::error::{RegistratorError, Result};
use crate::kv::with_timeout;

const AUTH_REQUEST: &str = "auth/request";
const API_RESPONSE: &str = "api/response";
const EVENT_JSON: &str = "text/event-json";
const DISCONNECT_NOTICE: &str = "text/disconnect-notice";

/// Largest body accepted from the switch
pub const MAX_BODY_LEN: usize = 8 * 1024 * 1024;

/// One authenticated event-socket connection to a FreeSWITCH instance
pub struct EslConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: String,
    request_timeout: Duration,
}

impl EslConnection {
    /// Connect and authenticate. Both steps are bounded by `request_timeout`.
    pub async fn connect(host: &str, port: u16, password: &str, request_timeout: Duration) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        info!("Opening FreeSWITCH ESL connection to {}", peer);

        let stream = with_timeout("esl connect", request_timeout, async {
            TcpStream::connect((host, port)).await.map_err(RegistratorError::from)
        })
        .await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut connection = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
            request_timeout,
        };
        with_timeout("esl auth", request_timeout, connection.authenticate(password)).await?;
        info!("FreeSWITCH ESL connection to {} established", connection.peer);
        Ok(connection)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        let greeting = self.read_message().await?;
        if greeting.content_type() != Some(AUTH_REQUEST) {
            return Err(RegistratorError::protocol(format!(
                "expected '{}' from {}, got '{}'",
                AUTH_REQUEST,
                self.peer,
                greeting.content_type().unwrap_or_default()
            )));
        }

        self.send_command(&format!("auth {}", password)).await?;
        let reply = self.read_message().await?;
        match reply.reply_text() {
            Some(text) if text.starts_with("+OK") => Ok(()),
            other => Err(RegistratorError::protocol(format!(
                "authentication rejected by {}: {}",
                self.peer,
                other.unwrap_or("no reply text")
            ))),
        }
    }

    /// Write one command, terminated by the blank line ESL expects
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!("esl -> {}", command.split_whitespace().next().unwrap_or_default());
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read one framed message: headers up to a blank line, then `Content-Length` body bytes
    pub async fn read_message(&mut self) -> Result<EslMessage> {
        let mut message = EslMessage::default();
        let mut line = String::new();

        loop {
            line.clear();
            let read = self.reader.read_line(&mut line).await?;
            if read == 0 {
                return Err(RegistratorError::ConnectionClosed {
                    peer: self.peer.clone(),
                });
            }
            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                if message.headers.is_empty() {
                    continue;
                }
                break;
            }
            match header.split_once(':') {
                Some((name, value)) => {
                    message.headers.insert(name.trim().to_string(), value.trim().to_string());
                }
                None => {
                    return Err(RegistratorError::protocol(format!("malformed ESL header line '{}'", header)));
                }
            }
        }

        if let Some(length) = message.header("Content-Length") {
            let length: usize = length
                .parse()
                .map_err(|_| RegistratorError::protocol(format!("invalid Content-Length '{}'", length)))?;
            if length > MAX_BODY_LEN {
                return Err(RegistratorError::protocol(format!(
                    "Content-Length {} from {} exceeds {} bytes",
                    length, self.peer, MAX_BODY_LEN
                )));
            }
            let mut body = vec![0u8; length];
            self.reader.read_exact(&mut body).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    RegistratorError::ConnectionClosed {
                        peer: self.peer.clone(),
                    }
                } else {
                    RegistratorError::Io(e)
                }
            })?;
            message.body = body;
        }

        if message.content_type() == Some(DISCONNECT_NOTICE) {
            return Err(RegistratorError::ConnectionClosed {
                peer: self.peer.clone(),
            });
        }
        Ok(message)
    }

    /// Send a command and return the first reply carrying `content_type`
    async fn request(&mut self, command: &str, content_type: &str) -> Result<EslMessage> {
        self.send_command(command).await?;
        loop {
            let message = self.read_message().await?;
            if message.content_type() == Some(content_type) {
                return Ok(message);
            }
            debug!(
                "Skipping '{}' message from {} while awaiting '{}'",
                message.content_type().unwrap_or_default(),
                self.peer,
                content_type
            );
        }
    }

    /// Run an `api` command and return the response body
    pub async fn api(&mut self, command: &str) -> Result<Vec<u8>> {
        let limit = self.request_timeout;
        let reply = with_timeout("esl api", limit, self.request(&format!("api {}", command), API_RESPONSE)).await?;
        Ok(reply.body)
    }
}

/// Decode a `text/event-json` body into a flat field map
pub fn decode_event_json(body: &[u8]) -> Result<EventHeaders> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RegistratorError::transient("empty event body"));
    }
    let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body).map_err(|e| {
        if e.is_eof() {
            RegistratorError::transient(format!("truncated event body: {}", e))
        } else {
            RegistratorError::protocol(format!("undecodable event body: {}", e))
        }
    })?;

    Ok(fields
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect::<HashMap<_, _>>())
}

#[async_trait]
impl SwitchEvents for EslConnection {
    async fn subscribe_registration_events(&mut self) -> Result<EslMessage> {
        self.send_command(SUBSCRIBE_COMMAND).await?;
        self.read_message().await
    }

    async fn next_event(&mut self) -> Result<EventHeaders> {
        loop {
            let message = self.read_message().await?;
            if message.content_type() == Some(EVENT_JSON) {
                return decode_event_json(&message.body);
            }
            debug!(
                "Ignoring '{}' message from {}",
                message.content_type().unwrap_or_default(),
                self.peer
            );
        }
    }
}

#[async_trait]
impl RegistrationSource for EslConnection {
    async fn registered_users(&mut self, profiles: &[String]) -> Result<Vec<String>> {
        let mut users: Vec<String> = Vec::new();
        for profile in profiles {
            debug!("Fetching registrations for sofia profile '{}'", profile);
            let body = self.api(&format!("sofia xmlstatus profile {} reg", profile)).await?;
            for registration in parse_profile_registrations(&body)? {
                if !registration.user.is_empty() && !users.contains(&registration.user) {
                    users.push(registration.user);
                }
            }
        }
        Ok(users)
    }
}
