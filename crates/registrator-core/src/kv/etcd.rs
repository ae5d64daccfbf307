//! etcd backend, speaking the v2 keys API over HTTP

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{key_with_prefix, strip_key_prefix, KvConfig, KvStore};
use crate::error::{RegistratorError, Result};

/// etcd "Key not found"
const ETCD_KEY_NOT_FOUND: u64 = 100;

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: Option<EtcdNode>,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

#[derive(Debug, Deserialize)]
struct EtcdErrorBody {
    #[serde(rename = "errorCode")]
    error_code: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: Option<String>,
}

/// etcd v2 K/V backend
#[derive(Debug, Clone)]
pub struct EtcdStore {
    client: Client,
    endpoint: String,
    base: Url,
    prefix: String,
}

impl EtcdStore {
    pub const NAME: &'static str = "etcd";

    pub fn new(config: &KvConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let endpoint = format!("http://{}:{}", config.host, config.port);
        let base = Url::parse(&endpoint)
            .map_err(|e| RegistratorError::config(format!("invalid etcd endpoint '{}': {}", endpoint, e)))?;
        Ok(Self {
            client,
            endpoint,
            base,
            prefix: config.prefix.clone(),
        })
    }

    /// Registry constructor
    pub fn construct(config: &KvConfig) -> Result<Arc<dyn KvStore>> {
        Ok(Arc::new(Self::new(config)?))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Keys are opaque, so every path segment is percent-encoded.
    fn url(&self, key: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RegistratorError::backend_io(format!("etcd endpoint '{}' cannot carry a path", self.endpoint)))?
            .clear()
            .extend(["v2", "keys"])
            .extend(key_with_prefix(&self.prefix, key).split('/'));
        Ok(url)
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    fn backend_name(&self) -> &str {
        Self::NAME
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn read(&self, key: &str, recursive: bool) -> Result<HashMap<String, String>> {
        let url = self.url(key)?;
        debug!("etcd.read(): GET {} (recursive: {})", url, recursive);
        let response = self
            .client
            .get(url)
            .query(&[("recursive", recursive)])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        parse_read_response(&self.prefix, status, &body)
    }

    async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let url = self.url(key)?;
        debug!("etcd.write(): PUT {} (ttl: {}s)", url, ttl.as_secs());
        let mut form = vec![("value", value.to_string())];
        if !ttl.is_zero() {
            form.push(("ttl", ttl.as_secs().to_string()));
        }
        let response = self.client.put(url).form(&form).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Err(error_from_body(status, &body))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.url(key)?;
        debug!("etcd.delete(): DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        match error_from_body(status, &body) {
            RegistratorError::KeyNotFound { .. } => Ok(()),
            err => Err(err),
        }
    }
}

fn parse_read_response(prefix: &str, status: StatusCode, body: &str) -> Result<HashMap<String, String>> {
    if !status.is_success() {
        return Err(error_from_body(status, body));
    }

    let response: EtcdResponse = serde_json::from_str(body)
        .map_err(|e| RegistratorError::backend_io(format!("unreadable etcd response: {}", e)))?;
    let node = response
        .node
        .ok_or_else(|| RegistratorError::backend_io("etcd response carries no node"))?;

    let mut result = HashMap::new();
    if !node.dir {
        result.insert(strip_key_prefix(prefix, &node.key), node.value.unwrap_or_default());
        return Ok(result);
    }

    for child in node.nodes {
        if child.dir {
            return Err(RegistratorError::UnsupportedNestedKey {
                key: strip_key_prefix(prefix, &child.key),
            });
        }
        result.insert(strip_key_prefix(prefix, &child.key), child.value.unwrap_or_default());
    }
    Ok(result)
}

fn error_from_body(status: StatusCode, body: &str) -> RegistratorError {
    match serde_json::from_str::<EtcdErrorBody>(body) {
        Ok(err) if err.error_code == ETCD_KEY_NOT_FOUND => {
            RegistratorError::key_not_found(err.cause.unwrap_or_default())
        }
        Ok(err) => RegistratorError::backend_io(format!(
            "etcd error {} ({}): {}",
            err.error_code,
            status,
            err.message
        )),
        Err(_) => RegistratorError::backend_io(format!("etcd returned {}: {}", status, body.trim())),
    }
}
