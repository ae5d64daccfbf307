//! Live registration event watcher
//!
//! Subscribes to sofia register/unregister/expire events and applies each one to
//! the K/V store as it arrives: a register upserts the key with this instance's
//! advertise identity and a lease, the other two delete it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::esl::{parse_registration_event, validate_subscription_reply, RegistrationEvent, RegistrationEventKind, SwitchEvents};
use crate::kv::{with_timeout, KvStore};
use crate::types::RegistrationValue;

/// Watcher settings
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Value written for every registration seen on this instance
    pub advertise: RegistrationValue,
    /// Lease attached to each write
    pub ttl: Duration,
    /// Bound for the subscription round-trip and each store operation
    pub request_timeout: Duration,
    /// Stop after this many events. The subscription acknowledgement counts as the
    /// first one. `None` runs until the stream ends.
    pub max_events: Option<u64>,
}

impl WatcherConfig {
    pub fn new(advertise: RegistrationValue) -> Self {
        Self {
            advertise,
            ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
            max_events: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Unsubscribed,
    Subscribed,
    Streaming,
    Terminated,
}

/// Counters for a finished watcher run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherReport {
    /// Events observed, subscription acknowledgement included
    pub events: u64,
    pub registered: u64,
    pub unregistered: u64,
    /// Transient read errors skipped
    pub skipped: u64,
}

pub struct RegistrationWatcher<S> {
    source: S,
    kv: Arc<dyn KvStore>,
    config: WatcherConfig,
    state: watch::Sender<WatcherState>,
    cancel: CancellationToken,
    report: WatcherReport,
}

impl<S: SwitchEvents> RegistrationWatcher<S> {
    pub fn new(source: S, kv: Arc<dyn KvStore>, config: WatcherConfig) -> Self {
        Self {
            source,
            kv,
            config,
            state: watch::Sender::new(WatcherState::Unsubscribed),
            cancel: CancellationToken::new(),
            report: WatcherReport::default(),
        }
    }

    /// Stop streaming when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Follow state transitions, including the final `Terminated` after `run` returns
    pub fn state_changes(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    fn transition(&self, next: WatcherState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("watcher: {:?} -> {:?}", previous, next);
        }
    }

    /// Subscribe, then stream events until the stream ends, a fatal error occurs,
    /// the event bound is reached, or the watcher is cancelled.
    #[instrument(name = "watcher", skip_all)]
    pub async fn run(mut self) -> Result<WatcherReport> {
        info!("watcher: starting");
        let result = self.stream().await;
        self.transition(WatcherState::Terminated);
        match &result {
            Ok(report) => info!("watcher: finished after {} events", report.events),
            Err(e) => error!("watcher: terminated: {}", e),
        }
        result
    }

    /// `Unsubscribed -> Subscribed`. A bad acknowledgement never reaches `Streaming`.
    pub async fn subscribe(&mut self) -> Result<()> {
        let reply = with_timeout(
            "subscribe",
            self.config.request_timeout,
            self.source.subscribe_registration_events(),
        )
        .await?;
        validate_subscription_reply(&reply)?;
        self.transition(WatcherState::Subscribed);
        Ok(())
    }

    async fn stream(&mut self) -> Result<WatcherReport> {
        if let Some(max) = self.config.max_events {
            info!("watcher: test mode enabled, max events {}", max);
        }
        self.subscribe().await?;
        self.report.events += 1;
        if self.limit_reached() {
            info!("watcher: max events reached by subscription acknowledgement");
            return Ok(self.report.clone());
        }

        self.transition(WatcherState::Streaming);
        info!("watcher: streaming registration events");
        let value = self.config.advertise.to_json()?;

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("watcher: cancelled");
                    break;
                }
                next = self.source.next_event() => next,
            };

            let headers = match next {
                Ok(headers) => headers,
                Err(e) if e.is_transient() => {
                    warn!("watcher: (ignored) error while reading event: {}", e);
                    self.report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let event = parse_registration_event(&headers)?;
            debug!("watcher: event {} for {}", event.kind, event.key);
            self.apply(&event, &value).await?;

            self.report.events += 1;
            if self.limit_reached() {
                info!("watcher: max events of {} reached", self.report.events);
                break;
            }
        }
        Ok(self.report.clone())
    }

    async fn apply(&mut self, event: &RegistrationEvent, value: &str) -> Result<()> {
        let limit = self.config.request_timeout;
        match event.kind {
            RegistrationEventKind::Register => {
                with_timeout("write", limit, self.kv.write(event.key.as_str(), value, self.config.ttl)).await?;
                self.report.registered += 1;
            }
            RegistrationEventKind::Unregister | RegistrationEventKind::Expire => {
                with_timeout("delete", limit, self.kv.delete(event.key.as_str())).await?;
                self.report.unregistered += 1;
            }
        }
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.config.max_events.is_some_and(|max| self.report.events >= max)
    }
}
