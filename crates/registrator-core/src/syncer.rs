//! Periodic full reconciliation
//!
//! Each pass pulls the switch's full inventory and the store's last snapshot,
//! keeps only the entries this instance advertised, and applies the delta.
//! It corrects whatever drift lost events left behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::esl::RegistrationSource;
use crate::kv::{with_timeout, KvStore};
use crate::reconcile::reconcile;
use crate::types::{RegistrationValue, Registrations};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Repeat every `interval` until cancelled
    Periodic,
    /// Run a single pass and return
    Once,
}

/// Syncer settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub profiles: Vec<String>,
    pub advertise: RegistrationValue,
    pub ttl: Duration,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub mode: SyncMode,
}

impl SyncConfig {
    pub fn new(profiles: Vec<String>, advertise: RegistrationValue) -> Self {
        Self {
            profiles,
            advertise,
            ttl: Duration::from_secs(300),
            interval: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(5),
            mode: SyncMode::Periodic,
        }
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Registrations the switch reported
    pub current: usize,
    pub added: usize,
    pub removed: usize,
    /// Still-live registrations whose lease was renewed
    pub refreshed: usize,
    /// Individual writes or deletes that failed; retried by the next pass
    pub failed: usize,
}

/// Summary of a finished syncer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub passes: u64,
    pub last: Option<SyncOutcome>,
}

pub struct RegistrationSyncer<S> {
    source: S,
    kv: Arc<dyn KvStore>,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl<S: RegistrationSource> RegistrationSyncer<S> {
    pub fn new(source: S, kv: Arc<dyn KvStore>, config: SyncConfig) -> Self {
        Self {
            source,
            kv,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between passes when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run passes until cancelled (or once, in [`SyncMode::Once`]).
    ///
    /// A pass that cannot read the switch or the store, or finds an undecodable
    /// stored value, ends the run with that error.
    #[instrument(name = "syncer", skip_all)]
    pub async fn run(mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        loop {
            info!("syncer: starting pass");
            let outcome = match self.sync_once().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("syncer: pass failed: {}", e);
                    return Err(e);
                }
            };
            report.passes += 1;
            report.last = Some(outcome);

            if self.config.mode == SyncMode::Once {
                info!("syncer: once off mode enabled, finished");
                return Ok(report);
            }

            info!("syncer: finished, sleeping for {} seconds", self.config.interval.as_secs());
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("syncer: cancelled");
                    return Ok(report);
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// One full reconciliation pass
    pub async fn sync_once(&mut self) -> Result<SyncOutcome> {
        let limit = self.config.request_timeout;
        let advertise = &self.config.advertise;

        let users = self.source.registered_users(&self.config.profiles).await?;
        let current = Registrations::from_users(users.as_slice(), advertise);
        debug!("syncer: {} registrations on the switch", current.len());

        let raw_last = match with_timeout("read", limit, self.kv.read("", true)).await {
            Ok(entries) => entries,
            Err(e) if e.is_key_not_found() => {
                info!("syncer: no registrations found in K/V backend, clean slate");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        let last = Registrations::from_kv_entries(&raw_last)?.owned_by(advertise);
        debug!(
            "syncer: {} stored registrations, {} owned by {}",
            raw_last.len(),
            last.len(),
            advertise
        );

        let plan = reconcile(&last, &current);
        info!(
            "syncer: add {:?}, remove {:?}, refresh {}",
            plan.add,
            plan.remove,
            plan.unchanged.len()
        );

        let value = advertise.to_json()?;
        let ttl = self.config.ttl;
        let mut outcome = SyncOutcome {
            current: current.len(),
            ..Default::default()
        };

        for key in &plan.add {
            match with_timeout("write", limit, self.kv.write(key.as_str(), &value, ttl)).await {
                Ok(()) => outcome.added += 1,
                Err(e) => {
                    warn!("syncer: failed to add {}: {}", key, e);
                    outcome.failed += 1;
                }
            }
        }
        for key in &plan.unchanged {
            match with_timeout("write", limit, self.kv.write(key.as_str(), &value, ttl)).await {
                Ok(()) => outcome.refreshed += 1,
                Err(e) => {
                    warn!("syncer: failed to refresh {}: {}", key, e);
                    outcome.failed += 1;
                }
            }
        }
        for key in &plan.remove {
            match with_timeout("delete", limit, self.kv.delete(key.as_str())).await {
                Ok(()) => outcome.removed += 1,
                Err(e) => {
                    warn!("syncer: failed to remove {}: {}", key, e);
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }
}
