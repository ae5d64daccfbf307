//! Runs the watcher and the syncer side by side against one shared store

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RegistratorConfig;
use crate::error::{RegistratorError, Result};
use crate::esl::{RegistrationSource, SwitchEvents};
use crate::kv::KvStore;
use crate::syncer::{RegistrationSyncer, SyncConfig, SyncReport};
use crate::watcher::{RegistrationWatcher, WatcherConfig, WatcherReport};

/// What to do with the surviving loop when the other one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisionPolicy {
    /// Cancel the other loop and let the process wind down
    #[default]
    StopAll,
    /// Keep the other loop running
    Isolate,
}

/// How each loop ended
#[derive(Debug)]
pub struct RegistratorReport {
    pub watcher: Result<WatcherReport>,
    pub syncer: Result<SyncReport>,
}

impl RegistratorReport {
    pub fn is_success(&self) -> bool {
        self.watcher.is_ok() && self.syncer.is_ok()
    }

    /// The first loop failure, watcher first
    pub fn into_result(self) -> Result<(WatcherReport, SyncReport)> {
        Ok((self.watcher?, self.syncer?))
    }
}

pub struct Registrator {
    kv: Arc<dyn KvStore>,
    watcher_config: WatcherConfig,
    sync_config: SyncConfig,
    policy: SupervisionPolicy,
    cancel: CancellationToken,
}

impl Registrator {
    pub fn new(kv: Arc<dyn KvStore>, watcher_config: WatcherConfig, sync_config: SyncConfig) -> Self {
        Self {
            kv,
            watcher_config,
            sync_config,
            policy: SupervisionPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &RegistratorConfig, kv: Arc<dyn KvStore>) -> Self {
        Self::new(kv, config.watcher_config(), config.sync_config())
    }

    pub fn with_policy(mut self, policy: SupervisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cancelling this token stops both loops
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Spawn both loops, each with its own switch connection, and wait for both
    pub async fn run<W, S>(self, events: W, inventory: S) -> RegistratorReport
    where
        W: SwitchEvents + 'static,
        S: RegistrationSource + 'static,
    {
        info!(
            "Starting registrator (K/V backend '{}', prefix '{}')",
            self.kv.backend_name(),
            self.kv.prefix()
        );

        let watcher = RegistrationWatcher::new(events, self.kv.clone(), self.watcher_config)
            .with_cancellation(self.cancel.child_token());
        let syncer = RegistrationSyncer::new(inventory, self.kv.clone(), self.sync_config)
            .with_cancellation(self.cancel.child_token());

        let watcher_task = tokio::spawn(supervise("watcher", watcher.run(), self.cancel.clone(), self.policy));
        let syncer_task = tokio::spawn(supervise("syncer", syncer.run(), self.cancel.clone(), self.policy));

        let (watcher, syncer) = tokio::join!(watcher_task, syncer_task);
        let report = RegistratorReport {
            watcher: flatten("watcher", watcher),
            syncer: flatten("syncer", syncer),
        };
        info!("Registrator finished (success: {})", report.is_success());
        report
    }
}

async fn supervise<T, F>(name: &'static str, task: F, cancel: CancellationToken, policy: SupervisionPolicy) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let result = task.await;
    if let Err(e) = &result {
        error!("{} loop failed: {}", name, e);
        if policy == SupervisionPolicy::StopAll {
            info!("Stopping remaining loops after {} failure", name);
            cancel.cancel();
        }
    }
    result
}

fn flatten<T>(name: &str, joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.map_err(|e| RegistratorError::TaskFailed {
        task: name.to_string(),
        message: e.to_string(),
    })?
}
