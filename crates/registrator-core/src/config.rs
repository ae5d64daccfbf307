//! Configuration for the registrator

use std::fmt;
use std::time::Duration;

use crate::error::{RegistratorError, Result};
use crate::kv::{BackendRegistry, KvConfig};
use crate::syncer::{SyncConfig, SyncMode};
use crate::types::RegistrationValue;
use crate::watcher::WatcherConfig;

/// Default lease on every registration record
pub const DEFAULT_REGISTRATION_TTL: Duration = Duration::from_secs(300);
/// Default bound on store and switch round-trips
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Default period between full syncs
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// FreeSWITCH event socket settings
#[derive(Clone, PartialEq, Eq)]
pub struct SwitchConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub profiles: Vec<String>,
}

impl fmt::Debug for SwitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("profiles", &self.profiles)
            .finish()
    }
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8021,
            password: "ClueCon".to_string(),
            profiles: vec!["internal".to_string()],
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistratorConfig {
    pub switch: SwitchConfig,
    /// Location stamped onto every registration this instance owns
    pub advertise: RegistrationValue,
    pub kv: KvConfig,
    pub sync_interval: Duration,
    pub registration_ttl: Duration,
    pub request_timeout: Duration,
}

impl RegistratorConfig {
    pub fn new(switch: SwitchConfig, advertise: RegistrationValue, kv: KvConfig) -> Self {
        Self {
            switch,
            advertise,
            kv,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            registration_ttl: DEFAULT_REGISTRATION_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Check every startup rule, against the global backend registry.
    ///
    /// Returns the first rule violated.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(BackendRegistry::global())
    }

    pub fn validate_with(&self, registry: &BackendRegistry) -> Result<()> {
        for (flag, value) in [
            ("fshost", &self.switch.host),
            ("fspassword", &self.switch.password),
            ("fsadvertiseip", &self.advertise.host),
            ("kvhost", &self.kv.host),
            ("kvprefix", &self.kv.prefix),
        ] {
            if value.trim().is_empty() {
                return Err(RegistratorError::config(format!("--{} must not be empty", flag)));
            }
        }
        if self.switch.profiles.iter().all(|p| p.trim().is_empty()) {
            return Err(RegistratorError::config("--fsprofiles must not be empty"));
        }
        for (flag, port) in [
            ("fsport", self.switch.port),
            ("fsadvertiseport", self.advertise.port),
            ("kvport", self.kv.port),
        ] {
            validate_port(flag, u64::from(port))?;
        }
        if !registry.contains(&self.kv.backend) {
            return Err(RegistratorError::config(format!(
                "--kvbackend must be one of: {}",
                registry.names().join(", ")
            )));
        }
        if self.sync_interval.is_zero() {
            return Err(RegistratorError::config("--syncinterval must be greater than 0"));
        }
        if self.registration_ttl.is_zero() {
            return Err(RegistratorError::config("--registration-ttl must be greater than 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(RegistratorError::config("--request-timeout must be greater than 0"));
        }
        Ok(())
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            advertise: self.advertise.clone(),
            ttl: self.registration_ttl,
            request_timeout: self.request_timeout,
            max_events: None,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            profiles: self.switch.profiles.clone(),
            advertise: self.advertise.clone(),
            ttl: self.registration_ttl,
            interval: self.sync_interval,
            request_timeout: self.request_timeout,
            mode: SyncMode::Periodic,
        }
    }
}

/// Ports must lie in (0, 65536)
pub fn validate_port(flag: &str, value: u64) -> Result<u16> {
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(RegistratorError::config(format!(
            "--{} must be between 1 and 65535 (got {})",
            flag, value
        ))),
    }
}

/// Split a comma separated profile list, dropping blanks
pub fn parse_profiles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegistratorConfig {
        RegistratorConfig::new(
            SwitchConfig::default(),
            RegistrationValue::new("10.20.30.40", 5060),
            KvConfig::default(),
        )
    }

    fn rule(config: &RegistratorConfig) -> String {
        config.validate().unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_empty_strings_are_rejected() {
        let mut config = valid();
        config.switch.host = String::new();
        assert_eq!(rule(&config), "--fshost must not be empty");

        let mut config = valid();
        config.advertise.host = "  ".to_string();
        assert_eq!(rule(&config), "--fsadvertiseip must not be empty");

        let mut config = valid();
        config.kv.prefix = String::new();
        assert_eq!(rule(&config), "--kvprefix must not be empty");

        let mut config = valid();
        config.switch.profiles = vec![String::new()];
        assert_eq!(rule(&config), "--fsprofiles must not be empty");
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let mut config = valid();
        config.advertise.port = 0;
        assert_eq!(rule(&config), "--fsadvertiseport must be between 1 and 65535 (got 0)");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut config = valid();
        config.kv.backend = "consul".to_string();
        assert_eq!(rule(&config), "--kvbackend must be one of: etcd, memory");
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let mut config = valid();
        config.sync_interval = Duration::ZERO;
        assert_eq!(rule(&config), "--syncinterval must be greater than 0");

        let mut config = valid();
        config.registration_ttl = Duration::ZERO;
        assert_eq!(rule(&config), "--registration-ttl must be greater than 0");
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port("kvport", 2379).unwrap(), 2379);
        assert_eq!(validate_port("kvport", 65535).unwrap(), 65535);
        assert!(validate_port("kvport", 0).is_err());
        assert!(validate_port("kvport", 65536).is_err());
    }

    #[test]
    fn test_parse_profiles() {
        assert_eq!(parse_profiles("internal, external,,"), vec!["internal", "external"]);
        assert!(parse_profiles(" , ").is_empty());
    }

    #[test]
    fn test_password_is_redacted() {
        let rendered = format!("{:?}", valid().switch);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("ClueCon"));
    }

    #[test]
    fn test_loop_configs_carry_shared_settings() {
        let mut config = valid();
        config.registration_ttl = Duration::from_secs(120);
        let watcher = config.watcher_config();
        let sync = config.sync_config();
        assert_eq!(watcher.ttl, Duration::from_secs(120));
        assert_eq!(sync.ttl, Duration::from_secs(120));
        assert_eq!(sync.advertise, config.advertise);
        assert_eq!(sync.profiles, vec!["internal".to_string()]);
        assert_eq!(sync.mode, SyncMode::Periodic);
        assert_eq!(watcher.max_events, None);
    }
}
