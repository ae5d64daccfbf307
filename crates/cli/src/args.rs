//! Command line flags, each with an environment fallback

use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use registrator_core::config::{parse_profiles, validate_port};
use registrator_core::{KvConfig, RegistrationValue, RegistratorConfig, RegistratorError, SwitchConfig};

/// Numeric flags are parsed wider than their final type so that out-of-range
/// values reach validation and get a rule-specific message.
#[derive(Parser, Debug, Clone)]
#[command(name = "fs-registrator")]
#[command(about = "FreeSWITCH Sofia-SIP registry bridge (sync to key/value store)")]
#[command(version)]
pub struct Args {
    /// FreeSWITCH event socket host
    #[arg(long, env = "FS_HOST", default_value = "localhost")]
    pub fshost: String,

    /// FreeSWITCH event socket port
    #[arg(long, env = "FS_PORT", default_value_t = 8021)]
    pub fsport: u32,

    /// FreeSWITCH event socket password
    #[arg(long, env = "FS_PASSWORD", default_value = "ClueCon", hide_env_values = true)]
    pub fspassword: String,

    /// Comma separated sofia profiles to sync
    #[arg(long, env = "FS_PROFILES", default_value = "internal")]
    pub fsprofiles: String,

    /// Host advertised for registrations on this instance
    #[arg(long, env = "FS_ADVERTISE_IP", default_value = "")]
    pub fsadvertiseip: String,

    /// Port advertised for registrations on this instance
    #[arg(long, env = "FS_ADVERTISE_PORT")]
    pub fsadvertiseport: Option<u32>,

    /// K/V backend
    #[arg(long, env = "KV_BACKEND", default_value = "etcd")]
    pub kvbackend: String,

    /// K/V store host
    #[arg(long, env = "KV_HOST", default_value = "etcd")]
    pub kvhost: String,

    /// K/V store port
    #[arg(long, env = "KV_PORT", default_value_t = 2379)]
    pub kvport: u32,

    /// Key prefix for every registration record
    #[arg(long, env = "KV_PREFIX", default_value = "fs_registrations")]
    pub kvprefix: String,

    /// Seconds between full syncs
    #[arg(long, env = "SYNC_INTERVAL", default_value_t = 3600)]
    pub syncinterval: u64,

    /// Lease in seconds on every registration record
    #[arg(long = "registration-ttl", env = "REGISTRATION_TTL", default_value_t = 300)]
    pub registration_ttl: u64,

    /// Timeout in seconds for each store and switch request
    #[arg(long = "request-timeout", env = "REQUEST_TIMEOUT", default_value_t = 5)]
    pub request_timeout: u64,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long = "log-json", env = "LOG_JSON")]
    pub log_json: bool,
}

/// Process exit code for a flag parsing failure. Help and version output are not failures.
pub fn parse_error_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

impl Args {
    /// Build and validate the runtime configuration
    pub fn to_config(&self) -> Result<RegistratorConfig, RegistratorError> {
        let advertise_port = match self.fsadvertiseport {
            Some(port) => validate_port("fsadvertiseport", u64::from(port))?,
            None => return Err(RegistratorError::config("--fsadvertiseport is required")),
        };
        let request_timeout = Duration::from_secs(self.request_timeout);

        let switch = SwitchConfig {
            host: self.fshost.clone(),
            port: validate_port("fsport", u64::from(self.fsport))?,
            password: self.fspassword.clone(),
            profiles: parse_profiles(&self.fsprofiles),
        };
        let kv = KvConfig {
            backend: self.kvbackend.clone(),
            host: self.kvhost.clone(),
            port: validate_port("kvport", u64::from(self.kvport))?,
            prefix: self.kvprefix.clone(),
            request_timeout,
        };
        let advertise = RegistrationValue::new(self.fsadvertiseip.clone(), advertise_port);

        let mut config = RegistratorConfig::new(switch, advertise, kv);
        config.sync_interval = Duration::from_secs(self.syncinterval);
        config.registration_ttl = Duration::from_secs(self.registration_ttl);
        config.request_timeout = request_timeout;
        config.validate()?;
        Ok(config)
    }
}
