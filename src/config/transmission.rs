use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{LoggingConfig, ServerProfile, config_dir, load_json, resolve_path, seconds};
use crate::delivery::{
    BackupSettings, DeliverySettings, Downlink, FlushFailurePolicy, FlushSettings, RetryPolicy,
};
use crate::device::DeviceIdentifier;
use crate::error::ConfigError;
use crate::gateway::{GatewayCredentials, HttpClientOptions, HttpTimeouts};
use crate::protocol::{CONFIGURATION_UPLINK_INTERVAL, EncodedPayload};
use crate::store::{DownlinkStore, DuplicatePolicy};

pub const DEFAULT_USERNAME: &str = "apiuser";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub connect: f64,

    pub read: f64,

    pub write: f64,

    pub pool: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: 5.0,
            read: 5.0,
            write: 5.0,
            pool: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ClientConfig {
    pub timeouts: TimeoutConfig,

    pub insecure: bool,

    pub enable_env_vars: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            insecure: false,
            enable_env_vars: true,
        }
    }
}

impl ClientConfig {
    pub fn options(&self) -> Result<HttpClientOptions, ConfigError> {
        let t = &self.timeouts;
        Ok(HttpClientOptions {
            timeouts: HttpTimeouts {
                connect: seconds("client.timeouts.connect", t.connect)?,
                read: seconds("client.timeouts.read", t.read)?,
                write: seconds("client.timeouts.write", t.write)?,
                pool: seconds("client.timeouts.pool", t.pool)?,
            },
            insecure: self.insecure,
            enable_env_vars: self.enable_env_vars,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,

    /// Seconds.
    pub initial_delay: f64,

    /// Seconds.
    pub max_delay: f64,

    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: 1.0,
            max_delay: 30.0,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy, ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "delivery.retry.multiplier must be at least 1, got {}",
                self.multiplier
            )));
        }

        Ok(RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: seconds("delivery.retry.initialDelay", self.initial_delay)?,
            max_delay: seconds("delivery.retry.maxDelay", self.max_delay)?,
            multiplier: self.multiplier,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DeliveryConfig {
    pub workers: usize,

    pub max_polls: u32,

    /// Seconds between confirmation polls.
    pub uplink_frequency: f64,

    pub retry: RetryConfig,

    pub flush_failure_policy: FlushFailurePolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_polls: 10,
            uplink_frequency: f64::from(CONFIGURATION_UPLINK_INTERVAL),
            retry: RetryConfig::default(),
            flush_failure_policy: FlushFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GatewayAddress {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default)]
    pub scheme: Scheme,
}

impl GatewayAddress {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(ServerProfile::Ug6x.default_port())
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}/api", self.scheme, self.host, self.port())
    }

    /// `host:port`, used in logs, reports and backup paths.
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CredentialsConfig {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_owned()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: None,
            password_env: None,
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("password_env", &self.password_env)
            .finish()
    }
}

impl CredentialsConfig {
    /// An inline password wins over `passwordEnv`, which is only read when
    /// environment variables are enabled.
    pub fn resolve(
        &self,
        enable_env_vars: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<GatewayCredentials, ConfigError> {
        let password = match (&self.password, &self.password_env) {
            (Some(password), _) => password.clone(),
            (None, Some(var)) if enable_env_vars => env(var).ok_or_else(|| {
                ConfigError::Invalid(format!("environment variable {var} is not set"))
            })?,
            (None, Some(var)) => {
                return Err(ConfigError::Invalid(format!(
                    "password comes from {var} but client.enableEnvVars is false"
                )));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(format!(
                    "no password configured for {:?}",
                    self.username
                )));
            }
        };

        Ok(GatewayCredentials {
            username: self.username.clone(),
            password,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DownlinkSettingsConfig {
    pub fport: u8,

    #[serde(default = "yes")]
    pub confirmed: bool,

    #[serde(default)]
    pub flush_queue: FlushSettings,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GatewayConfig {
    pub address: GatewayAddress,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub backup: BackupSettings,

    pub downlink_settings: DownlinkSettingsConfig,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub downlinks: IndexMap<DeviceIdentifier, Vec<String>>,

    /// A generated-downlinks file; inline `downlinks` entries override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downlinks_file: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn hex_downlinks(&self) -> Result<IndexMap<DeviceIdentifier, Vec<String>>, ConfigError> {
        let mut downlinks: IndexMap<DeviceIdentifier, Vec<String>> = match &self.downlinks_file {
            Some(path) => load_json(path)?,
            None => IndexMap::new(),
        };
        downlinks.extend(self.downlinks.iter().map(|(k, v)| (*k, v.clone())));

        Ok(downlinks)
    }

    pub fn downlink_store(&self, policy: DuplicatePolicy) -> Result<DownlinkStore, ConfigError> {
        let settings = &self.downlink_settings;
        let store = DownlinkStore::new(policy);

        for (deveui, fragments) in self.hex_downlinks()? {
            if fragments.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "downlinks for {deveui}: no fragments to send"
                )));
            }
            let payload = EncodedPayload::from_hex(settings.fport, &fragments)
                .map_err(|e| ConfigError::Invalid(format!("downlinks for {deveui}: {e}")))?;
            store
                .insert(Downlink::new(deveui, payload, settings.confirmed))
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        Ok(store)
    }
}

/// One gateway with everything resolved that delivery needs.
#[derive(Debug)]
pub struct PreparedGateway {
    pub label: String,

    pub base_url: String,

    pub credentials: GatewayCredentials,

    pub store: DownlinkStore,

    pub settings: DeliverySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransmissionConfig {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub gateways: Vec<GatewayConfig>,
}

impl TransmissionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config: Self = load_json(path)?;
        config.resolve_paths(&config_dir(path));
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(dir) = &mut self.backup_dir {
            *dir = resolve_path(base, dir);
        }
        if let Some(dir) = &mut self.logging.logs_directory {
            *dir = resolve_path(base, dir);
        }
        for gateway in &mut self.gateways {
            if let Some(file) = &mut gateway.downlinks_file {
                *file = resolve_path(base, file);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateways.is_empty() {
            return Err(ConfigError::Invalid("no gateways configured".into()));
        }
        if self.delivery.workers == 0 {
            return Err(ConfigError::Invalid("delivery.workers must be at least 1".into()));
        }
        if self.delivery.max_polls == 0 {
            return Err(ConfigError::Invalid("delivery.maxPolls must be at least 1".into()));
        }
        self.client.options()?;
        self.delivery.retry.policy()?;
        seconds("delivery.uplinkFrequency", self.delivery.uplink_frequency)?;

        for gateway in &self.gateways {
            if gateway.backup.any() && self.backup_dir.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "gateway {} requests backups but backupDir is not set",
                    gateway.address.label()
                )));
            }
            if !(1..=223).contains(&gateway.downlink_settings.fport) {
                return Err(ConfigError::Invalid(format!(
                    "gateway {}: fport {} is outside 1..=223",
                    gateway.address.label(),
                    gateway.downlink_settings.fport
                )));
            }
        }

        Ok(())
    }

    /// Resolves credentials, downlinks and settings of every gateway.
    ///
    /// Fails on the first gateway that cannot be prepared, so a bad entry
    /// stops the run before any gateway is contacted.
    pub fn prepare(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<PreparedGateway>, ConfigError> {
        self.gateways
            .iter()
            .map(|gateway| {
                let label = gateway.address.label();
                self.prepare_gateway(gateway, &env)
                    .map_err(|source| ConfigError::Gateway {
                        label,
                        source: Box::new(source),
                    })
            })
            .collect()
    }

    fn prepare_gateway(
        &self,
        gateway: &GatewayConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<PreparedGateway, ConfigError> {
        Ok(PreparedGateway {
            label: gateway.address.label(),
            base_url: gateway.address.base_url(),
            credentials: gateway.credentials.resolve(self.client.enable_env_vars, env)?,
            store: gateway.downlink_store(DuplicatePolicy::Replace)?,
            settings: self.delivery_settings(gateway)?,
        })
    }

    pub fn delivery_settings(&self, gateway: &GatewayConfig) -> Result<DeliverySettings, ConfigError> {
        Ok(DeliverySettings {
            workers: self.delivery.workers,
            max_polls: self.delivery.max_polls,
            poll_interval: seconds("delivery.uplinkFrequency", self.delivery.uplink_frequency)?,
            retry: self.delivery.retry.policy()?,
            flush_failure_policy: self.delivery.flush_failure_policy,
            flush: gateway.downlink_settings.flush_queue,
            backup: gateway.backup,
        })
    }
}
