use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaltiError};

pub const DEFAULT_API_URL: &str = "https://api.walti.io";
pub const DEFAULT_CONSOLE_URL: &str = "https://console.walti.io";

/// Top-level configuration from `.walti.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Connection settings for the scan service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: Secret,
    /// Base URL of the REST API.
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Base URL of the web console, used to build result links.
    #[serde(default = "default_console_url")]
    pub console_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// What to scan and how to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub plugins: Vec<String>,
    /// Return right after queueing instead of waiting for results.
    #[serde(default)]
    pub no_wait: bool,
    /// Report non-green, non-grey results as UNSTABLE instead of FAILURE.
    #[serde(default)]
    pub unstable_preferred: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn default_console_url() -> String {
    DEFAULT_CONSOLE_URL.into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            secret: Secret::default(),
            url: default_api_url(),
            console_url: default_console_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            plugins: Vec::new(),
            no_wait: false,
            unstable_preferred: false,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// API secret. Never shows up in `Debug` output or traces.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Validated key/secret pair shared by every request of a run.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub key: String,
    pub secret: Secret,
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Key and secret, rejecting blank values before any request is made.
    pub fn credentials(&self) -> Result<Credentials> {
        if self.api.key.trim().is_empty() {
            return Err(WaltiError::Credentials("API key is required".into()));
        }
        if self.api.secret.is_empty() {
            return Err(WaltiError::Credentials("API secret is required".into()));
        }
        Ok(Credentials {
            key: self.api.key.trim().to_string(),
            secret: self.api.secret.clone(),
        })
    }

    /// Check the `[scan]` section is complete enough to start a run.
    pub fn validate_scan(&self) -> Result<()> {
        if self.scan.target.trim().is_empty() {
            return Err(WaltiError::Config("scan target is required".into()));
        }
        if self.scan.plugins.iter().all(|p| p.trim().is_empty()) {
            return Err(WaltiError::Config(
                "at least one plugin must be selected".into(),
            ));
        }
        if self.scan.poll_interval_secs == 0 {
            return Err(WaltiError::Config(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scan.poll_interval_secs)
    }

    /// Selected plugins as a comma separated list, for display.
    pub fn plugins_string(&self) -> String {
        self.scan.plugins.join(",")
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# walti-scan configuration

[api]
# Prefer the WALTI_API_KEY / WALTI_API_SECRET environment variables
# over storing credentials here.
# key = ""
# secret = ""
# url = "https://api.walti.io"
# console_url = "https://console.walti.io"
# timeout_secs = 30

[scan]
# Target name as registered with the scan service.
target = "example.com"

# Plugins to queue, in order.
plugins = ["nmap", "skipfish"]

# Return right after queueing instead of waiting for results.
no_wait = false

# Report non-green results as UNSTABLE instead of FAILURE.
unstable_preferred = false

# Seconds between status polls.
poll_interval_secs = 10
"#
    }
}
