//! walti-scan: run Walti.io security scans as a pipeline step.
//!
//! Queues one scan per selected plugin against a target, waits for each
//! to finish, and folds the results into a single build verdict
//! (SUCCESS / UNSTABLE / FAILURE / ABORTED).
//!
//! # Quick Start
//!
//! ```no_run
//! use waltiscan::orchestrator::{CancelToken, RunLog};
//! use waltiscan::{run, RunOptions};
//!
//! let options = RunOptions {
//!     target: Some("example.com".into()),
//!     plugins: vec!["nmap".into(), "skipfish".into()],
//!     ..RunOptions::default()
//! };
//! let report = run(&options, CancelToken::new(), RunLog::stdout()).unwrap();
//! println!("Verdict: {}", report.verdict);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;

use std::path::PathBuf;

use client::HttpScanClient;
use config::{Config, Secret};
use error::Result;
use orchestrator::{CancelToken, Orchestrator, RunLog, RunReport, RunSettings};
use output::OutputFormat;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".walti.toml";

/// Options for a run invocation. `Some`/non-empty values override the
/// config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Path to config file (defaults to `.walti.toml`).
    pub config_path: Option<PathBuf>,
    pub key: Option<String>,
    pub secret: Option<Secret>,
    pub api_url: Option<String>,
    pub target: Option<String>,
    pub plugins: Vec<String>,
    pub no_wait: Option<bool>,
    pub unstable_preferred: Option<bool>,
    pub poll_interval_secs: Option<u64>,
}

/// Load the config file and apply option overrides on top.
pub fn load_config(options: &RunOptions) -> Result<Config> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = Config::load(&config_path)?;

    if let Some(key) = &options.key {
        config.api.key = key.clone();
    }
    if let Some(secret) = &options.secret {
        config.api.secret = secret.clone();
    }
    if let Some(url) = &options.api_url {
        config.api.url = url.clone();
    }
    if let Some(target) = &options.target {
        config.scan.target = target.clone();
    }
    if !options.plugins.is_empty() {
        config.scan.plugins = options.plugins.clone();
    }
    if let Some(no_wait) = options.no_wait {
        config.scan.no_wait = no_wait;
    }
    if let Some(preferred) = options.unstable_preferred {
        config.scan.unstable_preferred = preferred;
    }
    if let Some(secs) = options.poll_interval_secs {
        config.scan.poll_interval_secs = secs;
    }

    Ok(config)
}

/// Build an authenticated API client from config.
pub fn connect(config: &Config) -> Result<HttpScanClient> {
    let credentials = config.credentials()?;
    HttpScanClient::new(&config.api, credentials)
}

/// Run a complete scan: load config, queue, poll, judge.
///
/// Only setup problems (credentials, config, URLs) are returned as errors.
/// Every scan-level outcome, including API failures mid-run, ends up in
/// the report's verdict.
pub fn run(options: &RunOptions, cancel: CancelToken, log: RunLog) -> Result<RunReport> {
    let config = load_config(options)?;
    config.validate_scan()?;
    let client = connect(&config)?;

    tracing::debug!(
        target_name = %config.scan.target,
        plugins = %config.plugins_string(),
        no_wait = config.scan.no_wait,
        "configuration loaded"
    );

    let orchestrator =
        Orchestrator::new(client, RunSettings::from(&config)).with_cancel_token(cancel);
    Ok(orchestrator.run(&config.scan.target, &config.scan.plugins, log))
}

/// Render a run report in the specified format.
pub fn render_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    output::render(report, format)
}
