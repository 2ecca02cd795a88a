use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{PluginStatus, QueueOutcome, ResultStatus, ScanClient, ScanRequest, ScanResult};
use crate::config::{ApiConfig, Credentials};
use crate::error::{ApiError, Result, WaltiError};

const KEY_HEADER: &str = "X-API-KEY";
const SECRET_HEADER: &str = "X-API-SECRET";

/// [`ScanClient`] backed by the service's JSON-over-HTTPS API.
///
/// Every request carries the same key/secret pair, so one client is one
/// authenticated session for the length of a run.
pub struct HttpScanClient {
    http: Client,
    api_url: Url,
    console_url: Url,
    credentials: Credentials,
}

impl std::fmt::Debug for HttpScanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpScanClient")
            .field("api_url", &self.api_url.as_str())
            .field("console_url", &self.console_url.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[derive(Serialize)]
struct QueueBody<'a> {
    plugin: &'a str,
}

#[derive(Deserialize)]
struct TargetPayload {
    #[serde(default)]
    plugins: Vec<PluginPayload>,
}

#[derive(Deserialize)]
struct TargetSummary {
    name: String,
}

#[derive(Deserialize)]
struct PluginPayload {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    scan: Option<ScanPayload>,
}

#[derive(Deserialize)]
struct ScanPayload {
    #[serde(default)]
    result_status: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    status_color: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result_url: Option<String>,
}

impl HttpScanClient {
    pub fn new(config: &ApiConfig, credentials: Credentials) -> Result<Self> {
        let api_url = base_url(&config.url)?;
        let console_url = base_url(&config.console_url)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("walti-scan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            http,
            api_url,
            console_url,
            credentials,
        })
    }

    /// Console page for one plugin's latest result on a target.
    pub fn result_url(&self, target: &str, plugin: &str) -> String {
        join_segments(&self.console_url, &["targets", target, "plugins", plugin]).to_string()
    }

    /// Whether the service accepts the configured key and secret.
    pub fn validate_credentials(&self) -> std::result::Result<bool, ApiError> {
        let url = self.endpoint(&["v1", "targets"]);
        let response = self.authorized(self.http.get(url)).send()?;
        let status = response.status();
        match credentials_accepted(status) {
            Some(accepted) => Ok(accepted),
            None => Err(ApiError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            }),
        }
    }

    /// Names of every target registered for this account.
    pub fn list_targets(&self) -> std::result::Result<Vec<String>, ApiError> {
        let url = self.endpoint(&["v1", "targets"]);
        let response = check_status(self.authorized(self.http.get(url)).send()?)?;
        let body = response.text()?;
        let targets: Vec<TargetSummary> =
            serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))?;
        Ok(targets.into_iter().map(|t| t.name).collect())
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        join_segments(&self.api_url, segments)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(KEY_HEADER, &self.credentials.key)
            .header(SECRET_HEADER, self.credentials.secret.expose())
    }
}

impl ScanClient for HttpScanClient {
    fn queue(&self, request: &ScanRequest) -> std::result::Result<QueueOutcome, ApiError> {
        let url = self.endpoint(&["v1", "targets", &request.target, "scans"]);
        let response = self
            .authorized(self.http.post(url))
            .json(&QueueBody {
                plugin: &request.plugin,
            })
            .send()?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status.is_server_error() {
            check_status(response)?;
        }
        let outcome = queue_outcome(status);
        tracing::debug!(
            target_name = %request.target,
            plugin = %request.plugin,
            status = status.as_u16(),
            %outcome,
            "queue request answered"
        );
        Ok(outcome)
    }

    fn fetch_target_status(&self, target: &str) -> std::result::Result<Vec<PluginStatus>, ApiError> {
        let url = self.endpoint(&["v1", "targets", target]);
        let response = check_status(self.authorized(self.http.get(url)).send()?)?;
        let body = response.text()?;
        parse_target_status(&body, |plugin| self.result_url(target, plugin))
    }
}

fn base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(WaltiError::Config(format!("'{raw}' cannot be used as a base URL")));
    }
    Ok(url)
}

/// Append percent-encoded path segments to a base URL.
fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn check_status(response: Response) -> std::result::Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        });
    }
    Ok(response)
}

/// `None` for statuses that say nothing about the credentials.
fn credentials_accepted(status: StatusCode) -> Option<bool> {
    match status {
        StatusCode::UNAUTHORIZED => Some(false),
        s if s.is_success() => Some(true),
        _ => None,
    }
}

/// Classify a queue response that was not a transport or auth failure.
fn queue_outcome(status: StatusCode) -> QueueOutcome {
    match status {
        s if s.is_success() => QueueOutcome::Success,
        StatusCode::FORBIDDEN | StatusCode::CONFLICT => QueueOutcome::Skipped,
        s if s.is_client_error() => QueueOutcome::Failed,
        _ => QueueOutcome::Undefined,
    }
}

fn parse_target_status(
    body: &str,
    result_url: impl Fn(&str) -> String,
) -> std::result::Result<Vec<PluginStatus>, ApiError> {
    let payload: TargetPayload =
        serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))?;

    Ok(payload
        .plugins
        .into_iter()
        .map(|plugin| {
            let scan = plugin.scan.map(|scan| ScanResult {
                result_status: ResultStatus::from_str_lenient(&scan.result_status),
                status: scan.status,
                status_color: scan.status_color.into(),
                message: scan.message,
                result_url: scan.result_url.unwrap_or_else(|| result_url(&plugin.name)),
            });
            PluginStatus {
                is_queued: plugin.status.trim().eq_ignore_ascii_case("queued"),
                name: plugin.name,
                scan,
            }
        })
        .collect())
}
