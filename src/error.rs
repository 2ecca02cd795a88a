use thiserror::Error;

pub type Result<T> = std::result::Result<T, WaltiError>;

/// Failure talking to the scan service. Always fatal to the current run.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API key or secret was rejected")]
    Unauthorized,

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum WaltiError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl WaltiError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}
