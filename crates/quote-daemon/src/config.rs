use crate::http_gateway::FieldMapping;
use crate::scheduler::{IntervalError, SyncInterval};
use std::path::PathBuf;
use std::time::Duration;

/// Default remote list endpoint.
pub const DEFAULT_SERVER_URL: &str = "https://jsonplaceholder.typicode.com/posts";

/// Default seconds between scheduled syncs.
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the local store slots
    pub data_dir: PathBuf,
    /// Remote list endpoint
    pub server_url: String,
    /// Time between scheduled syncs
    pub sync_interval: SyncInterval,
    /// Which endpoint fields hold id, text and category
    pub fields: FieldMapping,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

/// Raw values as collected from the command line and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigInput {
    pub data_dir: Option<String>,
    pub server_url: Option<String>,
    pub interval_secs: Option<u64>,
    pub id_field: Option<String>,
    pub text_field: Option<String>,
    pub category_field: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Validate raw input and fill in defaults.
    pub fn resolve(input: ConfigInput) -> Result<Self, ConfigError> {
        let data_dir = match input.data_dir {
            Some(dir) => expand_tilde(&dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let server_url = input
            .server_url
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        validate_server_url(&server_url)?;

        let sync_interval =
            SyncInterval::from_secs(input.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS))?;

        let timeout_secs = input.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let defaults = FieldMapping::default();
        let fields = FieldMapping {
            id: non_empty(input.id_field).unwrap_or(defaults.id),
            text: non_empty(input.text_field).unwrap_or(defaults.text),
            category: non_empty(input.category_field).unwrap_or(defaults.category),
        };

        Ok(Self {
            data_dir,
            server_url,
            sync_interval,
            fields,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Check that `url` is an absolute http(s) URL.
pub fn validate_server_url(url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ConfigError::InvalidServerUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidServerUrl(format!(
            "{}: scheme must be http or https",
            url
        )));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Platform data directory for the store, e.g. `~/.local/share/quote-sync`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("quote-sync"))
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No data directory given and no platform default available (set QUOTE_SYNC_DATA_DIR)")]
    NoDataDir,

    #[error("Invalid server URL {0}")]
    InvalidServerUrl(String),

    #[error(transparent)]
    Interval(#[from] IntervalError),

    #[error("Request timeout must be at least one second")]
    ZeroTimeout,
}
