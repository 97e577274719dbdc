use crate::catalog::RecordConvention;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default query alphabet: upper-case letters followed by digits
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Main configuration structure for Issuer-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harvester: HarvesterConfig,
    pub endpoint: EndpointConfig,
    pub output: OutputConfig,
}

/// Enumeration, pacing and recovery behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HarvesterConfig {
    /// Characters queried at each prefix position, in enumeration order
    #[serde(default = "default_alphabet")]
    pub alphabet: String,

    /// Longest prefix the enumerator will expand to
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Lower bound of the randomized delay between requests (milliseconds)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay between requests (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempts per query before it is recorded as failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Attempts per failed query during the final retry pass
    #[serde(default = "default_final_pass_attempts")]
    pub final_pass_attempts: u32,

    /// Pause after a session loss (milliseconds)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Grace delay after a session refresh before resuming (milliseconds)
    #[serde(default = "default_resume_delay_ms")]
    pub resume_delay_ms: u64,

    /// Double the backoff for every attempt already consumed
    #[serde(default)]
    pub exponential_backoff: bool,

    /// Halt after this many back-to-back recoveries on one query
    #[serde(default)]
    pub max_consecutive_recoveries: Option<u32>,
}

impl HarvesterConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    /// The alphabet as an ordered list of characters
    pub fn alphabet_chars(&self) -> Vec<char> {
        self.alphabet.chars().collect()
    }
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            alphabet: default_alphabet(),
            max_depth: default_max_depth(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
            final_pass_attempts: default_final_pass_attempts(),
            cooldown_ms: default_cooldown_ms(),
            resume_delay_ms: default_resume_delay_ms(),
            exponential_backoff: false,
            max_consecutive_recoveries: None,
        }
    }
}

/// HTTP method used for search requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    #[default]
    Get,
    Post,
}

/// Remote search endpoint description
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EndpointConfig {
    /// Source name written into the catalog metadata
    pub source: String,

    /// Search URL
    pub url: String,

    #[serde(default)]
    pub method: RequestMethod,

    /// Query-string parameter (GET) or body field (POST) carrying the prefix
    #[serde(default = "default_query_param")]
    pub query_param: String,

    /// Send the prefix in lower case
    #[serde(default)]
    pub lowercase_query: bool,

    /// Landing page fetched to obtain a fresh session
    #[serde(default)]
    pub session_url: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// HTTP statuses that mean the remote ended the session
    #[serde(default = "default_session_loss_statuses")]
    pub session_loss_statuses: Vec<u16>,

    /// Error-message fragments that mean the remote ended the session
    #[serde(default = "default_session_loss_patterns")]
    pub session_loss_patterns: Vec<String>,

    /// Static parameters sent with every request
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// How raw records map to entries
    #[serde(default)]
    pub records: RecordConvention,
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite progress database
    pub database_path: String,

    /// Path to the catalog document
    pub catalog_path: String,

    /// Path to the failed-queries document
    pub failed_path: String,
}

fn default_alphabet() -> String {
    DEFAULT_ALPHABET.to_string()
}

fn default_max_depth() -> usize {
    2
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    5
}

fn default_final_pass_attempts() -> u32 {
    1
}

fn default_cooldown_ms() -> u64 {
    120_000
}

fn default_resume_delay_ms() -> u64 {
    5000
}

fn default_query_param() -> String {
    "searchText".to_string()
}

fn default_user_agent() -> String {
    format!("issuer-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_session_loss_statuses() -> Vec<u16> {
    vec![401, 403, 419]
}

fn default_session_loss_patterns() -> Vec<String> {
    vec![
        "unspecific protocol error".to_string(),
        "stream error received".to_string(),
        "connection error received".to_string(),
        "connection reset".to_string(),
    ]
}
