//! Search request client
//!
//! This module performs exactly one request per call and classifies the
//! outcome:
//! - 2xx with a JSON array → `Success` (possibly empty)
//! - 204 or a `null` body → `EmptyQueryFailure`
//! - a status or error matching a session-loss signature → `CatastrophicFailure`
//! - anything else → `TransientFailure`

use crate::catalog::RawRecord;
use crate::config::{EndpointConfig, RequestMethod};
use crate::harvest::enumerator::CandidateQuery;
use crate::harvest::session::SessionContext;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest::{Client, StatusCode};
use std::error::Error as StdError;
use std::time::Duration;

/// Outcome of one search attempt
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Well-formed response; may hold zero records
    Success(Vec<RawRecord>),

    /// The endpoint explicitly answered with nothing
    EmptyQueryFailure,

    /// Network or parse hiccup worth retrying
    TransientFailure(String),

    /// The remote terminated the session
    CatastrophicFailure(String),
}

impl QueryResult {
    pub fn is_catastrophic(&self) -> bool {
        matches!(self, Self::CatastrophicFailure(_))
    }
}

/// Performs one search request
///
/// Implementations must not retry internally; retries belong to the caller.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn fetch(&self, query: &CandidateQuery, session: &SessionContext) -> QueryResult;
}

/// Builds an HTTP client for the configured endpoint
///
/// # Example
///
/// ```no_run
/// use issuer_harvest::config::load_config;
/// use issuer_harvest::harvest::build_http_client;
/// use std::path::Path;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// let client = build_http_client(&config.endpoint).unwrap();
/// ```
pub fn build_http_client(endpoint: &EndpointConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(endpoint.user_agent.clone())
        .timeout(endpoint.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `QueryClient` backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpQueryClient {
    client: Client,
    endpoint: EndpointConfig,
}

impl HttpQueryClient {
    pub fn new(client: Client, endpoint: EndpointConfig) -> Self {
        Self { client, endpoint }
    }

    /// Builds a client from the endpoint configuration alone
    pub fn from_config(endpoint: &EndpointConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(endpoint)?, endpoint.clone()))
    }

    fn query_text(&self, query: &CandidateQuery) -> String {
        if self.endpoint.lowercase_query {
            query.as_str().to_lowercase()
        } else {
            query.as_str().to_string()
        }
    }

    fn build_request(
        &self,
        query: &CandidateQuery,
        session: &SessionContext,
    ) -> Result<reqwest::RequestBuilder, serde_json::Error> {
        let text = self.query_text(query);

        let request = match self.endpoint.method {
            RequestMethod::Get => {
                let mut params: Vec<(&str, &str)> = self
                    .endpoint
                    .params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                params.push((self.endpoint.query_param.as_str(), text.as_str()));
                self.client.get(&self.endpoint.url).query(&params)
            }
            RequestMethod::Post => {
                let mut body: serde_json::Map<String, serde_json::Value> = self
                    .endpoint
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                body.insert(
                    self.endpoint.query_param.clone(),
                    serde_json::Value::String(text),
                );
                self.client
                    .post(&self.endpoint.url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(serde_json::to_string(&body)?)
            }
        };

        let request = request
            .header(ACCEPT, "application/json, text/javascript, */*; q=0.01")
            .header("X-Requested-With", "XMLHttpRequest");

        Ok(match &session.cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        })
    }

    fn is_session_loss_status(&self, status: StatusCode) -> bool {
        self.endpoint
            .session_loss_statuses
            .contains(&status.as_u16())
    }

    /// Classifies a transport error
    fn classify_error(&self, error: &reqwest::Error) -> QueryResult {
        let chain = error_chain(error);
        if is_session_loss(error, &self.endpoint.session_loss_patterns) {
            return QueryResult::CatastrophicFailure(chain);
        }

        if error.is_timeout() {
            QueryResult::TransientFailure("Request timeout".to_string())
        } else if error.is_connect() {
            QueryResult::TransientFailure(format!("Connection failed: {}", chain))
        } else {
            QueryResult::TransientFailure(chain)
        }
    }
}

#[async_trait]
impl QueryClient for HttpQueryClient {
    async fn fetch(&self, query: &CandidateQuery, session: &SessionContext) -> QueryResult {
        let request = match self.build_request(query, session) {
            Ok(r) => r,
            Err(e) => return QueryResult::TransientFailure(format!("Failed to encode request: {}", e)),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return self.classify_error(&e),
        };

        let status = response.status();
        if self.is_session_loss_status(status) {
            return QueryResult::CatastrophicFailure(format!("HTTP {}", status.as_u16()));
        }
        if status == StatusCode::NO_CONTENT {
            return QueryResult::EmptyQueryFailure;
        }
        if !status.is_success() {
            return QueryResult::TransientFailure(format!("HTTP {}", status.as_u16()));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return self.classify_error(&e),
        };

        parse_records(&body)
    }
}

/// Parses a response body into raw records
pub fn parse_records(body: &str) -> QueryResult {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return QueryResult::EmptyQueryFailure;
    }

    match serde_json::from_str::<Vec<RawRecord>>(trimmed) {
        Ok(records) => QueryResult::Success(records),
        Err(e) => QueryResult::TransientFailure(format!("Malformed response: {}", e)),
    }
}

/// Renders an error and all of its sources as one message
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Finds the HTTP/2 reset or GOAWAY reason anywhere in an error's source chain
pub fn h2_reason(error: &(dyn StdError + 'static)) -> Option<h2::Reason> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(h2_error) = err.downcast_ref::<h2::Error>() {
            if let Some(reason) = h2_error.reason() {
                return Some(reason);
            }
        }
        current = err.source();
    }
    None
}

/// Returns true if a transport error means the remote ended the session
///
/// Any HTTP/2 reset or GOAWAY carrying a reason other than `NO_ERROR`
/// counts, as does a rendered error chain matching one of `patterns`.
pub fn is_session_loss(error: &(dyn StdError + 'static), patterns: &[String]) -> bool {
    if matches!(h2_reason(error), Some(reason) if reason != h2::Reason::NO_ERROR) {
        return true;
    }
    matches_session_loss(&error_chain(error), patterns)
}

/// Returns true if an error message carries a session-loss signature
pub fn matches_session_loss(message: &str, patterns: &[String]) -> bool {
    let message = message.to_lowercase();
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| message.contains(&p.to_lowercase()))
}
