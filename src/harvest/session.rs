//! Session context and the provider that renews it
//!
//! The harvester never mutates session state itself. When the remote side
//! terminates a session it asks the provider to invalidate the current
//! context and, after the cooldown, to hand over a fresh one.

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;

/// Authorization context attached to every search request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Incremented on every refresh
    pub generation: u64,

    /// Value for the `Cookie` request header, if the session has one
    pub cookie: Option<String>,
}

/// Errors raised while renewing a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("HTTP error while refreshing session: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session landing page answered HTTP {status}")]
    Rejected { status: u16 },
}

/// Capability to drop and renew the remote session
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Discards the current session (cookies, tokens)
    async fn invalidate(&self);

    /// Obtains a fresh session context
    async fn refresh(&self) -> Result<SessionContext, SessionError>;
}

/// Session provider that reloads a landing page to collect fresh cookies
///
/// This is the HTTP equivalent of clearing the browser's cookies and
/// reloading the page.
#[derive(Debug)]
pub struct HttpSessionProvider {
    client: Client,
    landing_url: Option<String>,
    generation: AtomicU64,
    cookie: Mutex<Option<String>>,
}

impl HttpSessionProvider {
    /// Creates a provider
    ///
    /// Without a landing URL, every refresh yields a cookie-less context.
    pub fn new(client: Client, landing_url: Option<String>) -> Self {
        Self {
            client,
            landing_url,
            generation: AtomicU64::new(0),
            cookie: Mutex::new(None),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cookie held for the current generation, if any
    pub async fn current_cookie(&self) -> Option<String> {
        self.cookie.lock().await.clone()
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn invalidate(&self) {
        let dropped = self.cookie.lock().await.take();
        tracing::info!(
            "Invalidating session generation {} ({})",
            self.current_generation(),
            if dropped.is_some() { "cookie dropped" } else { "no cookie held" }
        );
    }

    async fn refresh(&self) -> Result<SessionContext, SessionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(url) = &self.landing_url else {
            *self.cookie.lock().await = None;
            tracing::debug!("No session URL configured; using cookie-less session {}", generation);
            return Ok(SessionContext {
                generation,
                cookie: None,
            });
        };

        tracing::info!("Refreshing session from {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Rejected {
                status: status.as_u16(),
            });
        }

        let pairs: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(cookie_pair)
            .collect();

        tracing::debug!(
            "Session {} established with {} cookie(s)",
            generation,
            pairs.len()
        );

        let cookie = (!pairs.is_empty()).then(|| pairs.join("; "));
        *self.cookie.lock().await = cookie.clone();

        Ok(SessionContext { generation, cookie })
    }
}

/// Extracts the `name=value` part of a `Set-Cookie` header
fn cookie_pair(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    match pair.split_once('=') {
        Some((name, _)) if !name.trim().is_empty() => Some(pair.to_string()),
        _ => None,
    }
}
