//! HTTP transport
//!
//! This module owns the crawler's single HTTP identity:
//! - Building clients with browser-like default headers and a cookie jar
//! - Optional rotating outbound proxy keyed by a per-session id
//! - Cookie warm-up against the site root
//! - Session reinitialization when the remote service starts blocking
//! - Retry with exponential backoff on block and transient status codes

use crate::config::{SiteConfig, TransportConfig};
use crate::crawler::pacer::Backoff;
use crate::{CrawlError, Result};
use rand::distr::{Alphanumeric, SampleString};
use rand::seq::IndexedRandom;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use reqwest::{Client, Proxy, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Desktop browser identities used when no User-Agent is pinned
pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
];

/// Length of the proxy session id
const SESSION_ID_LEN: usize = 10;

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

fn new_session_id() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), SESSION_ID_LEN)
}

/// Builds an HTTP client for one session
///
/// # Arguments
///
/// * `config` - Transport settings (timeout, proxy)
/// * `user_agent` - User-Agent sent by default on every request
/// * `session_id` - Substituted for `{session}` in the proxy URL
///
/// # Returns
///
/// * `Ok(Client)` - Client with its own empty cookie jar
/// * `Err(reqwest::Error)` - Failed to build client or proxy
pub fn build_http_client(
    config: &TransportConfig,
    user_agent: &str,
    session_id: &str,
) -> std::result::Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));

    let timeout = config.request_timeout();
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .cookie_store(true)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy.url.replace("{session}", session_id))?);
    }

    builder.build()
}

/// One HTTP identity against the remote site
///
/// Cookies, connection pool, User-Agent and proxy session live here and
/// nowhere else; two transports never share state.
pub struct Transport {
    client: Client,
    site: SiteConfig,
    config: TransportConfig,
    user_agent: String,
    session_id: String,
    reinit_count: u32,
}

impl Transport {
    /// Creates a transport with a fresh session but does not contact the site
    pub fn new(site: &SiteConfig, config: &TransportConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());
        let session_id = new_session_id();
        let client =
            build_http_client(config, &user_agent, &session_id).map_err(CrawlError::Client)?;

        Ok(Self {
            client,
            site: site.clone(),
            config: config.clone(),
            user_agent,
            session_id,
            reinit_count: 0,
        })
    }

    /// Creates a transport and warms up its cookie jar
    pub async fn connect(site: &SiteConfig, config: &TransportConfig) -> Result<Self> {
        let transport = Self::new(site, config)?;
        transport.warm_up().await;
        Ok(transport)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// How many times the session was thrown away after a block
    pub fn reinit_count(&self) -> u32 {
        self.reinit_count
    }

    /// Visits the site root so the session picks up its cookies
    ///
    /// Failures are logged and swallowed; a cold session still gets to try.
    pub async fn warm_up(&self) {
        let url = format!("{}/", self.site.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "Session warmed up");
            }
            Ok(response) => {
                warn!(url = %url, status = response.status().as_u16(), "Warm-up rejected");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Warm-up failed");
            }
        }
    }

    /// Discards the session and starts a new one
    ///
    /// The cookie jar and connection pool go away with the old client. A new
    /// proxy session id is drawn and, unless pinned, a new User-Agent.
    pub async fn reinitialize(&mut self) -> Result<()> {
        if self.config.user_agent.is_none() {
            self.user_agent = random_user_agent().to_string();
        }
        self.session_id = new_session_id();
        self.client = build_http_client(&self.config, &self.user_agent, &self.session_id)
            .map_err(CrawlError::Client)?;
        self.reinit_count += 1;

        info!(
            session = %self.session_id,
            reinit = self.reinit_count,
            "Reinitialized HTTP session"
        );

        self.warm_up().await;
        Ok(())
    }

    /// Issues a GET and returns the body of the first 2xx response
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 403 | Reinitialize session, back off, retry |
    /// | HTTP 429 / 503 | Back off, retry |
    /// | Retries exhausted on 403 | `CrawlError::Blocked` |
    /// | Any other non-2xx | `CrawlError::HttpStatus` |
    /// | Network error | `CrawlError::Http` |
    ///
    /// Both retry kinds draw from one budget of `max-retries`; backoff
    /// starts at `backoff-base-ms` and doubles per retry with ±20% jitter.
    pub async fn fetch(&mut self, url: &str, is_api: bool) -> Result<String> {
        let mut backoff = Backoff::new(self.config.backoff_base());
        let mut attempts = 0u32;

        loop {
            let response = self.send(url, is_api).await?;
            let status = response.status();

            if status.is_success() {
                return response.text().await.map_err(|source| CrawlError::Http {
                    url: url.to_string(),
                    source,
                });
            }

            let can_retry = attempts < self.config.max_retries;
            match status {
                StatusCode::FORBIDDEN if can_retry => {
                    attempts += 1;
                    warn!(url, attempt = attempts, "Blocked (403); rotating session");
                    self.reinitialize().await?;
                    tokio::time::sleep(backoff.next_delay()).await;
                }
                StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE if can_retry => {
                    attempts += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        url,
                        status = status.as_u16(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient error; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                StatusCode::FORBIDDEN => {
                    return Err(CrawlError::Blocked {
                        url: url.to_string(),
                        attempts,
                    });
                }
                _ => {
                    return Err(CrawlError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
            }
        }
    }

    async fn send(&self, url: &str, is_api: bool) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);

        if self.config.rotate_user_agent && self.config.user_agent.is_none() {
            request = request.header(USER_AGENT, random_user_agent());
        }

        if is_api {
            let origin = self.site.base_url.trim_end_matches('/');
            request = request
                .header(ACCEPT, "application/json, text/plain, */*")
                .header("sec-fetch-mode", "cors")
                .header("sec-fetch-site", "same-origin")
                .header("sec-fetch-dest", "empty")
                .header(
                    REFERER,
                    format!("{}/{}", origin, self.site.listing_path.trim_matches('/')),
                )
                .header(ORIGIN, origin)
                .header("x-requested-with", "XMLHttpRequest");
        }

        let response = request.send().await.map_err(|source| CrawlError::Http {
            url: url.to_string(),
            source,
        })?;
        debug!(url, status = response.status().as_u16(), "GET");
        Ok(response)
    }
}
