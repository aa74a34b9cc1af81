//! Blocking HTTP listing client

use super::{parse_listing, ListingClient};
use crate::config::{CrawlConfig, Credentials};
use crate::error::{FetchError, FetchResult};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, FROM, USER_AGENT};
use reqwest::StatusCode;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Base delay for exponential backoff between attempts
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Listing client over one authenticated HTTP session
pub struct HttpListingClient {
    client: Client,
    credentials: Credentials,
    retries: u32,
    backoff_base: Duration,
}

impl HttpListingClient {
    /// Build a client (one connection pool) from the crawl configuration
    pub fn new(config: &CrawlConfig) -> FetchResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| FetchError::ClientInit(format!("bad User-Agent: {}", e)))?,
        );
        if let Some(from) = &config.from {
            headers.insert(
                FROM,
                HeaderValue::from_str(from)
                    .map_err(|e| FetchError::ClientInit(format!("bad From header: {}", e)))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::ClientInit(e.to_string()))?;

        Ok(Self {
            client,
            credentials: config.credentials.clone(),
            retries: config.retry_count,
            backoff_base: BACKOFF_BASE,
        })
    }

    /// Fetch the page body once
    fn fetch_once(&self, url: &str) -> Result<String, Attempt> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .send()
            .map_err(|e| Attempt::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Transient(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(Attempt::Fatal(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        response
            .text()
            .map_err(|e| Attempt::Transient(format!("reading body: {}", e)))
    }
}

/// Delay before retry `attempt` (1-based): base, 2x base, 4x base, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << attempt.saturating_sub(1).min(16))
}

/// Outcome of a single failed attempt
enum Attempt {
    Transient(String),
    Fatal(FetchError),
}

impl ListingClient for HttpListingClient {
    fn list(&mut self, url: &str) -> FetchResult<Vec<String>> {
        let mut last_reason = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = backoff_delay(self.backoff_base, attempt);
                warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64, reason = %last_reason, "Retrying listing fetch");
                thread::sleep(delay);
            }

            match self.fetch_once(url) {
                Ok(body) => {
                    let names = parse_listing(url, &body)?;
                    debug!(url = %url, entries = names.len(), "Listed directory");
                    return Ok(names);
                }
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Transient(reason)) => last_reason = reason,
            }
        }

        Err(FetchError::Transient {
            url: url.to_string(),
            attempts: self.retries + 1,
            reason: last_reason,
        })
    }
}
