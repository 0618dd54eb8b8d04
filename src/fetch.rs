// =============================================================================
// fetch.rs — THE WIRE
// =============================================================================
//
// Two kinds of HTTP traffic leave this process:
//
// - channel pages: a POST to the Telegram preview page, body as text.
// - subscription candidates: a GET with the clash-verge user agent and a hard
//   per-attempt timeout. We keep the status, the `subscription-userinfo`
//   header and the body; nothing else matters to the classifier.
//
// Both go through the `Fetcher` trait so the scheduler and the harvester can
// be driven by an in-memory fake in tests.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, USER_AGENT};
use thiserror::Error;

use crate::config::Config;

/// The response header airports use for traffic accounting.
pub const USERINFO_HEADER: &str = "subscription-userinfo";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reading body from {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    fn from_send(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }

    fn from_body(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Body {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Everything the classifier gets to see about a candidate response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    /// Raw `subscription-userinfo` value, if the server sent one.
    pub userinfo: Option<String>,
    pub body: String,
}

impl FetchedResponse {
    /// Only a plain 200 gets classified. 204, 206 and friends carry no
    /// complete subscription body.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// POST a channel preview page and return its text.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;

    /// GET a subscription candidate.
    async fn fetch_subscription(&self, url: &str) -> Result<FetchedResponse, FetchError>;
}

/// Timeouts and identity for the reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub check_timeout: Duration,
    pub page_timeout: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            check_timeout: config.check_timeout,
            page_timeout: config.channel_timeout,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: "clash-verge/v2.0.2".to_string(),
            check_timeout: Duration::from_secs(5),
            page_timeout: Duration::from_secs(15),
        }
    }
}

/// `Fetcher` over one shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .post(url)
            .timeout(self.settings.page_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_send(url, e))?;

        response
            .text()
            .await
            .map_err(|e| FetchError::from_body(url, e))
    }

    async fn fetch_subscription(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.settings.user_agent.as_str())
            .timeout(self.settings.check_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_send(url, e))?;

        let status = response.status().as_u16();
        let userinfo = userinfo_header(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_body(url, e))?;

        Ok(FetchedResponse {
            status,
            userinfo,
            body,
        })
    }
}

/// Header values are not guaranteed to be UTF-8; anything odd is replaced
/// rather than dropped.
fn userinfo_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USERINFO_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}
