// Copyright 2025 The json2mqtt Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP source: one GET per endpoint per tick.

use std::error::Error as StdError;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use thiserror::Error;

use crate::config::FetcherConfig;

/// Why a fetch produced no body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("DNS lookup failed: {0}")]
    DnsFailure(String),
    #[error("connection failed: {0}")]
    ConnectionFailure(String),
    #[error("server answered with HTTP status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout;
        }
        if let Some(status) = e.status() {
            return FetchError::Status(status.as_u16());
        }
        let message = error_chain(&e);
        if e.is_connect() {
            if is_dns_failure(&e) {
                FetchError::DnsFailure(message)
            } else {
                FetchError::ConnectionFailure(message)
            }
        } else {
            FetchError::Other(message)
        }
    }
}

/// Errors raised while building an [`HttpFetcher`].
#[derive(Debug, Error)]
pub enum FetcherBuildError {
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),
    #[error("invalid value for header '{0}'")]
    InvalidHeaderValue(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Retrieves the raw body of an endpoint.
///
/// Implementations never retry; a failure means the endpoint is skipped for
/// the current tick.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// [`Fetch`] over a pooled `reqwest` client with default headers and a
/// per-request timeout.
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Create a new fetcher from the given config.
    pub fn new(config: &FetcherConfig) -> Result<Self, FetcherBuildError> {
        let headers = header_map(&config.headers)?;
        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        debug!("GET {url} -> {}", response.status());
        Ok(response.text().await?)
    }
}

/// Validate configured headers into a [`HeaderMap`].
pub fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, FetcherBuildError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetcherBuildError::InvalidHeaderName(name.clone()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| FetcherBuildError::InvalidHeaderValue(name.clone()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn error_chain(e: &dyn StdError) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// reqwest reports resolver failures as connect errors; the resolver's own
// error text is the only distinguishing mark.
fn is_dns_failure(e: &dyn StdError) -> bool {
    let mut current = Some(e);
    while let Some(err) = current {
        let text = err.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        current = err.source();
    }
    false
}
