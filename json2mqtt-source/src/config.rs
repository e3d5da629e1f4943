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

//! Configuration types for polled endpoints and their topic rules.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Default bound on a single GET request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One step of a field path.
///
/// Strings address object members, integers address array elements.
/// Negative indices count from the end of the array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(i64),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Key(k) => write!(f, "'{k}'"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<i64> for PathSegment {
    fn from(index: i64) -> Self {
        PathSegment::Index(index)
    }
}

/// A single extraction rule: which value to pick and where to publish it.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSpec {
    /// Destination MQTT topic.
    pub topic: String,
    /// Path from the document root to the value.
    pub path: Vec<PathSegment>,
    /// Optional multiplier. When set the value must be numeric-coercible.
    pub factor: Option<f64>,
    /// Ask the broker to keep the last value (default: false).
    pub retain: bool,
}

impl TopicSpec {
    pub fn new(topic: impl Into<String>, path: Vec<PathSegment>) -> Self {
        Self {
            topic: topic.into(),
            path,
            factor: None,
            retain: false,
        }
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = Some(factor);
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// A polled URL and the ordered topic rules applied to its response.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// URL fetched with a GET request every tick.
    pub url: String,
    /// Topic rules, applied in order.
    pub topics: Vec<TopicSpec>,
}

impl EndpointConfig {
    /// Start building an endpoint for `url`.
    pub fn builder(url: impl Into<String>) -> EndpointConfigBuilder {
        EndpointConfigBuilder {
            url: url.into(),
            topics: Vec::new(),
        }
    }
}

/// Builder for [`EndpointConfig`].
pub struct EndpointConfigBuilder {
    url: String,
    topics: Vec<TopicSpec>,
}

impl EndpointConfigBuilder {
    pub fn topic(mut self, spec: TopicSpec) -> Self {
        self.topics.push(spec);
        self
    }

    /// Build the config.
    pub fn build(self) -> EndpointConfig {
        EndpointConfig {
            url: self.url,
            topics: self.topics,
        }
    }
}

/// Settings shared by every request the fetcher makes.
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    /// Headers sent with every GET, in configured order.
    pub headers: Vec<(String, String)>,
    /// Upper bound on one request, connect through body (default: 30s).
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl FetcherConfig {
    pub fn builder() -> FetcherConfigBuilder {
        FetcherConfigBuilder {
            inner: FetcherConfig::default(),
        }
    }
}

/// Builder for [`FetcherConfig`].
pub struct FetcherConfigBuilder {
    inner: FetcherConfig,
}

impl FetcherConfigBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    /// Build the config.
    pub fn build(self) -> FetcherConfig {
        self.inner
    }
}
