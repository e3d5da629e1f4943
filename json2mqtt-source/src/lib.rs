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

//! HTTP JSON source for json2mqtt.
//!
//! Fetches JSON documents over HTTP, locates configured fields inside them
//! and optionally scales the values before they are handed to a publisher.
//!
//! # Example
//!
//! ```ignore
//! use json2mqtt_source::{extract, transform, EndpointConfig, Fetch, FetcherConfig, HttpFetcher, TopicSpec};
//!
//! let endpoint = EndpointConfig::builder("http://inverter.local/api/status")
//!     .topic(TopicSpec::new("solar/power", vec!["ac".into(), "power".into()]).factor(0.001))
//!     .build();
//!
//! let fetcher = HttpFetcher::new(&FetcherConfig::default())?;
//! let document: serde_json::Value = serde_json::from_str(&fetcher.fetch(&endpoint.url).await?)?;
//! let spec = &endpoint.topics[0];
//! let value = transform(extract(&document, &spec.path)?, spec.factor)?;
//! ```

pub mod config;
pub mod mapper;
pub mod source;

pub use config::{
    EndpointConfig, EndpointConfigBuilder, FetcherConfig, FetcherConfigBuilder, PathSegment,
    TopicSpec,
};
pub use mapper::{extract, transform, ConversionError, MissReason, MissingField};
pub use source::{Fetch, FetchError, FetcherBuildError, HttpFetcher};
