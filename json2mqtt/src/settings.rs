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

//! Configuration file model, validation and discovery.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;

use json2mqtt_publisher::{qos_from_level, valid_topic, BrokerConfig};
use json2mqtt_source::source::header_map;
use json2mqtt_source::{EndpointConfig, FetcherConfig, PathSegment, TopicSpec};

/// Files tried, in order, when no path is given explicitly.
pub const CONFIG_CANDIDATES: &[&str] = &[
    "config.yaml",
    "config.yml",
    "config.json",
    "/config/config.yaml",
];

pub const DEFAULT_UPDATE_RATE_SECS: f64 = 600.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 30.0;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level name, e.g. `debug` or `warning`.
    #[serde(default)]
    pub logging: Option<String>,
    #[serde(default)]
    pub mqtt: MqttSettings,
    /// Headers sent with every request.
    #[serde(default, deserialize_with = "ordered::deserialize")]
    pub headers: Vec<(String, String)>,
    /// Seconds between the starts of two iterations.
    #[serde(default = "default_update_rate")]
    pub update_rate: f64,
    /// Upper bound on one HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
    /// URL → topic → extraction rule, in file order.
    #[serde(deserialize_with = "ordered::deserialize")]
    pub requests: Vec<(String, TopicTable)>,
}

/// Topic rules of one endpoint, in file order.
#[derive(Debug, Clone)]
pub struct TopicTable(pub Vec<(String, TopicSettings)>);

impl<'de> Deserialize<'de> for TopicTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ordered::deserialize(deserializer).map(TopicTable)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicSettings {
    pub path: Vec<PathSegment>,
    #[serde(default)]
    pub factor: Option<f64>,
    #[serde(default)]
    pub retain: bool,
}

/// Broker section. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Seconds.
    pub keep_alive: u64,
    pub qos: u8,
    /// Seconds.
    pub connect_timeout: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: json2mqtt_publisher::config::DEFAULT_PORT,
            client_id: None,
            username: None,
            password: None,
            keep_alive: json2mqtt_publisher::config::DEFAULT_KEEP_ALIVE.as_secs(),
            qos: 0,
            connect_timeout: json2mqtt_publisher::config::DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

fn default_update_rate() -> f64 {
    DEFAULT_UPDATE_RATE_SECS
}

fn default_request_timeout() -> f64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Settings {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse and validate configuration text (YAML or JSON).
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.requests.is_empty(), "`requests` must list at least one URL");
        for (url, topics) in &self.requests {
            for (topic, options) in &topics.0 {
                // Wildcards are for subscriptions; a publish to one is refused.
                ensure!(
                    !topic.is_empty() && valid_topic(topic),
                    "invalid topic name '{topic}' under {url}"
                );
                ensure!(!options.path.is_empty(), "empty path for topic '{topic}'");
            }
        }
        self.update_rate()?;
        self.request_timeout()?;
        ensure!(self.mqtt.connect_timeout > 0, "`mqtt.connect_timeout` must be positive");
        if qos_from_level(self.mqtt.qos).is_none() {
            bail!("`mqtt.qos` must be 0, 1 or 2, got {}", self.mqtt.qos);
        }
        header_map(&self.headers)?;
        Ok(())
    }

    pub fn update_rate(&self) -> Result<Duration> {
        seconds("update_rate", self.update_rate)
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        seconds("request_timeout", self.request_timeout)
    }

    pub fn endpoints(&self) -> Vec<EndpointConfig> {
        self.requests
            .iter()
            .map(|(url, topics)| {
                topics
                    .0
                    .iter()
                    .fold(EndpointConfig::builder(url), |endpoint, (topic, options)| {
                        let mut spec = TopicSpec::new(topic, options.path.clone())
                            .retain(options.retain);
                        if let Some(factor) = options.factor {
                            spec = spec.factor(factor);
                        }
                        endpoint.topic(spec)
                    })
                    .build()
            })
            .collect()
    }

    pub fn fetcher_config(&self) -> Result<FetcherConfig> {
        Ok(self
            .headers
            .iter()
            .fold(FetcherConfig::builder(), |builder, (name, value)| {
                builder.header(name, value)
            })
            .timeout(self.request_timeout()?)
            .build())
    }

    pub fn broker_config(&self) -> Result<BrokerConfig> {
        let mqtt = &self.mqtt;
        let qos = qos_from_level(mqtt.qos).with_context(|| format!("invalid qos {}", mqtt.qos))?;

        let mut builder = BrokerConfig::builder(&mqtt.host)
            .port(mqtt.port)
            .keep_alive(Duration::from_secs(mqtt.keep_alive))
            .connect_timeout(Duration::from_secs(mqtt.connect_timeout))
            .qos(qos);
        if let Some(client_id) = &mqtt.client_id {
            builder = builder.client_id(client_id);
        }
        if let Some(username) = &mqtt.username {
            builder = builder.username(username);
        }
        if let Some(password) = &mqtt.password {
            builder = builder.password(password);
        }
        Ok(builder.build())
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    ensure!(value > 0.0, "`{name}` must be a positive number of seconds");
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("`{name}` of {value} seconds is out of range"))
}

/// Pick the configuration file: the explicit path if given, otherwise the
/// first existing entry of `candidates`.
pub fn discover(explicit: Option<&Path>, candidates: &[&str]) -> Result<PathBuf> {
    if let Some(path) = explicit {
        ensure!(path.is_file(), "config file {} does not exist", path.display());
        return Ok(path.to_path_buf());
    }
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .with_context(|| format!("no config file found (tried {})", candidates.join(", ")))
}

/// Deserialize a mapping into a `Vec` of entries, keeping document order.
mod ordered {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct Entries<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for Entries<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, V>()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(Entries(PhantomData))
    }
}
