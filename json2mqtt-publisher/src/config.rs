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

//! Configuration types for the MQTT publishing connection.

use std::time::Duration;

use rumqttc::QoS;

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the broker connection.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// MQTT broker hostname or IP.
    pub host: String,
    /// MQTT broker port (default: 1883).
    pub port: u16,
    /// MQTT client ID. Defaults to `"json2mqtt-{uuid}"`.
    pub client_id: String,
    /// Optional MQTT username for authentication.
    pub username: Option<String>,
    /// Optional MQTT password for authentication.
    pub password: Option<String>,
    /// Keep-alive interval negotiated with the broker (default: 60s).
    pub keep_alive: Duration,
    /// Quality of service for every publish (default: at most once).
    pub qos: QoS,
    /// Bound on the CONNECT/CONNACK handshake and on a single publish (default: 10s).
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    /// Start building a new config for the broker at `host`.
    pub fn builder(host: impl Into<String>) -> BrokerConfigBuilder {
        BrokerConfigBuilder {
            host: host.into(),
            port: DEFAULT_PORT,
            client_id: format!("json2mqtt-{}", uuid::Uuid::new_v4()),
            username: None,
            password: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            qos: QoS::AtMostOnce,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Builder for [`BrokerConfig`].
pub struct BrokerConfigBuilder {
    host: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive: Duration,
    qos: QoS,
    connect_timeout: Duration,
}

impl BrokerConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the config.
    pub fn build(self) -> BrokerConfig {
        BrokerConfig {
            host: self.host,
            port: self.port,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            keep_alive: self.keep_alive,
            qos: self.qos,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Map a numeric QoS level (0, 1 or 2) to [`QoS`].
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}
