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

//! MQTT publishing side of json2mqtt.
//!
//! Owns the single outbound broker session: lazy connect, publish of scalar
//! payloads, and graceful disconnect.
//!
//! # Example
//!
//! ```ignore
//! use json2mqtt_publisher::{BrokerConfig, MessageSink, MqttConnection};
//!
//! let config = BrokerConfig::builder("broker.local")
//!     .port(1883)
//!     .client_id("json2mqtt")
//!     .build();
//!
//! let mut connection = MqttConnection::new(config);
//! if connection.ensure_connected().await {
//!     connection.publish("solar/power", &serde_json::json!(1234.5), true).await;
//! }
//! connection.disconnect().await;
//! ```

pub mod config;
pub mod connection;
pub mod publisher;

pub use config::{qos_from_level, BrokerConfig, BrokerConfigBuilder};
pub use connection::{ConnectError, MessageSink, MqttConnection};
pub use rumqttc::{valid_topic, QoS};
