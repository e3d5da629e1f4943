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

//! MQTT implementation of the [`MessageSink`] trait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, ConnectionError, Event, Incoming, MqttOptions};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::BrokerConfig;
use crate::publisher;

/// Capacity of the request channel between client handle and event loop.
const REQUEST_CAPACITY: usize = 100;

/// How long `disconnect` waits for the event loop to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Outbound side of the message bus.
///
/// The scheduler is the only caller; every method swallows failures after
/// logging them so a broken bus never stops the poll loop.
#[async_trait]
pub trait MessageSink: Send {
    /// Return true if a live session exists or one was just established.
    async fn ensure_connected(&mut self) -> bool;

    /// Send one value. Send failures are logged, never returned.
    async fn publish(&mut self, topic: &str, value: &Value, retain: bool);

    /// Graceful teardown. Safe to call when already disconnected.
    async fn disconnect(&mut self);
}

/// Why a connection attempt failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no CONNACK within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// A connected client plus the task polling its event loop.
struct Session {
    client: AsyncClient,
    live: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

/// [`MessageSink`] backed by a `rumqttc` client.
///
/// Holds at most one session. A session is established lazily by
/// [`ensure_connected`](MessageSink::ensure_connected); once its event loop
/// reports an error the session is considered dead and the next
/// `ensure_connected` call replaces it. No reconnect happens in between.
pub struct MqttConnection {
    config: BrokerConfig,
    session: Option<Session>,
}

impl MqttConnection {
    /// Create a new, disconnected manager from the given config.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.live.load(Ordering::SeqCst))
    }

    fn options(&self) -> MqttOptions {
        let mut mqtt_opts =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        mqtt_opts.set_keep_alive(self.config.keep_alive);
        mqtt_opts.set_clean_session(true);

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            mqtt_opts.set_credentials(user, pass);
        }
        mqtt_opts
    }

    async fn connect(&self) -> Result<Session, ConnectError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        // The event loop reports a refusing CONNACK as `ConnectionRefused`,
        // so reaching a ConnAck event means the session was accepted.
        let handshake = async {
            loop {
                if let Event::Incoming(Incoming::ConnAck(_)) = eventloop.poll().await? {
                    return Ok::<_, ConnectionError>(());
                }
            }
        };
        let timeout = self.config.connect_timeout;
        tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| ConnectError::Timeout(timeout))??;

        let live = Arc::new(AtomicBool::new(true));
        let driver_live = live.clone();
        let client_id = self.config.client_id.clone();

        // Keeps outgoing packets and pings flowing. Exits on the first error
        // instead of letting rumqttc reconnect behind our back.
        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => debug!("[{client_id}] MQTT event: {event:?}"),
                    Err(e) => {
                        if driver_live.swap(false, Ordering::SeqCst) {
                            warn!("[{client_id}] MQTT connection lost: {e}");
                        } else {
                            debug!("[{client_id}] MQTT event loop closed: {e}");
                        }
                        break;
                    }
                }
            }
        });

        Ok(Session {
            client,
            live,
            driver,
        })
    }
}

#[async_trait]
impl MessageSink for MqttConnection {
    async fn ensure_connected(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        if let Some(stale) = self.session.take() {
            stale.driver.abort();
        }

        info!(
            "[{}] Connecting to MQTT broker at {}:{}",
            self.config.client_id, self.config.host, self.config.port
        );
        match self.connect().await {
            Ok(session) => {
                info!("[{}] Connected to MQTT broker", self.config.client_id);
                self.session = Some(session);
                true
            }
            Err(e) => {
                error!(
                    "[{}] Failed to connect to MQTT broker at {}:{}: {e}",
                    self.config.client_id, self.config.host, self.config.port
                );
                false
            }
        }
    }

    async fn publish(&mut self, topic: &str, value: &Value, retain: bool) {
        let Some(session) = self
            .session
            .as_ref()
            .filter(|s| s.live.load(Ordering::SeqCst))
        else {
            warn!("Not connected, dropping value for '{topic}'");
            return;
        };

        // rumqttc refuses wildcard topics at the client; the session itself
        // is unaffected.
        if topic.is_empty() || !rumqttc::valid_topic(topic) {
            error!("Invalid topic '{topic}', value dropped");
            return;
        }

        let payload = publisher::render_payload(value);
        debug!("Publishing to '{topic}' (retain={retain}): {value}");

        let send = session
            .client
            .publish(topic, self.config.qos, retain, payload);
        match tokio::time::timeout(self.config.connect_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to publish to '{topic}': {e}");
                session.live.store(false, Ordering::SeqCst);
            }
            Err(_) => {
                error!("Timed out publishing to '{topic}'");
                session.live.store(false, Ordering::SeqCst);
            }
        }
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            debug!("[{}] No MQTT session to close", self.config.client_id);
            return;
        };

        if session.live.swap(false, Ordering::SeqCst) {
            if let Err(e) = session.client.disconnect().await {
                debug!("[{}] MQTT disconnect request failed: {e}", self.config.client_id);
            }
        }
        if tokio::time::timeout(DISCONNECT_GRACE, &mut session.driver)
            .await
            .is_err()
        {
            session.driver.abort();
        }
        info!("[{}] Disconnected from MQTT broker", self.config.client_id);
    }
}
