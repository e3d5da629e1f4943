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

//! The poll loop: fetch every endpoint, extract, publish, sleep.

use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use json2mqtt_publisher::MessageSink;
use json2mqtt_source::{extract, transform, ConversionError, EndpointConfig, Fetch, FetchError};

/// A recoverable problem met during one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum TickFailure {
    Fetch { url: String, error: FetchError },
    Parse { url: String, error: String },
    Extract { topic: String, error: String },
    Convert { topic: String, error: ConversionError },
}

/// What happened during one iteration. Only used for logging and tests.
#[derive(Debug, Default)]
pub struct TickReport {
    pub elapsed: Duration,
    /// False when the broker was unreachable and nothing was polled.
    pub connected: bool,
    pub published: usize,
    pub failures: Vec<TickFailure>,
}

/// Drives fixed-period iterations over all endpoints.
///
/// Iterations never overlap: the next one starts only after the previous
/// one has finished and its sleep has elapsed.
pub struct Bridge<F, S> {
    endpoints: Vec<EndpointConfig>,
    fetcher: F,
    sink: S,
    update_rate: Duration,
}

impl<F: Fetch, S: MessageSink> Bridge<F, S> {
    pub fn new(endpoints: Vec<EndpointConfig>, fetcher: F, sink: S, update_rate: Duration) -> Self {
        Self {
            endpoints,
            fetcher,
            sink,
            update_rate,
        }
    }

    /// Loop until `shutdown` is cancelled, then disconnect from the broker.
    ///
    /// Cancellation interrupts the sleep between iterations; an iteration
    /// already in progress runs to completion.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "Polling {} endpoint(s) every {:.2}s",
            self.endpoints.len(),
            self.update_rate.as_secs_f64()
        );

        while !shutdown.is_cancelled() {
            let report = self.tick().await;
            let sleep_for = self.update_rate.saturating_sub(report.elapsed);
            debug!(
                "looped in {:.2}ms ({} published, {} failed), sleeping {:.2}s.",
                report.elapsed.as_secs_f64() * 1000.0,
                report.published,
                report.failures.len(),
                sleep_for.as_secs_f64()
            );

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        info!("Exiting poll loop");
        self.sink.disconnect().await;
    }

    /// Run a single iteration.
    pub async fn tick(&mut self) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport {
            connected: self.sink.ensure_connected().await,
            ..TickReport::default()
        };

        if report.connected {
            let Self {
                endpoints,
                fetcher,
                sink,
                ..
            } = self;
            for endpoint in endpoints.iter() {
                poll_endpoint(&*fetcher, sink, endpoint, &mut report).await;
            }
        } else {
            warn!("MQTT broker unavailable, skipping this iteration");
        }

        report.elapsed = start.elapsed();
        report
    }
}

async fn poll_endpoint<F: Fetch, S: MessageSink>(
    fetcher: &F,
    sink: &mut S,
    endpoint: &EndpointConfig,
    report: &mut TickReport,
) {
    let url = &endpoint.url;
    let body = match fetcher.fetch(url).await {
        Ok(body) => body,
        Err(e) => {
            match e {
                FetchError::Timeout
                | FetchError::DnsFailure(_)
                | FetchError::ConnectionFailure(_) => warn!("[{url}] {e}"),
                FetchError::Status(_) | FetchError::Other(_) => error!("[{url}] {e}"),
            }
            report.failures.push(TickFailure::Fetch {
                url: url.clone(),
                error: e,
            });
            return;
        }
    };

    let document: Value = match serde_json::from_str(&body) {
        Ok(document) => document,
        Err(e) => {
            warn!("[{url}] response is not valid JSON: {e}");
            report.failures.push(TickFailure::Parse {
                url: url.clone(),
                error: e.to_string(),
            });
            return;
        }
    };

    for spec in &endpoint.topics {
        let value = match extract(&document, &spec.path) {
            Ok(value) => value,
            Err(miss) => {
                warn!("[{}] unexpected response: {document}. {miss}", spec.topic);
                report.failures.push(TickFailure::Extract {
                    topic: spec.topic.clone(),
                    error: miss.to_string(),
                });
                continue;
            }
        };

        let value = match transform(value, spec.factor) {
            Ok(value) => value,
            Err(e) => {
                warn!("[{}] failed to convert: {e}", spec.topic);
                report.failures.push(TickFailure::Convert {
                    topic: spec.topic.clone(),
                    error: e,
                });
                continue;
            }
        };

        sink.publish(&spec.topic, &value, spec.retain).await;
        report.published += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use json2mqtt_publisher::{BrokerConfig, MqttConnection};
    use json2mqtt_source::{PathSegment, TopicSpec};
    use serde_json::json;

    #[derive(Clone, Default)]
    struct FakeFetcher {
        responses: Arc<Mutex<HashMap<String, Result<String, FetchError>>>>,
        /// Simulated time spent inside each fetch.
        delay: Duration,
        calls: Arc<Mutex<Vec<(String, Instant)>>>,
    }

    impl FakeFetcher {
        fn respond(&self, url: &str, response: Result<&str, FetchError>) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response.map(str::to_string));
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), Instant::now()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Other("no fixture".into())))
        }
    }

    #[derive(Debug, Default)]
    struct SinkLog {
        ensure_calls: usize,
        published: Vec<(String, Value, bool)>,
        disconnects: usize,
    }

    #[derive(Clone, Default)]
    struct FakeSink {
        /// Scripted `ensure_connected` answers; `true` once exhausted.
        connect_script: Arc<Mutex<VecDeque<bool>>>,
        log: Arc<Mutex<SinkLog>>,
    }

    impl FakeSink {
        fn failing_first(n: usize) -> Self {
            let sink = Self::default();
            sink.connect_script
                .lock()
                .unwrap()
                .extend(std::iter::repeat(false).take(n));
            sink
        }

        fn published(&self) -> Vec<(String, Value, bool)> {
            self.log.lock().unwrap().published.clone()
        }

        fn disconnects(&self) -> usize {
            self.log.lock().unwrap().disconnects
        }

        fn ensure_calls(&self) -> usize {
            self.log.lock().unwrap().ensure_calls
        }
    }

    #[async_trait]
    impl MessageSink for FakeSink {
        async fn ensure_connected(&mut self) -> bool {
            self.log.lock().unwrap().ensure_calls += 1;
            self.connect_script.lock().unwrap().pop_front().unwrap_or(true)
        }

        async fn publish(&mut self, topic: &str, value: &Value, retain: bool) {
            self.log
                .lock()
                .unwrap()
                .published
                .push((topic.to_string(), value.clone(), retain));
        }

        async fn disconnect(&mut self) {
            self.log.lock().unwrap().disconnects += 1;
        }
    }

    const URL_A: &str = "http://a.local/api";
    const URL_B: &str = "http://b.local/api";

    fn path(keys: &[&str]) -> Vec<PathSegment> {
        keys.iter().map(|k| PathSegment::Key(k.to_string())).collect()
    }

    fn endpoint(url: &str, topics: Vec<TopicSpec>) -> EndpointConfig {
        topics
            .into_iter()
            .fold(EndpointConfig::builder(url), |e, t| e.topic(t))
            .build()
    }

    fn bridge(
        endpoints: Vec<EndpointConfig>,
        fetcher: &FakeFetcher,
        sink: &FakeSink,
    ) -> Bridge<FakeFetcher, FakeSink> {
        Bridge::new(
            endpoints,
            fetcher.clone(),
            sink.clone(),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_publishes_extracted_value_every_tick() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok(r#"{"a":{"b":5}}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![endpoint(URL_A, vec![TopicSpec::new("topic1", path(&["a", "b"]))])],
            &fetcher,
            &sink,
        );

        let report = bridge.tick().await;
        assert!(report.connected);
        assert_eq!(report.published, 1);
        assert!(report.failures.is_empty());

        bridge.tick().await;
        let expected = ("topic1".to_string(), json!(5), false);
        assert_eq!(sink.published(), vec![expected.clone(), expected]);
    }

    #[tokio::test]
    async fn test_missing_field_skips_only_that_topic() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok(r#"{"a":{"b":5}}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![endpoint(
                URL_A,
                vec![
                    TopicSpec::new("missing", path(&["a", "c"])),
                    TopicSpec::new("present", path(&["a", "b"])).retain(true),
                ],
            )],
            &fetcher,
            &sink,
        );

        let report = bridge.tick().await;
        assert_eq!(sink.published(), vec![("present".to_string(), json!(5), true)]);
        assert!(matches!(
            &report.failures[..],
            [TickFailure::Extract { topic, .. }] if topic == "missing"
        ));
    }

    #[tokio::test]
    async fn test_factor_scales_numeric_strings() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok(r#"{"v":"12.5","s":"abc"}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![endpoint(
                URL_A,
                vec![
                    TopicSpec::new("scaled", path(&["v"])).factor(2.0),
                    TopicSpec::new("text", path(&["s"])).factor(2.0),
                    TopicSpec::new("raw", path(&["s"])),
                ],
            )],
            &fetcher,
            &sink,
        );

        let report = bridge.tick().await;
        assert_eq!(
            sink.published(),
            vec![
                ("scaled".to_string(), json!(25.0), false),
                ("raw".to_string(), json!("abc"), false),
            ]
        );
        assert_eq!(
            report.failures,
            vec![TickFailure::Convert {
                topic: "text".into(),
                error: ConversionError { value: json!("abc") },
            }]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_block_other_endpoints() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Err(FetchError::Timeout));
        fetcher.respond(URL_B, Ok(r#"{"x":1}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![
                endpoint(URL_A, vec![TopicSpec::new("a", path(&["x"]))]),
                endpoint(URL_B, vec![TopicSpec::new("b", path(&["x"]))]),
            ],
            &fetcher,
            &sink,
        );

        let report = bridge.tick().await;
        assert_eq!(sink.published(), vec![("b".to_string(), json!(1), false)]);
        assert_eq!(
            report.failures,
            vec![TickFailure::Fetch {
                url: URL_A.into(),
                error: FetchError::Timeout,
            }]
        );
    }

    #[tokio::test]
    async fn test_invalid_json_skips_endpoint() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok("<html>maintenance</html>"));
        fetcher.respond(URL_B, Ok(r#"{"x":[10,20]}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![
                endpoint(URL_A, vec![TopicSpec::new("a", path(&["x"]))]),
                endpoint(
                    URL_B,
                    vec![TopicSpec::new(
                        "b",
                        vec![PathSegment::Key("x".into()), PathSegment::Index(1)],
                    )],
                ),
            ],
            &fetcher,
            &sink,
        );

        let report = bridge.tick().await;
        assert_eq!(sink.published(), vec![("b".to_string(), json!(20), false)]);
        assert!(matches!(
            &report.failures[..],
            [TickFailure::Parse { url, .. }] if url == URL_A
        ));
    }

    #[tokio::test]
    async fn test_publish_order_follows_configuration() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok(r#"{"p":1,"q":2}"#));
        fetcher.respond(URL_B, Ok(r#"{"r":3}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![
                endpoint(
                    URL_A,
                    vec![
                        TopicSpec::new("q", path(&["q"])),
                        TopicSpec::new("p", path(&["p"])),
                    ],
                ),
                endpoint(URL_B, vec![TopicSpec::new("r", path(&["r"]))]),
            ],
            &fetcher,
            &sink,
        );

        bridge.tick().await;
        let topics: Vec<_> = sink.published().into_iter().map(|(t, _, _)| t).collect();
        assert_eq!(topics, ["q", "p", "r"]);
        let urls: Vec<_> = fetcher.calls().into_iter().map(|(u, _)| u).collect();
        assert_eq!(urls, [URL_A, URL_B]);
    }

    #[tokio::test]
    async fn test_unreachable_broker_skips_whole_tick() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok(r#"{"x":1}"#));
        let sink = FakeSink::failing_first(1);
        let mut bridge = bridge(
            vec![endpoint(URL_A, vec![TopicSpec::new("a", path(&["x"]))])],
            &fetcher,
            &sink,
        );

        let report = bridge.tick().await;
        assert!(!report.connected);
        assert!(fetcher.calls().is_empty());
        assert!(sink.published().is_empty());

        let report = bridge.tick().await;
        assert!(report.connected);
        assert_eq!(sink.ensure_calls(), 2);
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(sink.published().len(), 1);
    }

    async fn run_for(bridge: &mut Bridge<FakeFetcher, FakeSink>, duration: Duration) {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::join!(bridge.run(shutdown), async move {
            tokio::time::sleep(duration).await;
            trigger.cancel();
        });
    }

    fn tick_gaps(fetcher: &FakeFetcher) -> Vec<Duration> {
        fetcher
            .calls()
            .windows(2)
            .map(|w| w[1].1 - w[0].1)
            .collect()
    }

    fn assert_close(actual: Duration, expected: Duration) {
        let tolerance = Duration::from_millis(5);
        assert!(
            actual >= expected && actual <= expected + tolerance,
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_start_one_period_apart() {
        let fetcher = FakeFetcher {
            delay: Duration::from_secs(3),
            ..FakeFetcher::default()
        };
        fetcher.respond(URL_A, Ok(r#"{"x":1}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![endpoint(URL_A, vec![TopicSpec::new("a", path(&["x"]))])],
            &fetcher,
            &sink,
        );

        run_for(&mut bridge, Duration::from_secs(25)).await;

        let gaps = tick_gaps(&fetcher);
        assert_eq!(gaps.len(), 2);
        for gap in gaps {
            assert_close(gap, Duration::from_secs(10));
        }
        assert_eq!(sink.published().len(), 3);
        assert_eq!(sink.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_tick_starts_next_immediately() {
        let fetcher = FakeFetcher {
            delay: Duration::from_secs(15),
            ..FakeFetcher::default()
        };
        fetcher.respond(URL_A, Ok(r#"{"x":1}"#));
        let sink = FakeSink::default();
        let mut bridge = bridge(
            vec![endpoint(URL_A, vec![TopicSpec::new("a", path(&["x"]))])],
            &fetcher,
            &sink,
        );

        run_for(&mut bridge, Duration::from_secs(40)).await;

        let gaps = tick_gaps(&fetcher);
        assert!(gaps.len() >= 2);
        for gap in gaps {
            assert_close(gap, Duration::from_secs(15));
        }
        assert_eq!(sink.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok(r#"{"x":1}"#));
        let sink = FakeSink::default();
        let mut bridge = Bridge::new(
            vec![endpoint(URL_A, vec![TopicSpec::new("a", path(&["x"]))])],
            fetcher.clone(),
            sink.clone(),
            Duration::from_secs(600),
        );

        let started = Instant::now();
        run_for(&mut bridge, Duration::from_secs(1)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(sink.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_only_disconnects() {
        let fetcher = FakeFetcher::default();
        let sink = FakeSink::default();
        let mut bridge = bridge(Vec::new(), &fetcher, &sink);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        bridge.run(shutdown).await;

        assert_eq!(sink.ensure_calls(), 0);
        assert_eq!(sink.disconnects(), 1);
    }

    /// Accept one MQTT client, acknowledge its CONNECT and forward the rest
    /// of its traffic.
    async fn one_shot_broker() -> (u16, tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                return;
            }
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        (port, rx)
    }

    #[tokio::test]
    async fn test_wildcard_topic_does_not_drop_session() {
        let (port, mut rx) = one_shot_broker().await;
        let config = BrokerConfig::builder("127.0.0.1")
            .port(port)
            .connect_timeout(Duration::from_secs(2))
            .build();
        let fetcher = FakeFetcher::default();
        fetcher.respond(URL_A, Ok(r#"{"a":1,"b":2}"#));
        let mut bridge = Bridge::new(
            vec![endpoint(
                URL_A,
                vec![
                    TopicSpec::new("sensors/#", path(&["a"])),
                    TopicSpec::new("sensors/ok", path(&["b"])),
                ],
            )],
            fetcher,
            MqttConnection::new(config),
            Duration::from_secs(10),
        );

        let report = bridge.tick().await;
        assert!(report.connected);
        assert!(bridge.sink.is_connected());

        let mut seen = Vec::new();
        let wait = async {
            while let Some(chunk) = rx.recv().await {
                seen.extend_from_slice(&chunk);
                if seen.windows(10).any(|w| w == b"sensors/ok") {
                    break;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
        assert!(!seen.windows(9).any(|w| w == b"sensors/#"));

        // Same session: the broker above accepts only one client.
        assert!(bridge.tick().await.connected);
        bridge.sink.disconnect().await;
    }
}
