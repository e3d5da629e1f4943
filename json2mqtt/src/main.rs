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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use json2mqtt::settings::{self, Settings};
use json2mqtt::{logging, Bridge};
use json2mqtt_publisher::MqttConnection;
use json2mqtt_source::HttpFetcher;

#[derive(Parser)]
#[command(name = "json2mqtt", version, about = "Poll JSON APIs and publish values to MQTT")]
struct Cli {
    /// Path to the YAML/JSON configuration file. Defaults to the first of
    /// config.yaml, config.yml, config.json, /config/config.yaml that exists.
    #[arg(short, long, env = "JSON2MQTT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    info!("Starting json2mqtt v{}", env!("CARGO_PKG_VERSION"));

    let mut bridge = match build(&cli) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    bridge.run(shutdown).await;
    info!("Exited.");
}

fn build(cli: &Cli) -> Result<Bridge<HttpFetcher, MqttConnection>> {
    let path = settings::discover(cli.config.as_deref(), settings::CONFIG_CANDIDATES)?;
    info!("Loading configuration from {}", path.display());
    let settings = Settings::load(&path)?;

    if let Some(level) = &settings.logging {
        logging::apply_level(level);
    }

    let fetcher = HttpFetcher::new(&settings.fetcher_config()?).context("building HTTP client")?;
    let connection = MqttConnection::new(settings.broker_config()?);

    Ok(Bridge::new(
        settings.endpoints(),
        fetcher,
        connection,
        settings.update_rate()?,
    ))
}

/// Cancel `shutdown` on SIGINT or, on Unix, SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to register SIGTERM handler: {e}");
                wait_for_ctrl_c().await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = wait_for_ctrl_c() => {}
            _ = terminate.recv() => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    info!("Shutdown signal received");
    shutdown.cancel();
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
