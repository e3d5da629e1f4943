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

//! Logger setup.
//!
//! `RUST_LOG`, when set, has the final say. Otherwise the level starts at
//! `info` and may be changed once by the `logging` entry of the config file.

use log::{warn, LevelFilter};

const RUST_LOG: &str = "RUST_LOG";

/// Install the global `env_logger`. Call once, before anything logs.
pub fn init() {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Trace)
        .filter_module("rumqttc", LevelFilter::Warn)
        .parse_env(env_logger::Env::default());
    builder.init();

    if std::env::var_os(RUST_LOG).is_none() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Apply the level named in the config file.
pub fn apply_level(name: &str) {
    if std::env::var_os(RUST_LOG).is_some() {
        return;
    }
    match parse_level(name) {
        Some(level) => log::set_max_level(level),
        None => warn!("unknown logging level: {name}."),
    }
}

/// Map a level name to a filter. Case-insensitive; accepts the common
/// aliases `warning`, `critical` and `fatal`.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "critical" | "fatal" | "error" => Some(LevelFilter::Error),
        "warning" | "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}
