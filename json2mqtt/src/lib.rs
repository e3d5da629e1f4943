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

//! Poll JSON APIs on a fixed schedule and republish selected values over MQTT.
//!
//! The [`Bridge`] ties a [`Fetch`](json2mqtt_source::Fetch) implementation
//! to a [`MessageSink`](json2mqtt_publisher::MessageSink); [`Settings`]
//! turns a configuration file into the pieces both need.

pub mod bridge;
pub mod logging;
pub mod settings;

pub use bridge::{Bridge, TickFailure, TickReport};
pub use settings::Settings;
