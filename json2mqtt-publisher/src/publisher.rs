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

//! Utility functions for serializing extracted values to MQTT payloads.

use serde_json::Value;

/// Render a value as its natural scalar payload.
///
/// Strings are sent verbatim (no quotes), numbers and booleans as their
/// textual form, `null` as an empty payload. Arrays and objects fall back
/// to compact JSON.
pub fn render_payload(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}
