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

//! Value mapping: locating a field inside a JSON document and scaling it.

use serde_json::{Number, Value};
use thiserror::Error;

use crate::config::PathSegment;

/// Why a path segment could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// The object has no member with the requested key.
    NoSuchKey,
    /// The array is shorter than the requested index.
    IndexOutOfRange { len: usize },
    /// A key was requested but the node is not an object.
    NotAnObject,
    /// An index was requested but the node is not an array.
    NotAnArray,
}

impl std::fmt::Display for MissReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissReason::NoSuchKey => write!(f, "no such key"),
            MissReason::IndexOutOfRange { len } => write!(f, "index out of range (len {len})"),
            MissReason::NotAnObject => write!(f, "not an object"),
            MissReason::NotAnArray => write!(f, "not an array"),
        }
    }
}

/// A field path that did not resolve against a document.
///
/// `node` is the part of the document where the walk stopped.
#[derive(Debug, Error)]
#[error("missing field {segment} at position {position}: {reason}")]
pub struct MissingField<'a> {
    pub position: usize,
    pub segment: PathSegment,
    pub reason: MissReason,
    pub node: &'a Value,
}

/// A factor was configured but the value has no numeric reading.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {value} to a number")]
pub struct ConversionError {
    pub value: Value,
}

/// Walks `path` from the root of `document` and returns the addressed value.
pub fn extract<'a>(
    document: &'a Value,
    path: &[PathSegment],
) -> Result<&'a Value, MissingField<'a>> {
    let mut node = document;
    for (position, segment) in path.iter().enumerate() {
        let miss = move |reason| MissingField {
            position,
            segment: segment.clone(),
            reason,
            node,
        };

        node = match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => {
                map.get(key).ok_or_else(|| miss(MissReason::NoSuchKey))?
            }
            (PathSegment::Index(index), Value::Array(items)) => {
                resolve_index(*index, items.len())
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| miss(MissReason::IndexOutOfRange { len: items.len() }))?
            }
            (PathSegment::Key(_), _) => return Err(miss(MissReason::NotAnObject)),
            (PathSegment::Index(_), _) => return Err(miss(MissReason::NotAnArray)),
        };
    }
    Ok(node)
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        usize::try_from(index).ok()
    } else {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
    }
}

/// Applies an optional `factor` to an extracted value.
///
/// Without a factor the value passes through untouched, whatever its type.
/// With a factor the value is read as a float (numbers, numeric strings and
/// booleans qualify) and multiplied.
pub fn transform(value: &Value, factor: Option<f64>) -> Result<Value, ConversionError> {
    let Some(factor) = factor else {
        return Ok(value.clone());
    };

    let conversion_error = || ConversionError {
        value: value.clone(),
    };
    let number = as_float(value).ok_or_else(conversion_error)?;

    Number::from_f64(number * factor)
        .map(Value::Number)
        .ok_or_else(conversion_error)
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
