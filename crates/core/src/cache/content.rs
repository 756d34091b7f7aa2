// Copyright © 2026 Kirky.X
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

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::types::{CacheError, Result};

/// Leading byte of JSON content whose top level is a list or a map.
pub const JSON_ARRAY_MARKER: u8 = b'a';

const STRING_TYPES: &[&str] = &[
    "str",
    "&str",
    "alloc::string::String",
    "&alloc::string::String",
    "alloc::borrow::Cow<str>",
];

/// Codec between in-memory values and the raw content stored after the
/// envelope header. The serialized name is what the envelope records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentHandler {
    /// Plain string passthrough, no type recovery.
    String,
    /// JSON, list/map content prefixed with [`JSON_ARRAY_MARKER`].
    Json,
    /// MessagePack, round-trips any serde structure.
    #[default]
    Serialized,
}

impl fmt::Display for ContentHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHandler::String => write!(f, "string"),
            ContentHandler::Json => write!(f, "json"),
            ContentHandler::Serialized => write!(f, "serialized"),
        }
    }
}

impl FromStr for ContentHandler {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "string" => Ok(ContentHandler::String),
            "json" => Ok(ContentHandler::Json),
            "serialized" => Ok(ContentHandler::Serialized),
            _ => Err(CacheError::Configuration(format!(
                "Unknown content handler: {}",
                s
            ))),
        }
    }
}

impl ContentHandler {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            ContentHandler::String => match serde_json::to_value(value)? {
                Value::String(s) => Ok(s.into_bytes()),
                Value::Number(n) => Ok(n.to_string().into_bytes()),
                Value::Bool(b) => Ok(b.to_string().into_bytes()),
                Value::Null => Ok(Vec::new()),
                other => Err(CacheError::ContentHandler(format!(
                    "string handler cannot store {} content",
                    json_kind(&other)
                ))),
            },
            ContentHandler::Json => {
                let json = serde_json::to_value(value)?;
                let mut out = Vec::new();
                if matches!(json, Value::Array(_) | Value::Object(_)) {
                    out.push(JSON_ARRAY_MARKER);
                }
                serde_json::to_writer(&mut out, &json)?;
                Ok(out)
            }
            ContentHandler::Serialized => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            ContentHandler::String => {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| CacheError::ContentHandler(e.to_string()))?;
                Ok(serde_json::from_value(Value::String(text))?)
            }
            ContentHandler::Json => {
                let body = bytes.strip_prefix(&[JSON_ARRAY_MARKER]).unwrap_or(bytes);
                Ok(serde_json::from_slice(body)?)
            }
            ContentHandler::Serialized => Ok(rmp_serde::from_slice(bytes)?),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "list",
        Value::Object(_) => "map",
        _ => "scalar",
    }
}

/// Decides which handler a write uses.
///
/// Per-type overrides win, then the global override, then the default:
/// string types use [`ContentHandler::String`], everything else
/// [`ContentHandler::Serialized`]. Override keys may be the full
/// `std::any::type_name` or the path-stripped form (`Vec<String>`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerPolicy {
    pub forced: Option<ContentHandler>,
    pub by_type: HashMap<String, ContentHandler>,
}

impl HandlerPolicy {
    pub fn new(forced: Option<ContentHandler>, by_type: HashMap<String, ContentHandler>) -> Self {
        Self { forced, by_type }
    }

    pub fn select<T: ?Sized>(&self) -> ContentHandler {
        let full = type_name::<T>();
        if let Some(handler) = self
            .by_type
            .get(full)
            .or_else(|| self.by_type.get(&short_type_name(full)))
        {
            return *handler;
        }
        if let Some(handler) = self.forced {
            return handler;
        }
        if STRING_TYPES.contains(&full) {
            ContentHandler::String
        } else {
            ContentHandler::Serialized
        }
    }
}

/// `alloc::vec::Vec<alloc::string::String>` -> `Vec<String>`
pub fn short_type_name(full: &str) -> String {
    static MODULE_PATH: OnceLock<Regex> = OnceLock::new();
    MODULE_PATH
        .get_or_init(|| Regex::new(r"\b[a-z_][a-z0-9_]*::").expect("static pattern compiles"))
        .replace_all(full, "")
        .into_owned()
}
