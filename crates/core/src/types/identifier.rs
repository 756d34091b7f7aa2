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
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

use crate::types::error::{CacheError, Result};

/// Section that content-addressed identifiers are filed under.
pub const HASH_SECTION: &str = "_hashes";

fn plain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^[a-z0-9_.\-]*$").expect("static pattern compiles"))
}

/// A normalized cache identifier.
///
/// Always matches `^[a-z0-9_.\-]+$` (case-insensitive) with no empty
/// dot-separated segment. Everything before the last `.` is the section,
/// the last segment is the leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Normalizes any serializable value into an identifier.
    ///
    /// Strings and integers made of `[a-z0-9_.-]` pass through unchanged.
    /// Every other shape (maps, lists, booleans, floats, strings with other
    /// characters) is serialized canonically, with map keys sorted, and
    /// hashed into `_hashes.<sha256>`. Map identifiers therefore do not depend
    /// on insertion order; list identifiers do.
    pub fn new<T: Serialize + ?Sized>(identifier: &T) -> Result<Self> {
        let value = serde_json::to_value(identifier)
            .map_err(|e| CacheError::InvalidIdentifier(e.to_string()))?;

        match value {
            Value::Null => Err(CacheError::InvalidIdentifier(
                "identifier may not be null".to_string(),
            )),
            Value::String(ref s) if s.is_empty() => Err(CacheError::InvalidIdentifier(
                "identifier may not be empty".to_string(),
            )),
            Value::String(s) if plain_pattern().is_match(&s) => Self::from_plain(s),
            Value::Number(ref n) if n.is_i64() || n.is_u64() => Self::from_plain(n.to_string()),
            other => Self::hashed(&other),
        }
    }

    /// Normalizes a list of dependency identifiers, keeping their order.
    pub fn many<T: Serialize>(identifiers: &[T]) -> Result<Vec<Self>> {
        identifiers.iter().map(|id| Self::new(id)).collect()
    }

    fn from_plain(s: String) -> Result<Self> {
        if s.split('.').any(str::is_empty) {
            return Err(CacheError::InvalidIdentifier(format!(
                "identifier '{}' contains an empty section segment",
                s
            )));
        }
        Ok(Identifier(s))
    }

    fn hashed(value: &Value) -> Result<Self> {
        let canonical = canonicalize(value);
        let bytes = serde_json::to_vec(&canonical)
            .map_err(|e| CacheError::InvalidIdentifier(e.to_string()))?;
        let digest = Sha256::digest(&bytes);
        Ok(Identifier(format!("{}.{}", HASH_SECTION, hex::encode(digest))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Section path, empty for identifiers in the root section.
    pub fn section(&self) -> &str {
        self.0.rsplit_once('.').map(|(section, _)| section).unwrap_or("")
    }

    /// Last dot-separated segment.
    pub fn leaf(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, leaf)| leaf).unwrap_or(&self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Checks a section path given to a bulk purge.
pub fn validate_section(section: &str) -> Result<()> {
    if section.is_empty()
        || !plain_pattern().is_match(section)
        || section.split('.').any(str::is_empty)
    {
        return Err(CacheError::InvalidIdentifier(format!(
            "invalid section path '{}'",
            section
        )));
    }
    Ok(())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_plain_identifiers_pass_through() {
        assert_eq!(Identifier::new("user.42").unwrap().as_str(), "user.42");
        assert_eq!(Identifier::new("My-Key_1").unwrap().as_str(), "My-Key_1");
        assert_eq!(Identifier::new(&42u32).unwrap().as_str(), "42");
        assert_eq!(Identifier::new(&-7i64).unwrap().as_str(), "-7");
    }

    #[test]
    fn test_empty_and_null_are_rejected() {
        assert!(matches!(
            Identifier::new(""),
            Err(CacheError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Identifier::new(&Option::<String>::None),
            Err(CacheError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Identifier::new("a..b"),
            Err(CacheError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_structured_identifiers_are_hashed() {
        let id = Identifier::new(&vec!["a", "b"]).unwrap();
        assert_eq!(id.section(), HASH_SECTION);
        assert_eq!(id.leaf().len(), 64);

        let spaced = Identifier::new("has spaces").unwrap();
        assert!(spaced.as_str().starts_with("_hashes."));

        let flag = Identifier::new(&true).unwrap();
        assert!(flag.as_str().starts_with("_hashes."));
    }

    #[test]
    fn test_distinct_structures_hash_apart() {
        let empty_input_digest = format!("{}.{}", HASH_SECTION, hex::encode(Sha256::digest(b"")));
        let ids = [
            Identifier::new(&vec![1, 2]).unwrap(),
            Identifier::new(&vec![2, 1]).unwrap(),
            Identifier::new(&Vec::<i32>::new()).unwrap(),
            Identifier::new(&true).unwrap(),
            Identifier::new(&1.5f64).unwrap(),
        ];
        for (i, id) in ids.iter().enumerate() {
            assert_ne!(id.as_str(), empty_input_digest);
            for other in &ids[i + 1..] {
                assert_ne!(id, other);
            }
        }
    }

    #[test]
    fn test_non_finite_float_is_not_hashed_to_a_shared_key() {
        // serde_json turns NaN into null, which is rejected like any null.
        assert!(matches!(
            Identifier::new(&f64::NAN),
            Err(CacheError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_map_identifiers_ignore_insertion_order() {
        let mut first = HashMap::new();
        first.insert("b", 2);
        first.insert("a", 1);
        let mut second = BTreeMap::new();
        second.insert("a", 1);
        second.insert("b", 2);

        assert_eq!(
            Identifier::new(&first).unwrap(),
            Identifier::new(&second).unwrap()
        );
    }

    #[test]
    fn test_section_and_leaf() {
        let id = Identifier::new("a.b.c").unwrap();
        assert_eq!(id.section(), "a.b");
        assert_eq!(id.leaf(), "c");

        let bare = Identifier::new("root").unwrap();
        assert_eq!(bare.section(), "");
        assert_eq!(bare.leaf(), "root");
    }

    #[test]
    fn test_validate_section() {
        assert!(validate_section("a.b").is_ok());
        assert!(validate_section("").is_err());
        assert!(validate_section("a/b").is_err());
        assert!(validate_section("a.").is_err());
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent_for_strings(s in "\\PC{1,24}") {
            if let Ok(id) = Identifier::new(&s) {
                prop_assert_eq!(Identifier::new(&id).unwrap(), id);
            }
        }

        #[test]
        fn prop_normalize_is_idempotent_for_lists(items in proptest::collection::vec(any::<i32>(), 0..8)) {
            let id = Identifier::new(&items).unwrap();
            prop_assert_eq!(Identifier::new(&id).unwrap(), id);
        }

        #[test]
        fn prop_normalize_is_idempotent_for_integers(n in any::<i64>()) {
            let id = Identifier::new(&n).unwrap();
            prop_assert_eq!(id.as_str(), n.to_string());
            prop_assert_eq!(Identifier::new(&id).unwrap(), id);
        }
    }
}
