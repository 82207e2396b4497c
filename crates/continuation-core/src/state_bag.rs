//! Ordered key/value state carried across a migration or reversal.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single typed value in a [`StateBag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// Raw bytes (base64 on the wire).
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for StateValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Ordered mapping of string keys to typed values.
///
/// Produced by the ability when saving, consumed by the same ability type
/// when restoring. The continuation machinery never looks inside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateBag {
    params: BTreeMap<String, StateValue>,
}

impl StateBag {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.params.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Get a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.params.get(key)
    }

    /// Get a string value by key.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.params.get(key) {
            Some(StateValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Get an int value by key.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.params.get(key) {
            Some(StateValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<StateValue> {
        self.params.remove(key)
    }

    /// Copy every entry of `other` into this bag.
    pub fn merge(&mut self, other: &Self) {
        for (k, v) in &other.params {
            self.params.insert(k.clone(), v.clone());
        }
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for StateBag
where
    K: Into<String>,
    V: Into<StateValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.set(k, v);
        }
        bag
    }
}

mod base64_bytes {
    use base64::Engine as _;

    use super::{BASE64, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_ordered() {
        let bag = StateBag::new().with("zeta", 1).with("alpha", "a").with("mid", true);
        let keys: Vec<&str> = bag.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_typed_getters() {
        let bag = StateBag::new().with("k", "v").with("n", 7);
        assert_eq!(bag.get_string("k"), Some("v"));
        assert_eq!(bag.get_int("n"), Some(7));
        assert_eq!(bag.get_int("k"), None);
        assert_eq!(bag.get_string("missing"), None);
    }

    #[test]
    fn test_merge_overwrites() {
        let mut base = StateBag::new().with("a", 1).with("b", 2);
        let other = StateBag::new().with("b", 20).with("c", 30);
        base.merge(&other);

        assert_eq!(base.len(), 3);
        assert_eq!(base.get_int("b"), Some(20));
    }

    #[test]
    fn test_bytes_are_base64_on_the_wire() {
        let bag = StateBag::new().with("blob", vec![0_u8, 1, 2, 255]);
        let json = serde_json::to_string(&bag).unwrap();
        assert!(json.contains("AAEC/w=="));

        let parsed: StateBag = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, bag);
    }
}
