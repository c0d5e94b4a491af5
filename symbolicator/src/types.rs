use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// The attribute-map surface the host collector exposes to us. Values cover the
// handful of shapes the processors actually read and write - scalar metadata,
// plus the integer and string slices structured stack traces arrive in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    IntArray(Vec<i64>),
    StringArray(Vec<String>),
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::IntArray(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        AttrValue::StringArray(v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes(HashMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttrValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(AttrValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int_array(&self, key: &str) -> Option<&[i64]> {
        match self.0.get(key) {
            Some(AttrValue::IntArray(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_str_array(&self, key: &str) -> Option<&[String]> {
        match self.0.get(key) {
            Some(AttrValue::StringArray(v)) => Some(v),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// The slice of the host's trace/log data model we iterate. Mutation happens
// in place - records are never dropped or reordered.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpans {
    pub resource: Attributes,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLogs {
    pub resource: Attributes,
    pub records: Vec<LogRecord>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn typed_getters_reject_mismatched_shapes() {
        let mut attrs = Attributes::new();
        attrs.insert("lines", vec![1i64, 2, 3]);
        attrs.insert("message", "boom");

        assert_eq!(attrs.get_int_array("lines"), Some(&[1i64, 2, 3][..]));
        assert_eq!(attrs.get_str("message"), Some("boom"));
        assert_eq!(attrs.get_str("lines"), None);
        assert_eq!(attrs.get_int_array("message"), None);
    }

    #[test]
    fn attributes_round_trip_through_json() {
        let attrs: Attributes = [
            ("a", AttrValue::Int(3)),
            ("b", AttrValue::StringArray(vec!["x".to_string()])),
            ("c", AttrValue::Bool(true)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&attrs).unwrap();
        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(attrs, back);
    }
}
