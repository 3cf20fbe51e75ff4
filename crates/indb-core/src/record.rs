//! Records, keys and lookup results

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// A stored record: a JSON object keyed by the configured key path.
pub type Record = Value;

/// Primary key or index value.
///
/// Numbers sort before strings, and numbers compare by value: `Key::Int(2)`
/// equals `Key::Float(2.0)`. Integer and string keys never compare equal: a
/// record inserted under `Key::Int(1)` is not found by `Key::Text("1")`.
/// `Float` never holds NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Exact comparison of an integer against a non-NaN float.
fn cmp_int_float(n: i64, f: f64) -> Ordering {
    // 2^63, the first float above i64::MAX
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
    if f >= I64_BOUND {
        return Ordering::Less;
    }
    if f < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match n.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&f).unwrap_or(Ordering::Equal),
        other => other,
    }
}

impl Key {
    /// Build a numeric key. Integral values within `i64` become `Int`.
    pub fn number(n: f64) -> StoreResult<Self> {
        if n.is_nan() {
            return Err(StoreError::InvalidKey("NaN is not a key".into()));
        }
        let whole = n as i64;
        if cmp_int_float(whole, n) == Ordering::Equal {
            Ok(Key::Int(whole))
        } else {
            Ok(Key::Float(n))
        }
    }

    /// Interpret a JSON value as a key. Only numbers and strings are keys.
    pub fn from_value(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Key::Int(i)),
                (None, Some(f)) => Key::number(f),
                (None, None) => Err(StoreError::InvalidKey(format!("{} is not a key", n))),
            },
            Value::String(s) => Ok(Key::Text(s.clone())),
            other => Err(StoreError::InvalidKey(format!("{} is not a key", other))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::from(*n),
            Key::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Key::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Int(a), Key::Float(b)) => cmp_int_float(*a, *b),
            (Key::Float(a), Key::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Key::Float(a), Key::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Text(_), _) => Ordering::Greater,
            (_, Key::Text(_)) => Ordering::Less,
        }
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Int(n) => (0u8, *n).hash(state),
            Key::Float(f) => match Key::number(*f) {
                Ok(Key::Int(n)) => (0u8, n).hash(state),
                _ => (1u8, f.to_bits()).hash(state),
            },
            Key::Text(s) => (2u8, s).hash(state),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Float(n) => write!(f, "{}", n),
            Key::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

/// Read the key stored at `key_path` in a record.
///
/// Returns `Ok(None)` when the field is absent, and an error when the record
/// is not an object or the field holds something that cannot be a key,
/// `null` included.
pub fn key_at(record: &Record, key_path: &str) -> StoreResult<Option<Key>> {
    let obj = record
        .as_object()
        .ok_or_else(|| StoreError::InvalidKey("record is not an object".into()))?;
    obj.get(key_path).map(Key::from_value).transpose()
}

/// Outcome of a lookup by key or index value.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Record),
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn into_option(self) -> Option<Record> {
        match self {
            Lookup::Found(record) => Some(record),
            Lookup::NotFound => None,
        }
    }
}

impl From<Option<Record>> for Lookup {
    fn from(opt: Option<Record>) -> Self {
        match opt {
            Some(record) => Lookup::Found(record),
            None => Lookup::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_int_and_text_keys_differ() {
        assert_ne!(Key::from(1), Key::from("1"));
    }

    #[test]
    fn test_key_from_value() {
        assert_eq!(Key::from_value(&json!(7)).unwrap(), Key::Int(7));
        assert_eq!(Key::from_value(&json!("a")).unwrap(), Key::Text("a".into()));
        assert!(matches!(Key::from_value(&json!(1.5)).unwrap(), Key::Float(f) if f == 1.5));
        assert!(matches!(Key::from_value(&json!(3.0)).unwrap(), Key::Int(3)));
        assert!(Key::from_value(&json!(true)).is_err());
        assert!(Key::from_value(&json!([1])).is_err());
        assert!(Key::from_value(&json!(null)).is_err());
    }

    #[test]
    fn test_number_keys_compare_by_value() {
        assert_eq!(Key::Int(2), Key::Float(2.0));
        assert_eq!(Key::Float(-0.0), Key::Int(0));
        assert!(Key::Int(1) < Key::Float(1.5));
        assert!(Key::Float(-1.5) < Key::Int(-1));
        assert!(Key::Float(f64::INFINITY) > Key::Int(i64::MAX));
        assert!(Key::Float(f64::INFINITY) < Key::from(""));
        assert!(Key::number(f64::NAN).is_err());
        assert_eq!(Key::Float(1.5).to_value(), json!(1.5));
    }

    #[test]
    fn test_equal_number_keys_hash_alike() {
        let mut keys = HashSet::new();
        keys.insert(Key::Int(4));
        assert!(keys.contains(&Key::Float(4.0)));
        assert!(!keys.contains(&Key::Float(4.5)));
    }

    #[test]
    fn test_key_at() {
        let record = json!({"id": 3, "name": "a"});
        assert_eq!(key_at(&record, "id").unwrap(), Some(Key::Int(3)));
        assert_eq!(key_at(&record, "missing").unwrap(), None);
        assert!(key_at(&json!("scalar"), "id").is_err());
    }

    #[test]
    fn test_key_at_rejects_explicit_null() {
        let err = key_at(&json!({"id": null}), "id").unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
