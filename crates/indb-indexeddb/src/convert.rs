//! JS <-> record and key conversion
//!
//! Records cross the boundary as JSON, the same way the store's values are
//! shaped: plain objects of strings, numbers, booleans, arrays and nulls.

use indb_core::{Key, Record, StoreError, StoreResult};
use wasm_bindgen::JsValue;

/// Convert a record into a JS value the store can clone.
pub fn record_to_js(record: &Record) -> StoreResult<JsValue> {
    let json = serde_json::to_string(record)?;
    js_sys::JSON::parse(&json).map_err(|e| StoreError::DataClone(crate::idb::describe(&e)))
}

/// Convert a JS value into a record.
///
/// Values JSON cannot express (BigInt, cyclic objects, functions at the top
/// level) fail with `DataClone`.
pub fn js_to_record(val: &JsValue) -> StoreResult<Record> {
    if val.is_undefined() {
        return Err(StoreError::DataClone("undefined is not a record".into()));
    }
    let json = js_sys::JSON::stringify(val)
        .map_err(|e| StoreError::DataClone(crate::idb::describe(&e)))?;
    let json = json
        .as_string()
        .ok_or_else(|| StoreError::DataClone("value has no JSON form".into()))?;
    Ok(serde_json::from_str(&json)?)
}

pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Int(n) => JsValue::from_f64(*n as f64),
        Key::Float(f) => JsValue::from_f64(*f),
        Key::Text(s) => JsValue::from_str(s),
    }
}

/// Interpret a JS value as a key. Numbers other than NaN and strings are
/// keys; every key a store hands back for a record added through
/// [`record_to_js`] converts.
pub fn js_to_key(val: &JsValue) -> StoreResult<Key> {
    if let Some(n) = val.as_f64() {
        return Key::number(n);
    }
    val.as_string()
        .map(Key::Text)
        .ok_or_else(|| StoreError::InvalidKey(crate::idb::describe(val)))
}

/// `None` for the `undefined` a store returns when nothing matched.
pub fn js_to_optional_record(val: &JsValue) -> StoreResult<Option<Record>> {
    if val.is_undefined() || val.is_null() {
        return Ok(None);
    }
    js_to_record(val).map(Some)
}
