//! Browser bindings using wasm-bindgen
//!
//! Exposes the store handle to JavaScript as the `InDb` class. Every record
//! operation returns a Promise; failures reject with an `Error` and are also
//! written to the console.
//!
//! ```js
//! const db = new InDb(JSON.stringify({
//!   name: "library", storeName: "books", version: 1,
//!   keyPath: "id", autoIncrement: true,
//!   indexes: [{ key: "name", name: "name", unique: false }],
//! }));
//! await db.open();
//! await db.addRecord({ id: 1, name: "a" });
//! const book = await db.getRecordFromIndex("name", "a"); // undefined if none
//! ```

use std::rc::Rc;

use indb_core::{Lookup, StoreConfig, StoreError, StoreEvent, StoreHandle};
use js_sys::Promise;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::console::ConsoleObserver;
use crate::convert::{js_to_key, js_to_record, key_to_js, record_to_js};
use crate::engine::IdbEngine;

fn to_js_error(err: StoreError) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn lookup_to_js(lookup: Lookup) -> Result<JsValue, JsValue> {
    match lookup {
        Lookup::Found(record) => record_to_js(&record).map_err(to_js_error),
        Lookup::NotFound => Ok(JsValue::UNDEFINED),
    }
}

/// Store handle over the configured IndexedDB object store.
#[wasm_bindgen(js_name = InDb)]
pub struct JsInDb {
    inner: Rc<StoreHandle<IdbEngine>>,
}

#[wasm_bindgen(js_class = InDb)]
impl JsInDb {
    /// Create a handle from a JSON configuration, or the default one.
    #[wasm_bindgen(constructor)]
    pub fn new(config: Option<String>) -> Result<JsInDb, JsValue> {
        // Route Rust panics to console.error instead of "RuntimeError: unreachable"
        console_error_panic_hook::set_once();

        let config = match config {
            Some(json) => StoreConfig::from_json(&json).map_err(to_js_error)?,
            None => StoreConfig::default(),
        };
        let engine = IdbEngine::from_global().map_err(to_js_error)?;

        Ok(Self {
            inner: Rc::new(StoreHandle::new(config, engine).with_observer(ConsoleObserver)),
        })
    }

    /// Open the database. Resolves once the store is ready.
    pub fn open(&self) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move {
            store.open().await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Insert a record. Resolves to its primary key.
    ///
    /// Throws synchronously if the record cannot be cloned.
    #[wasm_bindgen(js_name = addRecord)]
    pub fn add_record(&self, record: JsValue) -> Result<Promise, JsValue> {
        let record = js_to_record(&record).map_err(|e| self.rejected("add", e))?;
        let store = self.inner.clone();
        Ok(future_to_promise(async move {
            let key = store.add_record(&record).await.map_err(to_js_error)?;
            Ok(key_to_js(&key))
        }))
    }

    /// Delete by primary key. Resolves to whether a record was removed.
    #[wasm_bindgen(js_name = deleteRecord)]
    pub fn delete_record(&self, key: JsValue) -> Result<Promise, JsValue> {
        let key = js_to_key(&key).map_err(|e| self.rejected("delete", e))?;
        let store = self.inner.clone();
        Ok(future_to_promise(async move {
            let deleted = store.delete_record(key).await.map_err(to_js_error)?;
            Ok(JsValue::from_bool(deleted))
        }))
    }

    /// Delete the record matching `value` in `index`, if any.
    #[wasm_bindgen(js_name = deleteRecordFromIndex)]
    pub fn delete_record_from_index(
        &self,
        index: String,
        value: JsValue,
    ) -> Result<Promise, JsValue> {
        let value = js_to_key(&value).map_err(|e| self.rejected("delete_from_index", e))?;
        let store = self.inner.clone();
        Ok(future_to_promise(async move {
            let deleted = store
                .delete_record_from_index(&index, value)
                .await
                .map_err(to_js_error)?;
            Ok(JsValue::from_bool(deleted))
        }))
    }

    #[wasm_bindgen(js_name = clearAll)]
    pub fn clear_all(&self) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move {
            store.clear_all().await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Resolves to the matching record, or `undefined`.
    #[wasm_bindgen(js_name = getRecordFromIndex)]
    pub fn get_record_from_index(
        &self,
        index: String,
        value: JsValue,
    ) -> Result<Promise, JsValue> {
        let value = js_to_key(&value).map_err(|e| self.rejected("get_from_index", e))?;
        let store = self.inner.clone();
        Ok(future_to_promise(async move {
            let found = store
                .get_record_from_index(&index, value)
                .await
                .map_err(to_js_error)?;
            lookup_to_js(found)
        }))
    }

    /// Resolves to the record stored under `key`, or `undefined`.
    #[wasm_bindgen(js_name = getRecord)]
    pub fn get_record(&self, key: JsValue) -> Result<Promise, JsValue> {
        let key = js_to_key(&key).map_err(|e| self.rejected("get", e))?;
        let store = self.inner.clone();
        Ok(future_to_promise(async move {
            let found = store.get_record(key).await.map_err(to_js_error)?;
            lookup_to_js(found)
        }))
    }

    pub fn count(&self) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move {
            let count = store.count().await.map_err(to_js_error)?;
            Ok(JsValue::from_f64(count as f64))
        })
    }
}

impl JsInDb {
    /// Log an argument error through the handle's observer before throwing.
    fn rejected(&self, operation: &'static str, error: StoreError) -> JsValue {
        self.inner.log(StoreEvent::Failed {
            operation,
            error: error.clone(),
        });
        to_js_error(error)
    }
}
