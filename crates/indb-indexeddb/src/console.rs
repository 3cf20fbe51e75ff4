//! Browser console observer

use indb_core::logging::prefix;
use indb_core::{StoreEvent, StoreObserver};
use wasm_bindgen::JsValue;

/// Writes store events to `console.log`, failures to `console.error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleObserver;

impl StoreObserver for ConsoleObserver {
    fn log(&self, event: &StoreEvent) {
        let line = JsValue::from_str(&format!("{} {}", prefix::DB, event));
        if event.is_failure() {
            web_sys::console::error_1(&line);
        } else {
            web_sys::console::log_1(&line);
        }
    }
}
