//! IndexedDB host engine for indb (browser WASM)
//!
//! Implements the `indb-core` host traits over the browser's IndexedDB and
//! exposes the store handle to JavaScript.
//!
//! Because IndexedDB is callback-based, each request is adapted into a
//! future; a [`StoreHandle`](indb_core::StoreHandle) built on [`IdbEngine`]
//! behaves exactly like one built on the in-memory engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use indb_core::{StoreConfig, StoreHandle};
//! use indb_indexeddb::{ConsoleObserver, IdbEngine};
//!
//! let engine = IdbEngine::from_global()?;
//! let store = StoreHandle::new(StoreConfig::default(), engine).with_observer(ConsoleObserver);
//! store.open().await?;
//! store.add_record(&serde_json::json!({"biblioid": "b-1", "name": "a"})).await?;
//! ```

pub mod bindings;
pub mod console;
pub mod convert;
pub mod engine;
pub mod idb;

pub use bindings::JsInDb;
pub use console::ConsoleObserver;
pub use engine::{IdbAccessor, IdbConnection, IdbEngine};
