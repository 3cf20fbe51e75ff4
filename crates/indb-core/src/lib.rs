//! Configuration-driven wrapper over an embedded object store.
//!
//! A [`StoreHandle`] turns a fixed [`StoreConfig`] (database name, store name,
//! key path, secondary indexes) into requests against a host storage engine
//! injected at construction, and resolves each request to a typed result.
//!
//! Host engines implement the [`host`] traits. This crate ships
//! [`MemoryEngine`]; the `indb-indexeddb` crate provides the browser one.
//!
//! # Example
//!
//! ```rust
//! use indb_core::{Lookup, MemoryEngine, StoreConfig, StoreHandle};
//! use serde_json::json;
//!
//! # async fn run() -> indb_core::StoreResult<()> {
//! let config = StoreConfig::new("library")
//!     .store_name("books")
//!     .index("name", "name", false);
//! let store = StoreHandle::new(config, MemoryEngine::new());
//!
//! store.open().await?;
//! store.add_record(&json!({"id": 1, "name": "a"})).await?;
//!
//! let found = store.get_record_from_index("name", "a").await?;
//! assert!(matches!(found, Lookup::Found(ref r) if r["id"] == 1));
//!
//! store.delete_record(1).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod host;
pub mod logging;
pub mod memory;
pub mod observer;
pub mod record;

pub use config::{IndexSpec, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use handle::StoreHandle;
pub use host::{Connection, HostEngine, SchemaUpgrade, StoreAccessor, TxMode, UpgradeFn};
pub use memory::{DatabaseSchema, MemoryEngine, ObjectStoreSchema};
pub use observer::{RecordingObserver, StoreEvent, StoreObserver, TracingObserver};
pub use record::{Key, Lookup, Record};
