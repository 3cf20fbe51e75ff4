//! Host storage engine contract
//!
//! The wrapper never talks to a concrete database. It is handed a
//! [`HostEngine`] at construction and drives it through these traits:
//!
//! - **Memory**: [`MemoryEngine`](crate::MemoryEngine), for native use and tests
//! - **IndexedDB**: `IdbEngine` in the `indb-indexeddb` crate (browser WASM)
//!
//! Every request resolves exactly once, to a value or to an error. Futures
//! produced here are not `Send`; hosts like IndexedDB are single-threaded.

use crate::config::IndexSpec;
use crate::error::StoreResult;
use crate::record::{Key, Record};

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

impl TxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxMode::ReadOnly => "readonly",
            TxMode::ReadWrite => "readwrite",
        }
    }
}

/// Schema operations, only available inside the upgrade hook.
pub trait SchemaUpgrade {
    /// Version stored before this upgrade (0 for a new database).
    fn old_version(&self) -> u32;

    fn object_store_names(&self) -> Vec<String>;

    fn create_object_store(
        &mut self,
        name: &str,
        key_path: &str,
        auto_increment: bool,
    ) -> StoreResult<()>;

    fn index_names(&self, store: &str) -> StoreResult<Vec<String>>;

    /// Create a secondary index over `index.key` named `index.name`.
    fn create_index(&mut self, store: &str, index: &IndexSpec) -> StoreResult<()>;
}

/// Upgrade hook passed to [`HostEngine::open`].
///
/// Returning an error aborts the version change; the open then fails.
pub type UpgradeFn = Box<dyn FnOnce(&mut dyn SchemaUpgrade) -> StoreResult<()>>;

/// Accessor type reachable from an engine.
pub type AccessorOf<E> = <<E as HostEngine>::Connection as Connection>::Accessor;

/// Entry point of a host storage engine.
#[allow(async_fn_in_trait)]
pub trait HostEngine {
    type Connection: Connection;

    /// Open (or create) `name` at `version`.
    ///
    /// If the stored version is behind, `upgrade` runs before the connection
    /// is returned. Requesting a version lower than the stored one fails.
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn,
    ) -> StoreResult<Self::Connection>;

    /// Delete a database. Deleting a missing database succeeds.
    async fn delete_database(&self, name: &str) -> StoreResult<()>;
}

/// An opened database.
pub trait Connection {
    type Accessor: StoreAccessor;

    /// Begin a new transaction scoped to `store` and return its accessor.
    fn transaction(&self, store: &str, mode: TxMode) -> StoreResult<Self::Accessor>;

    fn version(&self) -> u32;
}

/// Store accessor bound to one transaction.
#[allow(async_fn_in_trait)]
pub trait StoreAccessor {
    fn mode(&self) -> TxMode;

    /// Insert a record, returning its primary key.
    ///
    /// Fails with `Constraint` on a duplicate key or unique index value.
    async fn add(&self, record: Record) -> StoreResult<Key>;

    async fn get(&self, key: &Key) -> StoreResult<Option<Record>>;

    /// Delete by key. Deleting a missing key succeeds.
    async fn delete(&self, key: &Key) -> StoreResult<()>;

    async fn clear(&self) -> StoreResult<()>;

    async fn count(&self) -> StoreResult<usize>;

    /// First record (lowest primary key) whose `index` value equals `value`.
    async fn index_get(&self, index: &str, value: &Key) -> StoreResult<Option<Record>>;

    /// Wait for the transaction to complete.
    async fn finish(self) -> StoreResult<()>;
}
