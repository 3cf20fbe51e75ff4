//! Configuration-driven handle over one object store.
//!
//! A [`StoreHandle`] owns a [`StoreConfig`], the injected host engine, an
//! observer, and (after [`StoreHandle::open`]) the host connection. Each
//! record-level method starts a fresh transaction, issues its request and
//! resolves to a typed result. Outcomes are also reported to the observer.
//!
//! Operations issued without awaiting each other race freely; their order is
//! whatever the host's transaction scheduling makes of them.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use serde::Serialize;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::host::{
    AccessorOf, Connection, HostEngine, SchemaUpgrade, StoreAccessor, TxMode, UpgradeFn,
};
use crate::observer::{StoreEvent, StoreObserver, TracingObserver};
use crate::record::{key_at, Key, Lookup, Record};

/// Handle over the configured object store.
///
/// The connection moves from absent (CLOSED) to present (OPEN) exactly once.
/// There is no close operation; dropping the handle releases the connection.
pub struct StoreHandle<E: HostEngine> {
    config: StoreConfig,
    engine: E,
    connection: OnceCell<E::Connection>,
    observer: Box<dyn StoreObserver>,
}

impl<E: HostEngine> StoreHandle<E> {
    /// Create a closed handle. The configuration is stored as given.
    pub fn new(config: StoreConfig, engine: E) -> Self {
        Self {
            config,
            engine,
            connection: OnceCell::new(),
            observer: Box::new(TracingObserver),
        }
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: impl StoreObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_open(&self) -> bool {
        self.connection.get().is_some()
    }

    /// Report an event to the observer.
    pub fn log(&self, event: StoreEvent) {
        self.observer.log(&event);
    }

    /// Open the configured database, creating or upgrading it as needed.
    ///
    /// When the stored version is behind, the object store and each
    /// configured index are created before the connection is kept. Failure
    /// is logged and returned; nothing is retried.
    pub async fn open(&self) -> StoreResult<()> {
        if self.is_open() {
            return self.logged("open", Err(StoreError::AlreadyOpen));
        }

        let upgraded_from = Rc::new(Cell::new(None));
        let upgrade = schema_upgrade(self.config.clone(), upgraded_from.clone());

        let connection = self.logged(
            "open",
            self.engine
                .open(&self.config.name, self.config.version, upgrade)
                .await,
        )?;

        if let Some(from) = upgraded_from.get() {
            self.log(StoreEvent::Upgraded {
                name: self.config.name.clone(),
                from,
                to: connection.version(),
            });
        }

        let version = connection.version();
        if self.connection.set(connection).is_err() {
            return self.logged("open", Err(StoreError::AlreadyOpen));
        }

        self.log(StoreEvent::Opened {
            name: self.config.name.clone(),
            version,
        });
        Ok(())
    }

    /// Open, then call `on_ready` once the connection is kept.
    ///
    /// On failure the error is logged and `on_ready` is never called.
    pub async fn open_then<F: FnOnce()>(&self, on_ready: F) {
        if self.open().await.is_ok() {
            on_ready();
        }
    }

    /// Begin a new transaction on `store_name` and return its accessor.
    pub fn store(&self, store_name: &str, mode: TxMode) -> StoreResult<AccessorOf<E>> {
        self.connection
            .get()
            .ok_or(StoreError::NotOpen)?
            .transaction(store_name, mode)
    }

    fn configured_store(&self, mode: TxMode) -> StoreResult<AccessorOf<E>> {
        self.store(&self.config.store_name, mode)
    }

    /// Insert a record, returning its primary key.
    ///
    /// A record that cannot be turned into a host value fails with
    /// `DataClone` before any request is issued, and one whose key path holds
    /// something other than a number or string fails with `InvalidKey`.
    /// Duplicate keys and unique index violations come back as `Constraint`.
    pub async fn add_record<T: Serialize + ?Sized>(&self, record: &T) -> StoreResult<Key> {
        let value = serde_json::to_value(record)
            .map_err(|e| StoreError::DataClone(e.to_string()));
        let value = self.logged("add", value)?;
        self.logged("add", key_at(&value, &self.config.key_path))?;

        let key = self.logged("add", self.insert(value).await)?;
        self.log(StoreEvent::Inserted { key: key.clone() });
        Ok(key)
    }

    async fn insert(&self, record: Record) -> StoreResult<Key> {
        let accessor = self.configured_store(TxMode::ReadWrite)?;
        let key = accessor.add(record).await?;
        accessor.finish().await?;
        Ok(key)
    }

    /// Delete the record stored under `key`.
    ///
    /// Resolves to `false` without touching anything when no such record
    /// exists. The key type must match the one used at insertion.
    pub async fn delete_record(&self, key: impl Into<Key>) -> StoreResult<bool> {
        let key = key.into();
        let accessor = self.logged("delete", self.configured_store(TxMode::ReadWrite))?;
        let deleted = self.delete_record_in(&key, &accessor).await?;
        self.logged("delete", accessor.finish().await)?;
        Ok(deleted)
    }

    /// Delete the record stored under `key` using an existing accessor, so
    /// the lookup and the delete share its transaction.
    pub async fn delete_record_in(
        &self,
        key: &Key,
        accessor: &AccessorOf<E>,
    ) -> StoreResult<bool> {
        let existing = self.logged("delete", accessor.get(key).await)?;
        if existing.is_none() {
            self.log(StoreEvent::Missed {
                operation: "delete",
                key: key.clone(),
            });
            return Ok(false);
        }

        self.logged("delete", accessor.delete(key).await)?;
        self.log(StoreEvent::Deleted { key: key.clone() });
        Ok(true)
    }

    /// Delete the record whose `index_name` value equals `value`.
    ///
    /// The index lookup and the delete run in one read-write transaction.
    pub async fn delete_record_from_index(
        &self,
        index_name: &str,
        value: impl Into<Key>,
    ) -> StoreResult<bool> {
        let value = value.into();
        let accessor = self.logged(
            "delete_from_index",
            self.configured_store(TxMode::ReadWrite),
        )?;

        let found = self.logged(
            "delete_from_index",
            accessor.index_get(index_name, &value).await,
        )?;
        let Some(record) = found else {
            self.log(StoreEvent::Missed {
                operation: "delete_from_index",
                key: value,
            });
            return Ok(false);
        };

        let key = self.logged("delete_from_index", self.primary_key(&record))?;
        let deleted = self.delete_record_in(&key, &accessor).await?;
        self.logged("delete_from_index", accessor.finish().await)?;
        Ok(deleted)
    }

    /// Remove every record from the store.
    pub async fn clear_all(&self) -> StoreResult<()> {
        let result = async {
            let accessor = self.configured_store(TxMode::ReadWrite)?;
            accessor.clear().await?;
            accessor.finish().await
        }
        .await;

        self.logged("clear", result)?;
        self.log(StoreEvent::Cleared);
        Ok(())
    }

    /// Look a record up by secondary index value, in a read-only transaction.
    pub async fn get_record_from_index(
        &self,
        index_name: &str,
        value: impl Into<Key>,
    ) -> StoreResult<Lookup> {
        let value = value.into();
        let result = async {
            let accessor = self.configured_store(TxMode::ReadOnly)?;
            let found = accessor.index_get(index_name, &value).await?;
            accessor.finish().await?;
            Ok::<_, StoreError>(found)
        }
        .await;

        let found = self.logged("get_from_index", result)?;
        Ok(self.lookup("get_from_index", value, found))
    }

    /// Look a record up by primary key, in a read-only transaction.
    pub async fn get_record(&self, key: impl Into<Key>) -> StoreResult<Lookup> {
        let key = key.into();
        let result = async {
            let accessor = self.configured_store(TxMode::ReadOnly)?;
            let found = accessor.get(&key).await?;
            accessor.finish().await?;
            Ok::<_, StoreError>(found)
        }
        .await;

        let found = self.logged("get", result)?;
        Ok(self.lookup("get", key, found))
    }

    /// Number of records in the store.
    pub async fn count(&self) -> StoreResult<usize> {
        let result = async {
            let accessor = self.configured_store(TxMode::ReadOnly)?;
            let count = accessor.count().await?;
            accessor.finish().await?;
            Ok::<_, StoreError>(count)
        }
        .await;

        self.logged("count", result)
    }

    fn primary_key(&self, record: &Record) -> StoreResult<Key> {
        key_at(record, &self.config.key_path)?.ok_or_else(|| {
            StoreError::InvalidKey(format!(
                "matched record has no value at key path '{}'",
                self.config.key_path
            ))
        })
    }

    fn lookup(&self, operation: &'static str, key: Key, found: Option<Record>) -> Lookup {
        if found.is_none() {
            self.log(StoreEvent::Missed { operation, key });
        }
        Lookup::from(found)
    }

    fn logged<T>(&self, operation: &'static str, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(error) = &result {
            self.log(StoreEvent::Failed {
                operation,
                error: error.clone(),
            });
        }
        result
    }
}

/// Build the upgrade hook for `config`.
///
/// Creates the object store unless a previous version already did, then any
/// configured index it does not have yet, in configuration order. The
/// version the database was upgraded from is written to `upgraded_from`.
fn schema_upgrade(config: StoreConfig, upgraded_from: Rc<Cell<Option<u32>>>) -> UpgradeFn {
    Box::new(move |schema: &mut dyn SchemaUpgrade| {
        upgraded_from.set(Some(schema.old_version()));

        if !schema.object_store_names().contains(&config.store_name) {
            schema.create_object_store(
                &config.store_name,
                &config.key_path,
                config.auto_increment,
            )?;
        }

        let existing = schema.index_names(&config.store_name)?;
        for index in &config.indexes {
            if !existing.contains(&index.name) {
                schema.create_index(&config.store_name, index)?;
            }
        }
        Ok(())
    })
}
