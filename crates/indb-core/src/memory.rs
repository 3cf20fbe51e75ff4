//! In-memory host engine
//!
//! A HashMap-based stand-in for the browser's object store, for native use
//! and testing. Clones share the same databases, the way tabs share one
//! browser profile. Not persistent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::IndexSpec;
use crate::error::{StoreError, StoreResult};
use crate::host::{Connection, HostEngine, SchemaUpgrade, StoreAccessor, TxMode, UpgradeFn};
use crate::record::{key_at, Key, Record};

type Databases = HashMap<String, DatabaseState>;

#[derive(Debug, Clone, Default)]
struct DatabaseState {
    version: u32,
    stores: BTreeMap<String, ObjectStoreState>,
}

#[derive(Debug, Clone)]
struct IndexState {
    key_path: String,
    unique: bool,
}

#[derive(Debug, Clone)]
struct ObjectStoreState {
    key_path: String,
    auto_increment: bool,
    next_key: i64,
    indexes: BTreeMap<String, IndexState>,
    records: BTreeMap<Key, Record>,
}

/// Index values are only taken from fields holding valid keys; anything else
/// is simply not indexed.
fn index_value(record: &Record, key_path: &str) -> Option<Key> {
    key_at(record, key_path).ok().flatten()
}

impl ObjectStoreState {
    fn new(key_path: &str, auto_increment: bool) -> Self {
        Self {
            key_path: key_path.to_string(),
            auto_increment,
            next_key: 1,
            indexes: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    fn insert(&mut self, mut record: Record) -> StoreResult<Key> {
        let (key, generated) = match key_at(&record, &self.key_path)? {
            Some(key) => (key, false),
            None if self.auto_increment => (Key::Int(self.next_key), true),
            None => {
                return Err(StoreError::InvalidKey(format!(
                    "record has no value at key path '{}'",
                    self.key_path
                )))
            }
        };

        if self.records.contains_key(&key) {
            return Err(StoreError::Constraint(format!("key {} already exists", key)));
        }

        for (name, index) in self.indexes.iter().filter(|(_, i)| i.unique) {
            let Some(value) = index_value(&record, &index.key_path) else {
                continue;
            };
            let taken = self
                .records
                .values()
                .any(|r| index_value(r, &index.key_path).as_ref() == Some(&value));
            if taken {
                return Err(StoreError::Constraint(format!(
                    "unique index '{}' already contains {}",
                    name, value
                )));
            }
        }

        if generated {
            if let Some(obj) = record.as_object_mut() {
                obj.insert(self.key_path.clone(), key.to_value());
            }
        }
        if self.auto_increment {
            let next = match &key {
                Key::Int(n) => Some(n.saturating_add(1)),
                Key::Float(f) => Some((f.floor() as i64).saturating_add(1)),
                Key::Text(_) => None,
            };
            if let Some(next) = next.filter(|&n| n > self.next_key) {
                self.next_key = next;
            }
        }

        self.records.insert(key.clone(), record);
        Ok(key)
    }

    fn index_get(&self, name: &str, value: &Key) -> StoreResult<Option<Record>> {
        let index = self
            .indexes
            .get(name)
            .ok_or_else(|| StoreError::UnknownIndex(name.to_string()))?;
        Ok(self
            .records
            .values()
            .find(|r| index_value(r, &index.key_path).as_ref() == Some(value))
            .cloned())
    }
}

/// Schema of one object store, for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreSchema {
    pub name: String,
    pub key_path: String,
    pub auto_increment: bool,
    pub indexes: Vec<IndexSpec>,
}

/// Schema of a database, for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSchema {
    pub version: u32,
    pub stores: Vec<ObjectStoreSchema>,
}

/// In-memory host engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    databases: Arc<Mutex<Databases>>,
}

impl MemoryEngine {
    /// Create an engine with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the existing databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Current schema of a database, or `None` if it does not exist.
    pub fn schema(&self, name: &str) -> Option<DatabaseSchema> {
        let dbs = self.databases.lock();
        let db = dbs.get(name)?;
        Some(DatabaseSchema {
            version: db.version,
            stores: db
                .stores
                .iter()
                .map(|(store_name, store)| ObjectStoreSchema {
                    name: store_name.clone(),
                    key_path: store.key_path.clone(),
                    auto_increment: store.auto_increment,
                    indexes: store
                        .indexes
                        .iter()
                        .map(|(index_name, index)| {
                            IndexSpec::new(index.key_path.clone(), index_name.clone(), index.unique)
                        })
                        .collect(),
                })
                .collect(),
        })
    }
}

impl HostEngine for MemoryEngine {
    type Connection = MemoryConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn,
    ) -> StoreResult<MemoryConnection> {
        if version == 0 {
            return Err(StoreError::Open(
                "version must be a positive integer".into(),
            ));
        }

        let mut dbs = self.databases.lock();
        let current = dbs.get(name).cloned().unwrap_or_default();

        if version < current.version {
            return Err(StoreError::Open(format!(
                "requested version {} is lower than stored version {}",
                version, current.version
            )));
        }

        if version > current.version {
            // Upgrade on a scratch copy; only a successful hook is committed.
            let mut scratch = MemoryUpgrade {
                old_version: current.version,
                state: current,
            };
            upgrade(&mut scratch).map_err(|e| match e {
                StoreError::Upgrade(_) => e,
                other => StoreError::Upgrade(other.to_string()),
            })?;
            scratch.state.version = version;
            dbs.insert(name.to_string(), scratch.state);
        }

        Ok(MemoryConnection {
            databases: self.databases.clone(),
            name: name.to_string(),
            version,
        })
    }

    async fn delete_database(&self, name: &str) -> StoreResult<()> {
        self.databases.lock().remove(name);
        Ok(())
    }
}

/// Upgrade handle over a scratch copy of the database.
struct MemoryUpgrade {
    old_version: u32,
    state: DatabaseState,
}

impl MemoryUpgrade {
    fn store_mut(&mut self, store: &str) -> StoreResult<&mut ObjectStoreState> {
        self.state
            .stores
            .get_mut(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))
    }
}

impl SchemaUpgrade for MemoryUpgrade {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn object_store_names(&self) -> Vec<String> {
        self.state.stores.keys().cloned().collect()
    }

    fn create_object_store(
        &mut self,
        name: &str,
        key_path: &str,
        auto_increment: bool,
    ) -> StoreResult<()> {
        if self.state.stores.contains_key(name) {
            return Err(StoreError::Constraint(format!(
                "object store '{}' already exists",
                name
            )));
        }
        self.state
            .stores
            .insert(name.to_string(), ObjectStoreState::new(key_path, auto_increment));
        Ok(())
    }

    fn index_names(&self, store: &str) -> StoreResult<Vec<String>> {
        self.state
            .stores
            .get(store)
            .map(|s| s.indexes.keys().cloned().collect())
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))
    }

    fn create_index(&mut self, store: &str, index: &IndexSpec) -> StoreResult<()> {
        let state = self.store_mut(store)?;
        if state.indexes.contains_key(&index.name) {
            return Err(StoreError::Constraint(format!(
                "index '{}' already exists",
                index.name
            )));
        }

        if index.unique {
            let mut seen = Vec::new();
            for record in state.records.values() {
                if let Some(value) = index_value(record, &index.key) {
                    if seen.contains(&value) {
                        return Err(StoreError::Constraint(format!(
                            "existing records violate unique index '{}'",
                            index.name
                        )));
                    }
                    seen.push(value);
                }
            }
        }

        state.indexes.insert(
            index.name.clone(),
            IndexState {
                key_path: index.key.clone(),
                unique: index.unique,
            },
        );
        Ok(())
    }
}

/// Connection to an in-memory database.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    databases: Arc<Mutex<Databases>>,
    name: String,
    version: u32,
}

impl Connection for MemoryConnection {
    type Accessor = MemoryAccessor;

    fn transaction(&self, store: &str, mode: TxMode) -> StoreResult<MemoryAccessor> {
        let dbs = self.databases.lock();
        let db = dbs.get(&self.name).ok_or_else(|| {
            StoreError::Transaction(format!("database '{}' no longer exists", self.name))
        })?;
        if !db.stores.contains_key(store) {
            return Err(StoreError::UnknownStore(store.to_string()));
        }
        Ok(MemoryAccessor {
            databases: self.databases.clone(),
            database: self.name.clone(),
            store: store.to_string(),
            mode,
        })
    }

    fn version(&self) -> u32 {
        self.version
    }
}

/// Accessor for one object store. Each request applies atomically.
#[derive(Debug)]
pub struct MemoryAccessor {
    databases: Arc<Mutex<Databases>>,
    database: String,
    store: String,
    mode: TxMode,
}

impl MemoryAccessor {
    fn with_store<R>(
        &self,
        f: impl FnOnce(&mut ObjectStoreState) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut dbs = self.databases.lock();
        let store = dbs
            .get_mut(&self.database)
            .and_then(|db| db.stores.get_mut(&self.store))
            .ok_or_else(|| StoreError::Transaction(format!("store '{}' is gone", self.store)))?;
        f(store)
    }

    fn writable(&self) -> StoreResult<()> {
        match self.mode {
            TxMode::ReadWrite => Ok(()),
            TxMode::ReadOnly => Err(StoreError::ReadOnly),
        }
    }
}

impl StoreAccessor for MemoryAccessor {
    fn mode(&self) -> TxMode {
        self.mode
    }

    async fn add(&self, record: Record) -> StoreResult<Key> {
        self.writable()?;
        if !matches!(record, Value::Object(_)) {
            return Err(StoreError::InvalidKey("record is not an object".into()));
        }
        self.with_store(|store| store.insert(record))
    }

    async fn get(&self, key: &Key) -> StoreResult<Option<Record>> {
        self.with_store(|store| Ok(store.records.get(key).cloned()))
    }

    async fn delete(&self, key: &Key) -> StoreResult<()> {
        self.writable()?;
        self.with_store(|store| {
            store.records.remove(key);
            Ok(())
        })
    }

    async fn clear(&self) -> StoreResult<()> {
        self.writable()?;
        self.with_store(|store| {
            store.records.clear();
            Ok(())
        })
    }

    async fn count(&self) -> StoreResult<usize> {
        self.with_store(|store| Ok(store.records.len()))
    }

    async fn index_get(&self, index: &str, value: &Key) -> StoreResult<Option<Record>> {
        self.with_store(|store| store.index_get(index, value))
    }

    async fn finish(self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn books_upgrade() -> UpgradeFn {
        Box::new(|schema: &mut dyn SchemaUpgrade| {
            schema.create_object_store("books", "id", true)?;
            schema.create_index("books", &IndexSpec::new("isbn", "isbn", true))?;
            schema.create_index("books", &IndexSpec::new("title", "by_title", false))?;
            Ok(())
        })
    }

    fn no_upgrade() -> UpgradeFn {
        Box::new(|_: &mut dyn SchemaUpgrade| Ok(()))
    }

    async fn open_books(engine: &MemoryEngine) -> MemoryConnection {
        engine.open("library", 1, books_upgrade()).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_schema() {
        let engine = MemoryEngine::new();
        open_books(&engine).await;

        let schema = engine.schema("library").unwrap();
        assert_eq!(schema.version, 1);
        assert_eq!(schema.stores.len(), 1);
        assert_eq!(schema.stores[0].name, "books");
        assert_eq!(schema.stores[0].key_path, "id");
        assert!(schema.stores[0].auto_increment);
        assert_eq!(
            schema.stores[0].indexes,
            vec![
                IndexSpec::new("title", "by_title", false),
                IndexSpec::new("isbn", "isbn", true),
            ]
        );
    }

    #[tokio::test]
    async fn test_same_version_skips_upgrade() {
        let engine = MemoryEngine::new();
        open_books(&engine).await;

        let upgrade: UpgradeFn = Box::new(|_: &mut dyn SchemaUpgrade| {
            Err(StoreError::Upgrade("must not run".into()))
        });
        let conn = engine.open("library", 1, upgrade).await.unwrap();
        assert_eq!(conn.version(), 1);
    }

    #[tokio::test]
    async fn test_version_downgrade_fails() {
        let engine = MemoryEngine::new();
        engine.open("library", 2, books_upgrade()).await.unwrap();

        let result = engine.open("library", 1, no_upgrade()).await;
        assert!(matches!(result, Err(StoreError::Open(_))));
    }

    #[tokio::test]
    async fn test_zero_version_fails() {
        let engine = MemoryEngine::new();
        let result = engine.open("library", 0, no_upgrade()).await;
        assert!(matches!(result, Err(StoreError::Open(_))));
        assert!(engine.database_names().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upgrade_is_rolled_back() {
        let engine = MemoryEngine::new();
        let upgrade: UpgradeFn = Box::new(|schema: &mut dyn SchemaUpgrade| {
            schema.create_object_store("books", "id", false)?;
            schema.create_index("missing", &IndexSpec::new("a", "a", false))
        });

        let result = engine.open("library", 1, upgrade).await;
        assert!(matches!(result, Err(StoreError::Upgrade(_))));
        assert!(engine.schema("library").is_none());
    }

    #[tokio::test]
    async fn test_auto_increment_injects_key() {
        let engine = MemoryEngine::new();
        let conn = open_books(&engine).await;
        let tx = conn.transaction("books", TxMode::ReadWrite).unwrap();

        let k1 = tx.add(json!({"title": "a"})).await.unwrap();
        let k2 = tx.add(json!({"id": 10, "title": "b"})).await.unwrap();
        let k3 = tx.add(json!({"title": "c"})).await.unwrap();

        assert_eq!(k1, Key::Int(1));
        assert_eq!(k2, Key::Int(10));
        assert_eq!(k3, Key::Int(11));
        assert_eq!(
            tx.get(&Key::Int(1)).await.unwrap(),
            Some(json!({"id": 1, "title": "a"}))
        );
    }

    #[tokio::test]
    async fn test_missing_key_without_auto_increment() {
        let engine = MemoryEngine::new();
        let upgrade: UpgradeFn = Box::new(|schema: &mut dyn SchemaUpgrade| {
            schema.create_object_store("notes", "slug", false)
        });
        let conn = engine.open("notes", 1, upgrade).await.unwrap();
        let tx = conn.transaction("notes", TxMode::ReadWrite).unwrap();

        let result = tx.add(json!({"body": "x"})).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
        assert!(matches!(
            tx.add(json!("not an object")).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_null_key_is_rejected_even_with_auto_increment() {
        let engine = MemoryEngine::new();
        let conn = open_books(&engine).await;
        let tx = conn.transaction("books", TxMode::ReadWrite).unwrap();

        let result = tx.add(json!({"id": null, "title": "a"})).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
        assert_eq!(tx.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_float_keys_and_generator() {
        let engine = MemoryEngine::new();
        let conn = open_books(&engine).await;
        let tx = conn.transaction("books", TxMode::ReadWrite).unwrap();

        let k1 = tx.add(json!({"id": 1.5, "title": "a"})).await.unwrap();
        let k2 = tx.add(json!({"title": "b"})).await.unwrap();
        let k3 = tx.add(json!({"id": 7.25, "title": "c"})).await.unwrap();
        let k4 = tx.add(json!({"title": "d"})).await.unwrap();

        assert_eq!(k1, Key::Float(1.5));
        assert_eq!(k2, Key::Int(2));
        assert_eq!(k3, Key::Float(7.25));
        assert_eq!(k4, Key::Int(8));
        assert_eq!(
            tx.get(&Key::Float(1.5)).await.unwrap(),
            Some(json!({"id": 1.5, "title": "a"}))
        );
    }

    #[tokio::test]
    async fn test_unique_index_over_float_values() {
        let engine = MemoryEngine::new();
        let upgrade: UpgradeFn = Box::new(|schema: &mut dyn SchemaUpgrade| {
            schema.create_object_store("scores", "id", false)?;
            schema.create_index("scores", &IndexSpec::new("score", "score", true))
        });
        let conn = engine.open("league", 1, upgrade).await.unwrap();
        let tx = conn.transaction("scores", TxMode::ReadWrite).unwrap();

        tx.add(json!({"id": 1, "score": 2.5})).await.unwrap();
        let second = tx.add(json!({"id": 2, "score": 2.5})).await;

        assert!(matches!(second, Err(StoreError::Constraint(_))));
        assert_eq!(tx.count().await.unwrap(), 1);
        assert_eq!(
            tx.index_get("score", &Key::Float(2.5)).await.unwrap(),
            Some(json!({"id": 1, "score": 2.5}))
        );
    }

    #[tokio::test]
    async fn test_duplicate_key_and_unique_index() {
        let engine = MemoryEngine::new();
        let conn = open_books(&engine).await;
        let tx = conn.transaction("books", TxMode::ReadWrite).unwrap();

        tx.add(json!({"id": 1, "isbn": "123"})).await.unwrap();

        let dup_key = tx.add(json!({"id": 1, "isbn": "456"})).await;
        assert!(matches!(dup_key, Err(StoreError::Constraint(_))));

        let dup_isbn = tx.add(json!({"id": 2, "isbn": "123"})).await;
        assert!(matches!(dup_isbn, Err(StoreError::Constraint(_))));

        assert_eq!(tx.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_readonly_rejects_writes() {
        let engine = MemoryEngine::new();
        let conn = open_books(&engine).await;
        let tx = conn.transaction("books", TxMode::ReadOnly).unwrap();

        assert_eq!(tx.mode(), TxMode::ReadOnly);
        assert!(matches!(tx.add(json!({"id": 1})).await, Err(StoreError::ReadOnly)));
        assert!(matches!(tx.delete(&Key::Int(1)).await, Err(StoreError::ReadOnly)));
        assert!(matches!(tx.clear().await, Err(StoreError::ReadOnly)));
        assert_eq!(tx.get(&Key::Int(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_index_get_returns_lowest_key() {
        let engine = MemoryEngine::new();
        let conn = open_books(&engine).await;
        let tx = conn.transaction("books", TxMode::ReadWrite).unwrap();

        tx.add(json!({"id": 5, "title": "dune"})).await.unwrap();
        tx.add(json!({"id": 2, "title": "dune"})).await.unwrap();

        let found = tx
            .index_get("by_title", &Key::from("dune"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["id"], json!(2));

        let unknown = tx.index_get("nope", &Key::from("dune")).await;
        assert!(matches!(unknown, Err(StoreError::UnknownIndex(_))));
    }

    #[tokio::test]
    async fn test_unknown_store_and_deleted_database() {
        let engine = MemoryEngine::new();
        let conn = open_books(&engine).await;

        assert!(matches!(
            conn.transaction("magazines", TxMode::ReadOnly),
            Err(StoreError::UnknownStore(_))
        ));

        engine.delete_database("library").await.unwrap();
        assert!(matches!(
            conn.transaction("books", TxMode::ReadOnly),
            Err(StoreError::Transaction(_))
        ));
    }

    #[tokio::test]
    async fn test_unique_index_over_conflicting_records_fails() {
        let engine = MemoryEngine::new();
        let upgrade: UpgradeFn = Box::new(|schema: &mut dyn SchemaUpgrade| {
            schema.create_object_store("books", "id", false)
        });
        let conn = engine.open("library", 1, upgrade).await.unwrap();
        let tx = conn.transaction("books", TxMode::ReadWrite).unwrap();
        tx.add(json!({"id": 1, "isbn": "x"})).await.unwrap();
        tx.add(json!({"id": 2, "isbn": "x"})).await.unwrap();

        let upgrade: UpgradeFn = Box::new(|schema: &mut dyn SchemaUpgrade| {
            schema.create_index("books", &IndexSpec::new("isbn", "isbn", true))
        });
        let result = engine.open("library", 2, upgrade).await;
        assert!(matches!(result, Err(StoreError::Upgrade(_))));
        assert_eq!(engine.schema("library").unwrap().version, 1);
    }
}
