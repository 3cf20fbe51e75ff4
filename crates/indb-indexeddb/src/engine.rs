//! IndexedDB host engine
//!
//! Implements the `indb-core` host traits over web-sys. The factory is
//! resolved once, when the engine is built, and every handle created from
//! the engine uses that same factory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indb_core::{
    Connection, HostEngine, IndexSpec, Key, Record, SchemaUpgrade, StoreAccessor, StoreError,
    StoreResult, TxMode, UpgradeFn,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    DomStringList, IdbDatabase, IdbFactory, IdbObjectStore, IdbOpenDbRequest, IdbTransaction,
    IdbTransactionMode, IdbVersionChangeEvent,
};

use crate::convert::{js_to_key, js_to_optional_record, key_to_js, record_to_js};
use crate::idb::{self, describe, js_error};

/// Closure handling `upgradeneeded`, kept alive for the open request
type UpgradeClosure = Closure<dyn FnMut(IdbVersionChangeEvent)>;

fn string_list(list: &DomStringList) -> Vec<String> {
    (0..list.length()).filter_map(|i| list.item(i)).collect()
}

fn idb_mode(mode: TxMode) -> IdbTransactionMode {
    match mode {
        TxMode::ReadOnly => IdbTransactionMode::Readonly,
        TxMode::ReadWrite => IdbTransactionMode::Readwrite,
    }
}

fn set_prop(obj: &JsValue, key: &str, val: &JsValue) -> StoreResult<()> {
    js_sys::Reflect::set(obj, &key.into(), val)
        .map_err(|_| StoreError::Upgrade(format!("failed to set property: {}", key)))?;
    Ok(())
}

/// Host engine backed by the browser's IndexedDB.
#[derive(Debug, Clone)]
pub struct IdbEngine {
    factory: IdbFactory,
}

impl IdbEngine {
    pub fn new(factory: IdbFactory) -> Self {
        Self { factory }
    }

    /// Build an engine over the global factory, falling back to the legacy
    /// vendor-prefixed globals.
    pub fn from_global() -> StoreResult<Self> {
        Ok(Self::new(idb::idb_factory()?))
    }
}

impl HostEngine for IdbEngine {
    type Connection = IdbConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn,
    ) -> StoreResult<IdbConnection> {
        let open_req: IdbOpenDbRequest = self
            .factory
            .open_with_u32(name, version)
            .map_err(|e| StoreError::Open(describe(&e)))?;

        let hook = Rc::new(RefCell::new(Some(upgrade)));
        let upgrade_error: Rc<RefCell<Option<StoreError>>> = Rc::new(RefCell::new(None));

        let upgrade_error_for_hook = upgrade_error.clone();
        let on_upgrade: UpgradeClosure =
            Closure::wrap(Box::new(move |event: IdbVersionChangeEvent| {
                let Some(hook) = hook.borrow_mut().take() else {
                    return;
                };
                if let Err(e) = run_upgrade(&event, hook) {
                    tracing::error!("upgrade failed, aborting version change: {}", e);
                    *upgrade_error_for_hook.borrow_mut() = Some(e);
                }
            }) as Box<dyn FnMut(IdbVersionChangeEvent)>);

        open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
        let result = idb::await_request(open_req.unchecked_ref()).await;
        open_req.set_onupgradeneeded(None);
        drop(on_upgrade);

        // An aborted upgrade surfaces as AbortError; the hook's own error wins
        let upgrade_failure = upgrade_error.borrow_mut().take();
        let db = match (result, upgrade_failure) {
            (Ok(db), _) => db,
            (Err(_), Some(e)) => return Err(e),
            (Err(e @ StoreError::Open(_)), None) => return Err(e),
            (Err(e), None) => return Err(StoreError::Open(e.to_string())),
        };

        let db = db
            .dyn_into::<IdbDatabase>()
            .map_err(|_| StoreError::Open("result is not IdbDatabase".into()))?;
        Ok(IdbConnection { db })
    }

    async fn delete_database(&self, name: &str) -> StoreResult<()> {
        idb::delete_database(&self.factory, name).await
    }
}

/// Run the upgrade hook inside `upgradeneeded`; abort the version change
/// transaction if it fails.
fn run_upgrade(event: &IdbVersionChangeEvent, hook: UpgradeFn) -> StoreResult<()> {
    let req: IdbOpenDbRequest = event
        .target()
        .ok_or_else(|| StoreError::Upgrade("upgrade event has no target".into()))?
        .dyn_into()
        .map_err(|_| StoreError::Upgrade("upgrade target is not an open request".into()))?;
    let db: IdbDatabase = req
        .result()
        .map_err(|e| js_error(&e))?
        .dyn_into()
        .map_err(|_| StoreError::Upgrade("upgrade result is not IdbDatabase".into()))?;

    let mut schema = IdbUpgrade {
        old_version: event.old_version() as u32,
        db,
        tx: req.transaction(),
        stores: HashMap::new(),
    };
    tracing::debug!(
        "upgrading '{}' from version {}",
        schema.db.name(),
        schema.old_version
    );

    let outcome = hook(&mut schema);
    if outcome.is_err() {
        if let Some(tx) = &schema.tx {
            let _ = tx.abort();
        }
    }
    outcome
}

/// Schema handle valid for the duration of `upgradeneeded`.
struct IdbUpgrade {
    old_version: u32,
    db: IdbDatabase,
    tx: Option<IdbTransaction>,
    stores: HashMap<String, IdbObjectStore>,
}

impl IdbUpgrade {
    fn store(&self, name: &str) -> StoreResult<IdbObjectStore> {
        if let Some(store) = self.stores.get(name) {
            return Ok(store.clone());
        }
        self.tx
            .as_ref()
            .ok_or_else(|| StoreError::Upgrade("no version change transaction".into()))?
            .object_store(name)
            .map_err(|_| StoreError::UnknownStore(name.to_string()))
    }
}

impl SchemaUpgrade for IdbUpgrade {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn object_store_names(&self) -> Vec<String> {
        string_list(&self.db.object_store_names())
    }

    fn create_object_store(
        &mut self,
        name: &str,
        key_path: &str,
        auto_increment: bool,
    ) -> StoreResult<()> {
        let params = web_sys::IdbObjectStoreParameters::new();
        set_prop(&params, "keyPath", &JsValue::from_str(key_path))?;
        set_prop(&params, "autoIncrement", &JsValue::from_bool(auto_increment))?;

        let store = self
            .db
            .create_object_store_with_optional_parameters(name, &params)
            .map_err(|e| js_error(&e))?;
        self.stores.insert(name.to_string(), store);
        Ok(())
    }

    fn index_names(&self, store: &str) -> StoreResult<Vec<String>> {
        Ok(string_list(&self.store(store)?.index_names()))
    }

    fn create_index(&mut self, store: &str, index: &IndexSpec) -> StoreResult<()> {
        let params = web_sys::IdbIndexParameters::new();
        set_prop(&params, "unique", &JsValue::from_bool(index.unique))?;

        self.store(store)?
            .create_index_with_str_and_optional_parameters(&index.name, &index.key, &params)
            .map_err(|e| js_error(&e))?;
        Ok(())
    }
}

/// Open IndexedDB connection.
#[derive(Debug, Clone)]
pub struct IdbConnection {
    db: IdbDatabase,
}

impl IdbConnection {
    pub fn database(&self) -> &IdbDatabase {
        &self.db
    }
}

impl Connection for IdbConnection {
    type Accessor = IdbAccessor;

    fn transaction(&self, store: &str, mode: TxMode) -> StoreResult<IdbAccessor> {
        let tx = self
            .db
            .transaction_with_str_and_mode(store, idb_mode(mode))
            .map_err(|e| match js_error(&e) {
                StoreError::Request(msg) if msg.starts_with("NotFoundError") => {
                    StoreError::UnknownStore(store.to_string())
                }
                other => other,
            })?;
        let object_store = tx
            .object_store(store)
            .map_err(|_| StoreError::UnknownStore(store.to_string()))?;
        Ok(IdbAccessor {
            tx,
            store: object_store,
            mode,
        })
    }

    fn version(&self) -> u32 {
        self.db.version() as u32
    }
}

/// Object store accessor bound to one IndexedDB transaction.
#[derive(Debug)]
pub struct IdbAccessor {
    tx: IdbTransaction,
    store: IdbObjectStore,
    mode: TxMode,
}

impl StoreAccessor for IdbAccessor {
    fn mode(&self) -> TxMode {
        self.mode
    }

    async fn add(&self, record: Record) -> StoreResult<Key> {
        let js_val = record_to_js(&record)?;
        let req = self.store.add(&js_val).map_err(|e| js_error(&e))?;
        let key = idb::await_request(&req).await?;
        js_to_key(&key)
    }

    async fn get(&self, key: &Key) -> StoreResult<Option<Record>> {
        let req = self.store.get(&key_to_js(key)).map_err(|e| js_error(&e))?;
        let result = idb::await_request(&req).await?;
        js_to_optional_record(&result)
    }

    async fn delete(&self, key: &Key) -> StoreResult<()> {
        let req = self.store.delete(&key_to_js(key)).map_err(|e| js_error(&e))?;
        idb::await_request(&req).await?;
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        let req = self.store.clear().map_err(|e| js_error(&e))?;
        idb::await_request(&req).await?;
        Ok(())
    }

    async fn count(&self) -> StoreResult<usize> {
        let req = self.store.count().map_err(|e| js_error(&e))?;
        let result = idb::await_request(&req).await?;
        let count = result
            .as_f64()
            .ok_or_else(|| StoreError::Request(format!("count returned {}", describe(&result))))?;
        Ok(count as usize)
    }

    async fn index_get(&self, index: &str, value: &Key) -> StoreResult<Option<Record>> {
        let idx = self
            .store
            .index(index)
            .map_err(|_| StoreError::UnknownIndex(index.to_string()))?;
        let req = idx.get(&key_to_js(value)).map_err(|e| js_error(&e))?;
        let result = idb::await_request(&req).await?;
        js_to_optional_record(&result)
    }

    async fn finish(self) -> StoreResult<()> {
        idb::await_transaction(&self.tx).await
    }
}
