//! Browser tests for the IndexedDB engine
//!
//! Run with `wasm-pack test --headless --firefox crates/indb-indexeddb`.

#![cfg(target_arch = "wasm32")]

use indb_core::{Key, Lookup, RecordingObserver, StoreConfig, StoreError, StoreHandle};
use indb_indexeddb::IdbEngine;
use serde_json::json;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn library_config(name: &str) -> StoreConfig {
    StoreConfig::new(name)
        .store_name("books")
        .auto_increment(true)
        .index("name", "name", false)
        .index("isbn", "isbn", true)
}

/// Open a handle on a freshly deleted database
async fn fresh_handle(name: &str) -> (StoreHandle<IdbEngine>, RecordingObserver) {
    let engine = IdbEngine::from_global().unwrap();
    indb_core::HostEngine::delete_database(&engine, name)
        .await
        .unwrap();

    let observer = RecordingObserver::new();
    let store = StoreHandle::new(library_config(name), engine).with_observer(observer.clone());
    store.open().await.unwrap();
    (store, observer)
}

#[wasm_bindgen_test]
async fn test_add_get_delete() {
    let (store, observer) = fresh_handle("indb-test-crud").await;

    let key = store.add_record(&json!({"id": 1, "name": "a"})).await.unwrap();
    assert_eq!(key, Key::Int(1));

    match store.get_record_from_index("name", "a").await.unwrap() {
        Lookup::Found(record) => assert_eq!(record["id"], json!(1)),
        Lookup::NotFound => panic!("expected a record for name 'a'"),
    }

    assert!(store.delete_record(1).await.unwrap());
    assert_eq!(store.get_record(1).await.unwrap(), Lookup::NotFound);
    assert!(!store.delete_record(999).await.unwrap());
    assert!(observer.failures().is_empty());
}

#[wasm_bindgen_test]
async fn test_delete_from_index_and_clear() {
    let (store, _) = fresh_handle("indb-test-index").await;
    store.add_record(&json!({"name": "a"})).await.unwrap();
    store.add_record(&json!({"name": "b"})).await.unwrap();

    assert!(!store.delete_record_from_index("name", "zzz").await.unwrap());
    assert!(store.delete_record_from_index("name", "a").await.unwrap());
    assert_eq!(store.count().await.unwrap(), 1);

    store.clear_all().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(
        store.get_record_from_index("name", "b").await.unwrap(),
        Lookup::NotFound
    );
}

#[wasm_bindgen_test]
async fn test_unique_index_violation() {
    let (store, observer) = fresh_handle("indb-test-unique").await;
    store
        .add_record(&json!({"id": 1, "isbn": "42"}))
        .await
        .unwrap();

    let second = store.add_record(&json!({"id": 2, "isbn": "42"})).await;
    assert!(matches!(second, Err(StoreError::Constraint(_))));
    assert_eq!(observer.failures().len(), 1);
    assert!(store.get_record(1).await.unwrap().is_found());
}

#[wasm_bindgen_test]
async fn test_float_key_round_trips() {
    let (store, observer) = fresh_handle("indb-test-float").await;

    let key = store.add_record(&json!({"id": 1.5, "name": "a"})).await.unwrap();
    assert_eq!(key, Key::Float(1.5));
    assert!(observer.failures().is_empty());
    assert!(store.get_record(Key::Float(1.5)).await.unwrap().is_found());

    let second = store.add_record(&json!({"id": 2, "isbn": 2.5})).await;
    let third = store.add_record(&json!({"id": 3, "isbn": 2.5})).await;
    assert!(second.is_ok());
    assert!(matches!(third, Err(StoreError::Constraint(_))));
}
