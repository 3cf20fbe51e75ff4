//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`.

use js_sys::Promise;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{DomException, IdbFactory, IdbRequest, IdbTransaction};

use indb_core::{StoreError, StoreResult};

/// Globals probed for the IndexedDB factory, standard name first.
const FACTORY_GLOBALS: [&str; 4] = [
    "indexedDB",
    "mozIndexedDB",
    "webkitIndexedDB",
    "msIndexedDB",
];

/// Event handler closure kept alive until the request settles.
type Handler = Closure<dyn FnMut(web_sys::Event)>;

/// Resolve the IndexedDB factory from the global object.
pub fn idb_factory() -> StoreResult<IdbFactory> {
    let global = js_sys::global();

    for name in FACTORY_GLOBALS {
        let candidate = js_sys::Reflect::get(&global, &JsValue::from_str(name))
            .unwrap_or(JsValue::UNDEFINED);
        if candidate.is_undefined() || candidate.is_null() {
            continue;
        }
        tracing::debug!("using IndexedDB factory '{}'", name);
        return candidate
            .dyn_into::<IdbFactory>()
            .map_err(|_| StoreError::Open(format!("{} is not an IDBFactory", name)));
    }

    Err(StoreError::Open("IndexedDB not available".into()))
}

/// Map a DOMException to the store error it stands for.
pub fn dom_error(err: &DomException) -> StoreError {
    let message = err.message();
    match err.name().as_str() {
        "ConstraintError" => StoreError::Constraint(message),
        "DataCloneError" => StoreError::DataClone(message),
        "DataError" => StoreError::InvalidKey(message),
        "ReadOnlyError" => StoreError::ReadOnly,
        "VersionError" => StoreError::Open(message),
        "TransactionInactiveError" | "AbortError" | "InvalidStateError" => {
            StoreError::Transaction(message)
        }
        name => StoreError::Request(format!("{}: {}", name, message)),
    }
}

/// Map a thrown or rejected JS value to a store error.
pub fn js_error(val: &JsValue) -> StoreError {
    match val.dyn_ref::<DomException>() {
        Some(dom) => dom_error(dom),
        None => StoreError::Request(describe(val)),
    }
}

/// Human-readable rendering of a JS value for error messages.
pub fn describe(val: &JsValue) -> String {
    if let Some(s) = val.as_string() {
        return s;
    }
    if let Some(err) = val.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    js_sys::JSON::stringify(val)
        .map(String::from)
        .unwrap_or_else(|_| format!("{:?}", val))
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's
/// result and rejects with its DOMException.
fn request_to_promise(req: &IdbRequest) -> Promise {
    let req = req.clone();

    Promise::new(&mut move |resolve, reject| {
        // Closures live until either handler fires, then both are dropped
        let closures: Rc<RefCell<Option<(Handler, Handler)>>> = Rc::new(RefCell::new(None));

        let req_s = req.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let err = req_e
                .error()
                .ok()
                .flatten()
                .map(JsValue::from)
                .unwrap_or_else(|| JsValue::from_str("unknown IDB error"));
            let _ = reject.call1(&JsValue::UNDEFINED, &err);
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_success, on_error));
    })
}

type TxHandlers = Rc<RefCell<Option<(Handler, Handler, Handler)>>>;

/// Handler rejecting with the transaction's error, used for both `error`
/// and `abort`.
fn transaction_failure(
    tx: IdbTransaction,
    reject: js_sys::Function,
    closures: TxHandlers,
) -> Handler {
    Closure::wrap(Box::new(move |_event: web_sys::Event| {
        let err = tx
            .error()
            .map(JsValue::from)
            .unwrap_or_else(|| JsValue::from_str("transaction aborted"));
        let _ = reject.call1(&JsValue::UNDEFINED, &err);
        *closures.borrow_mut() = None;
    }) as Box<dyn FnMut(web_sys::Event)>)
}

/// Convert an IdbTransaction completion into a JS Promise.
fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        let closures: TxHandlers = Rc::new(RefCell::new(None));

        let closures_for_complete = closures.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            *closures_for_complete.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let on_error = transaction_failure(tx.clone(), reject.clone(), closures.clone());
        let on_abort = transaction_failure(tx.clone(), reject, closures.clone());

        tx.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        tx.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_complete, on_error, on_abort));
    })
}

/// Await an IdbRequest, resolving to its result JsValue.
pub async fn await_request(req: &IdbRequest) -> StoreResult<JsValue> {
    let promise = request_to_promise(req);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| js_error(&e))
}

/// Await an IdbTransaction to complete.
pub async fn await_transaction(tx: &IdbTransaction) -> StoreResult<()> {
    let promise = transaction_to_promise(tx);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| match js_error(&e) {
            StoreError::Request(msg) => StoreError::Transaction(msg),
            other => other,
        })?;
    Ok(())
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(factory: &IdbFactory, db_name: &str) -> StoreResult<()> {
    let req = factory
        .delete_database(db_name)
        .map_err(|e| StoreError::Open(format!("delete db: {}", describe(&e))))?;
    await_request(req.unchecked_ref()).await?;
    Ok(())
}
