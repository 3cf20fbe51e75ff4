//! Observability hook for store operations
//!
//! Every outcome a [`StoreHandle`](crate::StoreHandle) produces, including
//! every failure, goes through one injected [`StoreObserver`]. The default,
//! [`TracingObserver`], emits `tracing` events.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::logging::prefix;
use crate::record::Key;

/// Something worth logging that happened on a store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The database was opened and the handle is ready
    Opened { name: String, version: u32 },
    /// The upgrade hook ran while opening
    Upgraded { name: String, from: u32, to: u32 },
    Inserted { key: Key },
    Deleted { key: Key },
    Cleared,
    /// A lookup by key or index value found nothing
    Missed { operation: &'static str, key: Key },
    Failed {
        operation: &'static str,
        error: StoreError,
    },
}

impl StoreEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, StoreEvent::Failed { .. })
    }
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreEvent::Opened { name, version } => {
                write!(f, "opened database '{}' at version {}", name, version)
            }
            StoreEvent::Upgraded { name, from, to } => {
                write!(f, "upgraded database '{}' from version {} to {}", name, from, to)
            }
            StoreEvent::Inserted { key } => write!(f, "insertion of {} successful", key),
            StoreEvent::Deleted { key } => write!(f, "deletion of {} successful", key),
            StoreEvent::Cleared => write!(f, "object store cleared"),
            StoreEvent::Missed { operation, key } => {
                write!(f, "{}: no record for {}", operation, key)
            }
            StoreEvent::Failed { operation, error } => write!(f, "{}: {}", operation, error),
        }
    }
}

/// Sink for store events.
pub trait StoreObserver {
    fn log(&self, event: &StoreEvent);
}

impl<F> StoreObserver for F
where
    F: Fn(&StoreEvent),
{
    fn log(&self, event: &StoreEvent) {
        self(event)
    }
}

/// Observer emitting `tracing` events with the database segment prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StoreObserver for TracingObserver {
    fn log(&self, event: &StoreEvent) {
        match event {
            StoreEvent::Opened { .. } | StoreEvent::Upgraded { .. } => {
                tracing::info!("{} {}", prefix::DB, event)
            }
            StoreEvent::Failed { error, .. } => match error {
                StoreError::Constraint(_)
                | StoreError::DataClone(_)
                | StoreError::InvalidKey(_) => tracing::warn!("{} {}", prefix::DB, event),
                _ => tracing::error!("{} {}", prefix::DB, event),
            },
            _ => tracing::debug!("{} {}", prefix::DB, event),
        }
    }
}

/// Observer that keeps every event in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<StoreEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events logged so far, oldest first.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().clone()
    }

    pub fn failures(&self) -> Vec<StoreEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_failure())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl StoreObserver for RecordingObserver {
    fn log(&self, event: &StoreEvent) {
        self.events.lock().push(event.clone());
    }
}
