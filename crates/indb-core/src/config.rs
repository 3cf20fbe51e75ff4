//! Store configuration
//!
//! The JSON shape mirrors what browser applications already pass around:
//!
//! ```json
//! {
//!   "name": "library",
//!   "storeName": "books",
//!   "version": 1,
//!   "keyPath": "id",
//!   "autoIncrement": true,
//!   "indexes": [{ "key": "isbn", "name": "isbn", "unique": true }]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Secondary index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Record field the index is built over (the index key path)
    pub key: String,
    /// Name used to look the index up
    pub name: String,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(key: impl Into<String>, name: impl Into<String>, unique: bool) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            unique,
        }
    }
}

/// Configuration for a [`StoreHandle`](crate::StoreHandle).
///
/// Stored verbatim by the handle. Nothing here is validated by the wrapper;
/// a bad version or a clashing index surfaces as a host error when the
/// database is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database name
    pub name: String,
    /// Object store name
    pub store_name: String,
    /// Schema version; bumping it triggers the upgrade hook
    pub version: u32,
    /// Primary key field
    pub key_path: String,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl StoreConfig {
    /// Configuration for a single store named like the database, keyed by `id`,
    /// version 1, without indexes.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            store_name: name.clone(),
            name,
            version: 1,
            key_path: "id".to_string(),
            auto_increment: false,
            indexes: Vec::new(),
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    /// Append a secondary index. Order is preserved when indexes are created.
    pub fn index(mut self, key: impl Into<String>, name: impl Into<String>, unique: bool) -> Self {
        self.indexes.push(IndexSpec::new(key, name, unique));
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::new("TEST")
            .auto_increment(true)
            .index("biblioid", "biblioid", true)
            .index("name", "name", false)
            .index("somevar", "somevar", true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.name, "TEST");
        assert_eq!(config.store_name, "TEST");
        assert_eq!(config.version, 1);
        assert_eq!(config.key_path, "id");
        assert!(config.auto_increment);
        let names: Vec<&str> = config.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["biblioid", "name", "somevar"]);
        assert!(config.indexes[0].unique);
        assert!(!config.indexes[1].unique);
    }

    #[test]
    fn test_from_json_camel_case() {
        let config = StoreConfig::from_json(
            r#"{
                "name": "library",
                "storeName": "books",
                "version": 3,
                "keyPath": "isbn",
                "autoIncrement": false,
                "indexes": [
                    {"key": "title", "name": "by_title", "unique": false},
                    {"key": "code", "name": "code"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.store_name, "books");
        assert_eq!(config.version, 3);
        assert_eq!(config.key_path, "isbn");
        assert_eq!(config.indexes[0], IndexSpec::new("title", "by_title", false));
        assert!(!config.indexes[1].unique);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result = StoreConfig::from_json("{\"name\": 5}");
        assert!(matches!(
            result,
            Err(crate::StoreError::Serialization(_))
        ));
    }
}
