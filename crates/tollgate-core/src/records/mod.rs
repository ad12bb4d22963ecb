//! Record storage for resource collections.
//!
//! Each collection is a sled tree of JSON objects keyed by a big-endian `u64`
//! id. Ids come from a per-collection sequence starting at 1. The store owns
//! the `id`, `createdAt` and `updatedAt` fields; values supplied for them in a
//! request body are ignored.

use chrono::Utc;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

const ID_FIELD: &str = "id";
const CREATED_FIELD: &str = "createdAt";
const UPDATED_FIELD: &str = "updatedAt";

/// Record store errors.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Body is not a JSON object.
    #[error("Record body must be a JSON object")]
    NotAnObject,
}

/// How an update combines the body with the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Drop all user fields and take the body as-is.
    Replace,
    /// Overwrite only the fields present in the body.
    Merge,
}

/// Record store backed by sled.
#[derive(Clone)]
pub struct RecordStore {
    db: sled::Db,
    sequences: sled::Tree,
}

impl RecordStore {
    /// Open or create a record store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, RecordStoreError> {
        Self::with_db(sled::open(path)?)
    }

    /// Create a record store over an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if the sequence tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, RecordStoreError> {
        let sequences = db.open_tree("record_sequences")?;
        Ok(Self { db, sequences })
    }

    /// List every record in a collection, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if storage read fails.
    pub fn list(&self, collection: &str) -> Result<Vec<Value>, RecordStoreError> {
        let tree = self.tree(collection)?;
        let mut records = Vec::new();

        for result in &tree {
            let (_, value) = result?;
            records.push(serde_json::from_slice(&value)?);
        }

        Ok(records)
    }

    /// Get a single record.
    ///
    /// # Errors
    ///
    /// Returns error if storage read fails.
    pub fn get(&self, collection: &str, id: u64) -> Result<Option<Value>, RecordStoreError> {
        let tree = self.tree(collection)?;
        match tree.get(id.to_be_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Create a record and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not an object or storage fails.
    pub fn create(&self, collection: &str, body: Value) -> Result<Value, RecordStoreError> {
        let mut record = user_fields(body)?;
        let id = self.next_id(collection)?;
        let now = Value::String(Utc::now().to_rfc3339());

        record.insert(ID_FIELD.to_string(), Value::from(id));
        record.insert(CREATED_FIELD.to_string(), now.clone());
        record.insert(UPDATED_FIELD.to_string(), now);

        let tree = self.tree(collection)?;
        tree.insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;

        Ok(Value::Object(record))
    }

    /// Update a record. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not an object or storage fails.
    pub fn update(
        &self,
        collection: &str,
        id: u64,
        body: Value,
        mode: UpdateMode,
    ) -> Result<Option<Value>, RecordStoreError> {
        let changes = user_fields(body)?;
        let tree = self.tree(collection)?;
        let key = id.to_be_bytes();

        // Retry until no concurrent writer slipped in between read and swap.
        loop {
            let Some(current) = tree.get(key)? else {
                return Ok(None);
            };
            let mut record: Map<String, Value> = serde_json::from_slice(&current)?;

            if mode == UpdateMode::Replace {
                record.retain(|k, _| is_store_field(k));
            }
            for (k, v) in &changes {
                record.insert(k.clone(), v.clone());
            }
            record.insert(
                UPDATED_FIELD.to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );

            let encoded = serde_json::to_vec(&record)?;
            if tree
                .compare_and_swap(key, Some(&current), Some(encoded))?
                .is_ok()
            {
                return Ok(Some(Value::Object(record)));
            }
            tracing::trace!(collection, id, "Record changed during update, retrying");
        }
    }

    /// Delete a record, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn delete(&self, collection: &str, id: u64) -> Result<Option<Value>, RecordStoreError> {
        let tree = self.tree(collection)?;
        match tree.remove(id.to_be_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Count records in a collection.
    ///
    /// # Errors
    ///
    /// Returns error if the collection tree cannot be opened.
    pub fn count(&self, collection: &str) -> Result<usize, RecordStoreError> {
        Ok(self.tree(collection)?.len())
    }

    /// Flush pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails.
    pub async fn flush(&self) -> Result<(), RecordStoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn tree(&self, collection: &str) -> Result<sled::Tree, RecordStoreError> {
        Ok(self.db.open_tree(format!("records:{collection}"))?)
    }

    fn next_id(&self, collection: &str) -> Result<u64, RecordStoreError> {
        let next = self
            .sequences
            .update_and_fetch(collection.as_bytes(), |old| {
                let current = old.map_or(0, decode_sequence);
                Some(current.saturating_add(1).to_be_bytes().to_vec())
            })?;
        Ok(next.as_deref().map_or(1, decode_sequence))
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}

fn decode_sequence(bytes: &[u8]) -> u64 {
    <[u8; 8]>::try_from(bytes).map_or(0, u64::from_be_bytes)
}

fn is_store_field(key: &str) -> bool {
    matches!(key, ID_FIELD | CREATED_FIELD | UPDATED_FIELD)
}

fn user_fields(body: Value) -> Result<Map<String, Value>, RecordStoreError> {
    let Value::Object(mut fields) = body else {
        return Err(RecordStoreError::NotAnObject);
    };
    fields.retain(|k, _| !is_store_field(k));
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, RecordStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let (_dir, store) = store();

        let first = store
            .create("clothes", json!({"name": "test-dress", "color": "red", "size": "XL"}))
            .unwrap();
        let second = store.create("clothes", json!({"name": "hat"})).unwrap();
        let other = store.create("food", json!({"name": "apple"})).unwrap();

        assert_eq!(first["id"], 1);
        assert_eq!(first["name"], "test-dress");
        assert_eq!(second["id"], 2);
        assert_eq!(other["id"], 1);
        assert!(first.get("createdAt").is_some());
    }

    #[test]
    fn test_client_cannot_choose_id() {
        let (_dir, store) = store();
        let record = store.create("clothes", json!({"id": 99, "name": "x"})).unwrap();
        assert_eq!(record["id"], 1);
    }

    #[test]
    fn test_list_and_get() {
        let (_dir, store) = store();
        store.create("clothes", json!({"name": "a"})).unwrap();
        store.create("clothes", json!({"name": "b"})).unwrap();

        let all = store.list("clothes").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["name"], "a");
        assert_eq!(all[1]["name"], "b");

        assert_eq!(store.get("clothes", 2).unwrap().unwrap()["name"], "b");
        assert!(store.get("clothes", 3).unwrap().is_none());
        assert!(store.list("food").unwrap().is_empty());
    }

    #[test]
    fn test_replace_and_merge() {
        let (_dir, store) = store();
        store
            .create("clothes", json!({"name": "dress", "color": "red"}))
            .unwrap();

        let merged = store
            .update("clothes", 1, json!({"color": "blue"}), UpdateMode::Merge)
            .unwrap()
            .unwrap();
        assert_eq!(merged["name"], "dress");
        assert_eq!(merged["color"], "blue");

        let replaced = store
            .update("clothes", 1, json!({"name": "dress-altered"}), UpdateMode::Replace)
            .unwrap()
            .unwrap();
        assert_eq!(replaced["id"], 1);
        assert_eq!(replaced["name"], "dress-altered");
        assert!(replaced.get("color").is_none());
        assert!(replaced.get("createdAt").is_some());

        assert!(
            store
                .update("clothes", 42, json!({}), UpdateMode::Merge)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = store();
        store.create("clothes", json!({"name": "a"})).unwrap();

        let deleted = store.delete("clothes", 1).unwrap().unwrap();
        assert_eq!(deleted["name"], "a");
        assert!(store.get("clothes", 1).unwrap().is_none());
        assert!(store.delete("clothes", 1).unwrap().is_none());

        // Ids are never reused.
        let next = store.create("clothes", json!({"name": "b"})).unwrap();
        assert_eq!(next["id"], 2);
    }

    #[test]
    fn test_rejects_non_object() {
        let (_dir, store) = store();
        let result = store.create("clothes", json!([1, 2, 3]));
        assert!(matches!(result, Err(RecordStoreError::NotAnObject)));
        assert_eq!(store.count("clothes").unwrap(), 0);
    }
}
