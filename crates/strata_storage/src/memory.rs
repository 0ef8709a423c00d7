//! In-memory record store for testing.

use crate::batch::{BatchOp, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::store::{Record, RecordKey, RecordStore};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

/// An in-memory record store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral repositories that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. A batch is
/// validated and applied under a single write lock, so readers never observe
/// half of a batch.
///
/// # Example
///
/// ```rust
/// use strata_storage::{InMemoryRecordStore, RecordKey, RecordStore, WriteBatch};
///
/// let store = InMemoryRecordStore::new();
/// let key = RecordKey::new(vec![7]);
///
/// let mut batch = WriteBatch::new();
/// batch.insert(key.clone(), b"v1".to_vec());
/// store.apply(&batch).unwrap();
///
/// let mut batch = WriteBatch::new();
/// batch.update(key.clone(), 1, b"v2".to_vec());
/// store.apply(&batch).unwrap();
///
/// assert_eq!(store.get(&key).unwrap().unwrap().version, 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordKey, Record>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a sorted copy of every record in the store.
    ///
    /// Useful for asserting that a failed operation left the store untouched.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<RecordKey, Record> {
        self.records
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    fn validate(records: &HashMap<RecordKey, Record>, batch: &WriteBatch) -> StorageResult<()> {
        let mut seen = HashSet::with_capacity(batch.len());
        for op in batch.ops() {
            let key = op.key();
            if !seen.insert(key) {
                return Err(StorageError::DuplicateKey(key.clone()));
            }
            let actual = records.get(key).map(|r| r.version);
            if actual != op.expected() {
                return Err(StorageError::VersionConflict {
                    key: key.clone(),
                    expected: op.expected(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, key: &RecordKey) -> StorageResult<Option<Record>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn contains(&self, key: &RecordKey) -> StorageResult<bool> {
        Ok(self.records.read().contains_key(key))
    }

    fn apply(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut records = self.records.write();

        // Check every expectation before touching anything
        Self::validate(&records, batch)?;

        for op in batch.ops() {
            match op {
                BatchOp::Put {
                    key,
                    expected,
                    payload,
                } => {
                    let version = expected.map_or(1, |v| v + 1);
                    records.insert(
                        key.clone(),
                        Record {
                            version,
                            payload: payload.clone(),
                        },
                    );
                }
                BatchOp::Delete { key, .. } => {
                    records.remove(key);
                }
            }
        }
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> RecordKey {
        RecordKey::new(vec![b])
    }

    fn insert(store: &InMemoryRecordStore, k: u8, payload: &[u8]) {
        let mut batch = WriteBatch::new();
        batch.insert(key(k), payload.to_vec());
        store.apply(&batch).unwrap();
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryRecordStore::new();
        assert!(store.is_empty().unwrap());
        assert!(store.get(&key(1)).unwrap().is_none());
    }

    #[test]
    fn insert_assigns_version_one() {
        let store = InMemoryRecordStore::new();
        insert(&store, 1, b"a");

        let record = store.get(&key(1)).unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.payload, b"a");
        assert!(store.contains(&key(1)).unwrap());
    }

    #[test]
    fn update_increments_version() {
        let store = InMemoryRecordStore::new();
        insert(&store, 1, b"a");

        let mut batch = WriteBatch::new();
        batch.update(key(1), 1, b"b".to_vec());
        store.apply(&batch).unwrap();

        let record = store.get(&key(1)).unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.payload, b"b");
    }

    #[test]
    fn insert_existing_conflicts() {
        let store = InMemoryRecordStore::new();
        insert(&store, 1, b"a");

        let mut batch = WriteBatch::new();
        batch.insert(key(1), b"again".to_vec());
        let result = store.apply(&batch);
        assert!(matches!(
            result,
            Err(StorageError::VersionConflict {
                expected: None,
                actual: Some(1),
                ..
            })
        ));
    }

    #[test]
    fn stale_update_conflicts() {
        let store = InMemoryRecordStore::new();
        insert(&store, 1, b"a");

        let mut batch = WriteBatch::new();
        batch.update(key(1), 5, b"b".to_vec());
        assert!(matches!(
            store.apply(&batch),
            Err(StorageError::VersionConflict { .. })
        ));
    }

    #[test]
    fn delete_removes_record() {
        let store = InMemoryRecordStore::new();
        insert(&store, 1, b"a");

        let mut batch = WriteBatch::new();
        batch.delete(key(1), 1);
        store.apply(&batch).unwrap();

        assert!(!store.contains(&key(1)).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn failed_batch_is_not_partially_applied() {
        let store = InMemoryRecordStore::new();
        insert(&store, 1, b"a");
        let before = store.snapshot();

        let mut batch = WriteBatch::new();
        batch.insert(key(2), b"new".to_vec());
        batch.update(key(1), 1, b"changed".to_vec());
        batch.delete(key(3), 1);
        assert!(store.apply(&batch).is_err());

        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn duplicate_key_rejected() {
        let store = InMemoryRecordStore::new();
        let mut batch = WriteBatch::new();
        batch.insert(key(1), vec![]);
        batch.insert(key(1), vec![]);
        assert!(matches!(
            store.apply(&batch),
            Err(StorageError::DuplicateKey(_))
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn clear_removes_everything() {
        let store = InMemoryRecordStore::new();
        insert(&store, 1, b"a");
        insert(&store, 2, b"b");
        assert_eq!(store.len().unwrap(), 2);

        store.clear();
        assert!(store.is_empty().unwrap());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn version_counts_successful_writes(payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 1..20)) {
                let store = InMemoryRecordStore::new();
                let mut expected = None;
                for payload in &payloads {
                    let mut batch = WriteBatch::new();
                    batch.put(key(9), expected, payload.clone());
                    store.apply(&batch).unwrap();
                    expected = Some(expected.map_or(1, |v| v + 1));
                }

                let record = store.get(&key(9)).unwrap().unwrap();
                prop_assert_eq!(record.version, payloads.len() as u64);
                prop_assert_eq!(&record.payload, payloads.last().unwrap());
            }
        }
    }
}
