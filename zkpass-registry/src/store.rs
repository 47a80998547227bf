//! Key-value persistence behind the registry.
//!
//! All registry state is written through [`KvStore`]. The backend is chosen by
//! the caller: a process-local map for tests and ephemeral registries, or a
//! sled database for a registry that survives restarts. Multi-key updates go
//! through [`WriteBatch`] so a registration or admission lands atomically.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{Arc, RwLock},
};

use sled::Db;

use crate::RegistryError;

#[derive(Clone)]
pub struct KvStore {
    backend: Arc<StoreBackend>,
}

enum StoreBackend {
    InMemory(RwLock<BTreeMap<Vec<u8>, Vec<u8>>>),
    Persistent(Db),
}

/// Ordered set of writes applied all-or-nothing.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl KvStore {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(StoreBackend::InMemory(RwLock::new(BTreeMap::new()))),
        }
    }

    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    RegistryError::Store(format!(
                        "failed to create directory for registry db at {}: {err}",
                        path_ref.display()
                    ))
                })?;
            }
        }
        let db = sled::open(path_ref)?;
        Ok(Self::from_db(db))
    }

    /// Wrap an already opened database, e.g. a temporary one in tests.
    pub fn from_db(db: Db) -> Self {
        Self {
            backend: Arc::new(StoreBackend::Persistent(db)),
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(&*self.backend, StoreBackend::Persistent(_))
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RegistryError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => Ok(map
                .read()
                .map_err(|_| poisoned())?
                .get(key)
                .cloned()),
            StoreBackend::Persistent(db) => Ok(db.get(key)?.map(|v| v.to_vec())),
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, RegistryError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => {
                Ok(map.read().map_err(|_| poisoned())?.contains_key(key))
            }
            StoreBackend::Persistent(db) => Ok(db.contains_key(key)?),
        }
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, RegistryError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => {
                let guard = map.read().map_err(|_| poisoned())?;
                Ok(guard
                    .range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect())
            }
            StoreBackend::Persistent(db) => db
                .scan_prefix(prefix)
                .map(|entry| {
                    entry
                        .map(|(k, v)| (k.to_vec(), v.to_vec()))
                        .map_err(RegistryError::from)
                })
                .collect(),
        }
    }

    pub fn apply(&self, batch: WriteBatch) -> Result<(), RegistryError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => {
                let mut guard = map.write().map_err(|_| poisoned())?;
                for (key, value) in batch.ops {
                    guard.insert(key, value);
                }
                Ok(())
            }
            StoreBackend::Persistent(db) => {
                let mut sled_batch = sled::Batch::default();
                for (key, value) in batch.ops {
                    sled_batch.insert(key, value);
                }
                db.apply_batch(sled_batch)?;
                Ok(())
            }
        }
    }

    pub fn flush(&self) -> Result<(), RegistryError> {
        if let StoreBackend::Persistent(db) = &*self.backend {
            db.flush()?;
        }
        Ok(())
    }
}

fn poisoned() -> RegistryError {
    RegistryError::Store("in-memory store lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> Vec<KvStore> {
        let db = sled::Config::new().temporary(true).open().unwrap();
        vec![KvStore::in_memory(), KvStore::from_db(db)]
    }

    #[test]
    fn batch_writes_are_visible() {
        for store in backends() {
            let mut batch = WriteBatch::default();
            batch.put(b"a/1".to_vec(), b"one".to_vec());
            batch.put(b"a/2".to_vec(), b"two".to_vec());
            batch.put(b"b/1".to_vec(), b"other".to_vec());
            assert_eq!(batch.len(), 3);
            store.apply(batch).unwrap();

            assert_eq!(store.get(b"a/2").unwrap(), Some(b"two".to_vec()));
            assert!(store.contains(b"b/1").unwrap());
            assert!(!store.contains(b"c/1").unwrap());
        }
    }

    #[test]
    fn scan_prefix_is_ordered_and_bounded() {
        for store in backends() {
            let mut batch = WriteBatch::default();
            for key in ["n/3", "n/1", "m/9", "n/2", "o/0"] {
                batch.put(key.as_bytes().to_vec(), Vec::new());
            }
            store.apply(batch).unwrap();
            let keys: Vec<Vec<u8>> = store
                .scan_prefix(b"n/")
                .unwrap()
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            assert_eq!(keys, vec![b"n/1".to_vec(), b"n/2".to_vec(), b"n/3".to_vec()]);
        }
    }

    #[test]
    fn later_writes_overwrite() {
        for store in backends() {
            let mut first = WriteBatch::default();
            first.put(b"k".to_vec(), b"1".to_vec());
            store.apply(first).unwrap();
            let mut second = WriteBatch::default();
            second.put(b"k".to_vec(), b"2".to_vec());
            store.apply(second).unwrap();
            assert_eq!(store.get(b"k").unwrap(), Some(b"2".to_vec()));
        }
    }
}
