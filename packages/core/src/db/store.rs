//! Transactional key-value store with one column family per context.
//!
//! Every durable entity lives inside a *context* (a tenant keyspace named by
//! its UUID); server-global state lives in the `default` context. The store
//! is a RocksDB `TransactionDB`, so read-modify-write sequences can take
//! pessimistic locks on every key they read and commit atomically.

use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use rocksdb::{
    ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options, Transaction,
    TransactionDB, TransactionDBOptions,
};

use super::StoreError;

/// Name of the column family holding server-global state.
pub const DEFAULT_CONTEXT: &str = "default";

/// Process-wide store handle. Shared between adapter tasks behind an `Arc`;
/// all cross-task coordination goes through transactions, never through
/// process-local caches.
pub struct Store {
    db: TransactionDB<MultiThreaded>,
    contexts: RwLock<HashSet<String>>,
}

impl Store {
    /// Open the store, enumerating existing column families and creating the
    /// database (with its `default` family) on first run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut options = Options::default();
        options.create_if_missing(true);

        let names = rocksdb::DB::list_cf(&options, path)
            .unwrap_or_else(|_| vec![DEFAULT_CONTEXT.to_string()]);
        let descriptors = names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(
            &options,
            &TransactionDBOptions::default(),
            path,
            descriptors,
        )
        .map_err(|source| StoreError::open_failed(path.display().to_string(), source))?;

        Ok(Self {
            db,
            contexts: RwLock::new(names.into_iter().collect()),
        })
    }

    /// Create the column family for a new context.
    pub fn create_context(&self, uuid: &str) -> Result<(), StoreError> {
        let mut contexts = self.contexts.write().expect("context registry poisoned");
        if contexts.contains(uuid) {
            return Err(StoreError::AlreadyExists(uuid.to_string()));
        }
        self.db.create_cf(uuid, &Options::default())?;
        contexts.insert(uuid.to_string());
        Ok(())
    }

    /// Drop a context and everything stored inside it.
    pub fn delete_context(&self, uuid: &str) -> Result<(), StoreError> {
        let mut contexts = self.contexts.write().expect("context registry poisoned");
        if !contexts.contains(uuid) {
            return Err(StoreError::NotExists(uuid.to_string()));
        }
        self.db.drop_cf(uuid)?;
        contexts.remove(uuid);
        Ok(())
    }

    /// All context uuids, excluding the `default` family.
    pub fn contexts(&self) -> Vec<String> {
        let contexts = self.contexts.read().expect("context registry poisoned");
        let mut names: Vec<String> = contexts
            .iter()
            .filter(|name| name.as_str() != DEFAULT_CONTEXT)
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn has_context(&self, uuid: &str) -> bool {
        self.contexts
            .read()
            .expect("context registry poisoned")
            .contains(uuid)
    }

    fn cf(&self, context: &str) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle(context)
            .ok_or_else(|| StoreError::NotExists(context.to_string()))
    }

    pub fn put(&self, key: &[u8], value: &[u8], context: &str) -> Result<(), StoreError> {
        let cf = self.cf(context)?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8], context: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(context)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in
    /// lexicographic key order. Numeric key segments are fixed-width
    /// big-endian so this equals numeric order.
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        context: &str,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let cf = self.cf(context)?;
        let mut values = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push((key.into_vec(), value.into_vec()));
        }
        Ok(values)
    }

    /// Like `scan_prefix`, but starting at `start` instead of the first key
    /// under the prefix. Used to resume header scans past a watermark.
    pub fn scan_from(
        &self,
        start: &[u8],
        prefix: &[u8],
        context: &str,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let cf = self.cf(context)?;
        let mut values = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(start, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push((key.into_vec(), value.into_vec()));
        }
        Ok(values)
    }

    pub fn delete(&self, key: &[u8], context: &str) -> Result<(), StoreError> {
        let cf = self.cf(context)?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    /// Begin a pessimistic read-modify-write transaction. Reads through the
    /// transaction lock their keys (`get_for_update`); dropping the
    /// transaction without committing rolls it back.
    pub fn begin(&self) -> StoreTxn<'_> {
        StoreTxn {
            store: self,
            txn: self.db.transaction(),
        }
    }
}

/// One open store transaction.
pub struct StoreTxn<'a> {
    store: &'a Store,
    txn: Transaction<'a, TransactionDB<MultiThreaded>>,
}

impl<'a> StoreTxn<'a> {
    pub fn put(&self, key: &[u8], value: &[u8], context: &str) -> Result<(), StoreError> {
        let cf = self.store.cf(context)?;
        self.txn.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Read with a pessimistic lock on the key.
    pub fn get(&self, key: &[u8], context: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.store.cf(context)?;
        Ok(self.txn.get_for_update_cf(&cf, key, true)?)
    }

    pub fn delete(&self, key: &[u8], context: &str) -> Result<(), StoreError> {
        let cf = self.store.cf(context)?;
        self.txn.delete_cf(&cf, key)?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.txn
            .commit()
            .map_err(|e| StoreError::transaction_failed(format!("Unable to commit: {}", e)))
    }

    pub fn rollback(self) -> Result<(), StoreError> {
        self.txn
            .rollback()
            .map_err(|e| StoreError::transaction_failed(format!("Unable to rollback: {}", e)))
    }
}
