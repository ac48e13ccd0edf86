//! Embedded single-file backend on redb.

use std::collections::VecDeque;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mdm_core::{Error, Result};
use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};

use crate::kv::SCAN_BATCH;
use crate::{Bucket, Consistency, KeyedStore, ReadTx, WriteLock, WriteTx};

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

fn table(bucket: Bucket) -> Table {
    TableDefinition::new(bucket.name())
}

/// Embedded store: ACID write transactions, MVCC snapshot reads.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    writer: Arc<WriteLock>,
}

impl RedbStore {
    /// Open or create the database at `path` and make sure every bucket exists.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(|e| Error::storage("open database", e))?;

        let txn = db
            .begin_write()
            .map_err(|e| Error::storage("create buckets", e))?;
        for bucket in Bucket::ALL {
            txn.open_table(table(bucket))
                .map_err(|e| Error::storage(format!("create bucket {bucket}"), e))?;
        }
        txn.commit()
            .map_err(|e| Error::storage("create buckets", e))?;

        tracing::debug!(path = %path.display(), "opened embedded store");

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(WriteLock::new()),
        })
    }
}

struct RedbRead {
    txn: ReadTransaction,
}

impl ReadTx for RedbRead {
    fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>> {
        let table = self
            .txn
            .open_table(table(bucket))
            .map_err(|e| Error::storage(format!("open {bucket}"), e))?;
        let value = table
            .get(key)
            .map_err(|e| Error::storage(format!("get {bucket}/{key}"), e))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }
}

struct RedbWrite<'a> {
    txn: &'a WriteTransaction,
}

impl ReadTx for RedbWrite<'_> {
    fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>> {
        let table = self
            .txn
            .open_table(table(bucket))
            .map_err(|e| Error::storage(format!("open {bucket}"), e))?;
        let value = table
            .get(key)
            .map_err(|e| Error::storage(format!("get {bucket}/{key}"), e))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }
}

impl WriteTx for RedbWrite<'_> {
    fn put(&mut self, bucket: Bucket, key: &str, value: &[u8]) -> Result<()> {
        let mut table = self
            .txn
            .open_table(table(bucket))
            .map_err(|e| Error::storage(format!("open {bucket}"), e))?;
        table
            .insert(key, value)
            .map_err(|e| Error::storage(format!("put {bucket}/{key}"), e))?;
        Ok(())
    }

    fn delete(&mut self, bucket: Bucket, key: &str) -> Result<bool> {
        let mut table = self
            .txn
            .open_table(table(bucket))
            .map_err(|e| Error::storage(format!("open {bucket}"), e))?;
        let existed = table
            .remove(key)
            .map_err(|e| Error::storage(format!("delete {bucket}/{key}"), e))?
            .is_some();
        Ok(existed)
    }
}

impl KeyedStore for RedbStore {
    type Scan = RedbScan;

    fn consistency(&self) -> Consistency {
        Consistency::Transactional
    }

    fn view<T>(&self, f: impl FnOnce(&dyn ReadTx) -> Result<T>) -> Result<T> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| Error::storage("begin read", e))?;
        f(&RedbRead { txn })
    }

    fn update<T>(
        &self,
        timeout: Duration,
        operation: &str,
        f: impl FnOnce(&mut dyn WriteTx) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.writer.acquire(timeout, operation)?;

        let txn = self
            .db
            .begin_write()
            .map_err(|e| Error::storage(format!("{operation}: begin write"), e))?;
        let result = f(&mut RedbWrite { txn: &txn });

        match result {
            Ok(value) => {
                txn.commit()
                    .map_err(|e| Error::storage(format!("{operation}: commit"), e))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    tracing::warn!(operation, error = %abort, "abort after failed update");
                }
                Err(e)
            }
        }
    }

    fn scan(&self, bucket: Bucket) -> Result<RedbScan> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| Error::storage("begin read", e))?;
        let table = txn
            .open_table(table(bucket))
            .map_err(|e| Error::storage(format!("open {bucket}"), e))?;
        Ok(RedbScan {
            bucket,
            table,
            last: None,
            buffer: VecDeque::new(),
            done: false,
        })
    }
}

/// Snapshot scan over one bucket, fetched in key-ordered batches.
pub struct RedbScan {
    bucket: Bucket,
    table: ReadOnlyTable<&'static str, &'static [u8]>,
    last: Option<String>,
    buffer: VecDeque<(String, Vec<u8>)>,
    done: bool,
}

impl RedbScan {
    fn fill(&mut self) -> Result<()> {
        let start = self.last.clone();
        let lower: Bound<&str> = match start.as_deref() {
            Some(last) => Bound::Excluded(last),
            None => Bound::Unbounded,
        };
        let range = self
            .table
            .range::<&str>((lower, Bound::Unbounded))
            .map_err(|e| Error::storage(format!("scan {}", self.bucket), e))?;

        let mut batch = Vec::with_capacity(SCAN_BATCH);
        for entry in range.take(SCAN_BATCH) {
            let (key, value) =
                entry.map_err(|e| Error::storage(format!("scan {}", self.bucket), e))?;
            batch.push((key.value().to_string(), value.value().to_vec()));
        }

        if batch.len() < SCAN_BATCH {
            self.done = true;
        }
        if let Some((key, _)) = batch.last() {
            self.last = Some(key.clone());
        }
        self.buffer.extend(batch);
        Ok(())
    }
}

impl Iterator for RedbScan {
    type Item = Result<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    fn open() -> (tempfile::TempDir, RedbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("mdm.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let (_dir, store) = open();

        let err = store
            .update(T, "test", |tx| {
                tx.put(Bucket::Profiles, "p1", b"one")?;
                Err::<(), _>(Error::conflict("abort"))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(store.get(Bucket::Profiles, "p1").unwrap(), None);
    }

    #[test]
    fn test_scan_spans_batches_in_key_order() {
        let (_dir, store) = open();
        store
            .update(T, "fill", |tx| {
                for i in 0..(SCAN_BATCH * 2 + 3) {
                    tx.put(Bucket::Devices, &format!("{i:05}"), b"x")?;
                }
                Ok(())
            })
            .unwrap();

        let keys: Vec<String> = store
            .scan(Bucket::Devices)
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys.len(), SCAN_BATCH * 2 + 3);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_scan_is_a_snapshot() {
        let (_dir, store) = open();
        store.put(T, Bucket::Profiles, "a", b"1").unwrap();

        let scan = store.scan(Bucket::Profiles).unwrap();
        store.put(T, Bucket::Profiles, "b", b"2").unwrap();

        assert_eq!(scan.count(), 1);
    }

    #[test]
    fn test_buckets_are_isolated() {
        let (_dir, store) = open();
        store.put(T, Bucket::Profiles, "k", b"profile").unwrap();

        assert_eq!(store.get(Bucket::Blueprints, "k").unwrap(), None);
        assert!(store.delete(T, Bucket::Profiles, "k").unwrap());
        assert!(!store.delete(T, Bucket::Profiles, "k").unwrap());
    }
}
