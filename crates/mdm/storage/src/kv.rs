//! Keyed-collection abstraction shared by both backends.

use std::time::Duration;

use mdm_core::Result;

use crate::Bucket;

/// Atomicity a backend provides for a multi-key [`KeyedStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// All writes of an update become visible together or not at all, and
    /// readers see a point-in-time snapshot.
    Transactional,
    /// Each key is written atomically on its own. Writers are still
    /// serialized, but readers may observe a partially applied update.
    PerDocument,
}

/// Point reads within a read snapshot or a write transaction.
pub trait ReadTx {
    fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Mutations within [`KeyedStore::update`].
pub trait WriteTx: ReadTx {
    /// Insert or overwrite.
    fn put(&mut self, bucket: Bucket, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key, returning whether it existed.
    fn delete(&mut self, bucket: Bucket, key: &str) -> Result<bool>;
}

/// Durable mapping from string keys to opaque values within named buckets.
///
/// Every mutating call goes through [`KeyedStore::update`], which holds a
/// single process-wide writer lock for the duration of the closure. Readers
/// never take that lock.
pub trait KeyedStore: Send + Sync + 'static {
    /// Lazy `(key, value)` sequence returned by [`KeyedStore::scan`].
    type Scan: Iterator<Item = Result<(String, Vec<u8>)>>;

    fn consistency(&self) -> Consistency;

    /// Run `f` against a consistent read view.
    fn view<T>(&self, f: impl FnOnce(&dyn ReadTx) -> Result<T>) -> Result<T>;

    /// Run `f` as one write unit.
    ///
    /// Fails with [`mdm_core::Error::Timeout`] if the writer lock is not
    /// acquired within `timeout`. When `f` returns an error nothing it wrote
    /// is kept on a [`Consistency::Transactional`] backend.
    fn update<T>(
        &self,
        timeout: Duration,
        operation: &str,
        f: impl FnOnce(&mut dyn WriteTx) -> Result<T>,
    ) -> Result<T>;

    /// Iterate a bucket. Key order for the embedded backend, unspecified for
    /// the document backend.
    fn scan(&self, bucket: Bucket) -> Result<Self::Scan>;

    fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>> {
        self.view(|tx| tx.get(bucket, key))
    }

    fn put(&self, timeout: Duration, bucket: Bucket, key: &str, value: &[u8]) -> Result<()> {
        self.update(timeout, "put", |tx| tx.put(bucket, key, value))
    }

    fn delete(&self, timeout: Duration, bucket: Bucket, key: &str) -> Result<bool> {
        self.update(timeout, "delete", |tx| tx.delete(bucket, key))
    }
}

/// Number of entries a scan fetches from the backend per round trip.
pub(crate) const SCAN_BATCH: usize = 128;
