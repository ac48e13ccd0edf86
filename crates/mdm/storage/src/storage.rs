//! Entity stores over any [`KeyedStore`].

use std::sync::Arc;
use std::time::Duration;

use mdm_core::{Error, Record, Resource, Result, marshal, unmarshal};

use crate::{Bucket, Consistency, KeyedStore, ReadTx, UserCatalog, WriteTx};

/// How long a write waits for the writer lock by default.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Entity stores backed by a [`KeyedStore`].
///
/// Implements every store trait in this crate; multi-key invariants (indices,
/// name uniqueness, profile references) are checked and written inside a
/// single [`KeyedStore::update`].
pub struct Storage<S> {
    kv: Arc<S>,
    users: Option<Arc<dyn UserCatalog>>,
    write_timeout: Duration,
}

impl<S> Clone for Storage<S> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            users: self.users.clone(),
            write_timeout: self.write_timeout,
        }
    }
}

impl<S: KeyedStore> Storage<S> {
    pub fn new(kv: S) -> Self {
        Self {
            kv: Arc::new(kv),
            users: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Check blueprint user UUIDs against `users` on save.
    pub fn with_user_catalog(mut self, users: Arc<dyn UserCatalog>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn consistency(&self) -> Consistency {
        self.kv.consistency()
    }

    pub fn backend(&self) -> &S {
        &self.kv
    }

    pub(crate) fn users(&self) -> Option<&dyn UserCatalog> {
        self.users.as_deref()
    }

    pub(crate) fn update<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut dyn WriteTx) -> Result<T>,
    ) -> Result<T> {
        self.kv.update(self.write_timeout, operation, f)
    }

    pub(crate) fn view<T>(&self, f: impl FnOnce(&dyn ReadTx) -> Result<T>) -> Result<T> {
        self.kv.view(f)
    }

    pub(crate) fn record<T: Record>(&self, bucket: Bucket, key: &str) -> Result<Option<T>> {
        self.view(|tx| tx.record(bucket, key))
    }

    pub(crate) fn records<T: Record>(&self, bucket: Bucket) -> Result<Vec<T>> {
        self.kv
            .scan(bucket)?
            .map(|entry| entry.and_then(|(_, value)| unmarshal(&value)))
            .collect()
    }

    pub(crate) fn keyed_records<T: Record>(
        &self,
        bucket: Bucket,
        keep: impl Fn(&str) -> bool,
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for entry in self.kv.scan(bucket)? {
            let (key, value) = entry?;
            if keep(&key) {
                out.push(unmarshal(&value)?);
            }
        }
        Ok(out)
    }
}

/// Typed reads on top of [`ReadTx`].
pub(crate) trait ReadTxExt: ReadTx {
    fn record<T: Record>(&self, bucket: Bucket, key: &str) -> Result<Option<T>> {
        match self.get(bucket, key)? {
            Some(bytes) => unmarshal(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Read an index entry holding a primary key.
    fn index(&self, bucket: Bucket, key: &str, resource: Resource) -> Result<Option<String>> {
        match self.get(bucket, key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| Error::codec(resource, e)),
            None => Ok(None),
        }
    }
}

impl<R: ReadTx + ?Sized> ReadTxExt for R {}

/// Typed writes on top of [`WriteTx`].
pub(crate) trait WriteTxExt: WriteTx {
    fn put_record<T: Record>(&mut self, bucket: Bucket, key: &str, value: &T) -> Result<()> {
        let bytes = marshal(value)?;
        self.put(bucket, key, &bytes)
    }
}

impl<W: WriteTx + ?Sized> WriteTxExt for W {}
