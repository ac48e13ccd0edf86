//! Document-store backend: one `documents` table in SQLite via diesel.
//!
//! Every key is its own row and each statement commits on its own, so a
//! multi-key update is only atomic per document. Writers are serialized by
//! the shared [`WriteLock`], which closes check-then-act races between
//! concurrent savers in this process.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection as _;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use mdm_core::{Error, Result};

use crate::kv::SCAN_BATCH;
use crate::models::{DocumentRow, NewDocument};
use crate::schema::documents;
use crate::{Bucket, Consistency, KeyedStore, ReadTx, WriteLock, WriteTx};

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqliteConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite-backed document store.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    writer: Arc<WriteLock>,
}

impl DocumentStore {
    /// Create a document store from a database URL and run migrations.
    pub fn new(database_url: &str, pool_size: u32) -> color_eyre::eyre::Result<Self> {
        use color_eyre::eyre::WrapErr as _;

        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .wrap_err("failed to create connection pool")?;

        let store = Self {
            pool,
            writer: Arc::new(WriteLock::new()),
        };
        store.run_migrations()?;

        tracing::debug!(database_url, pool_size, "opened document store");
        Ok(store)
    }

    /// Run migrations.
    pub fn run_migrations(&self) -> color_eyre::eyre::Result<()> {
        use color_eyre::eyre::WrapErr as _;
        use diesel_migrations::MigrationHarness as _;

        let mut conn = self
            .pool
            .get()
            .wrap_err("failed to get connection for migrations")?;

        conn.run_pending_migrations(crate::MIGRATIONS)
            .map_err(|e| color_eyre::eyre::eyre!("migration failed: {}", e))?;

        Ok(())
    }

    fn conn(&self) -> Result<SqliteConn> {
        self.pool
            .get()
            .map_err(|e| Error::storage("get database connection", e))
    }
}

struct DocumentTx {
    conn: std::cell::RefCell<SqliteConn>,
}

impl ReadTx for DocumentTx {
    fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.borrow_mut();
        documents::table
            .filter(documents::collection.eq(bucket.name()))
            .filter(documents::id.eq(key))
            .select(documents::body)
            .first::<Vec<u8>>(&mut *conn)
            .optional()
            .map_err(|e| Error::storage(format!("get {bucket}/{key}"), e))
    }
}

impl WriteTx for DocumentTx {
    fn put(&mut self, bucket: Bucket, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn.get_mut();
        let now = chrono::Utc::now().naive_utc();

        diesel::insert_into(documents::table)
            .values(&NewDocument {
                collection: bucket.name(),
                id: key,
                body: value,
                updated_at: now,
            })
            .on_conflict((documents::collection, documents::id))
            .do_update()
            .set((documents::body.eq(value), documents::updated_at.eq(now)))
            .execute(conn)
            .map_err(|e| Error::storage(format!("put {bucket}/{key}"), e))?;

        tracing::debug!(%bucket, key, "stored document");
        Ok(())
    }

    fn delete(&mut self, bucket: Bucket, key: &str) -> Result<bool> {
        let conn = self.conn.get_mut();

        let deleted = diesel::delete(
            documents::table
                .filter(documents::collection.eq(bucket.name()))
                .filter(documents::id.eq(key)),
        )
        .execute(conn)
        .map_err(|e| Error::storage(format!("delete {bucket}/{key}"), e))?;

        Ok(deleted > 0)
    }
}

impl KeyedStore for DocumentStore {
    type Scan = DocumentScan;

    fn consistency(&self) -> Consistency {
        Consistency::PerDocument
    }

    fn view<T>(&self, f: impl FnOnce(&dyn ReadTx) -> Result<T>) -> Result<T> {
        let tx = DocumentTx {
            conn: std::cell::RefCell::new(self.conn()?),
        };
        f(&tx)
    }

    fn update<T>(
        &self,
        timeout: Duration,
        operation: &str,
        f: impl FnOnce(&mut dyn WriteTx) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.writer.acquire(timeout, operation)?;
        let mut tx = DocumentTx {
            conn: std::cell::RefCell::new(self.conn()?),
        };
        f(&mut tx)
    }

    fn scan(&self, bucket: Bucket) -> Result<DocumentScan> {
        Ok(DocumentScan {
            pool: self.pool.clone(),
            bucket,
            last: None,
            buffer: VecDeque::new(),
            done: false,
        })
    }
}

/// Keyset-paginated scan; sees rows committed between batches.
pub struct DocumentScan {
    pool: SqlitePool,
    bucket: Bucket,
    last: Option<String>,
    buffer: VecDeque<(String, Vec<u8>)>,
    done: bool,
}

impl DocumentScan {
    fn fill(&mut self) -> Result<()> {
        let operation = || format!("scan {}", self.bucket);
        let mut conn = self.pool.get().map_err(|e| Error::storage(operation(), e))?;

        let mut query = documents::table
            .filter(documents::collection.eq(self.bucket.name()))
            .order(documents::id.asc())
            .limit(SCAN_BATCH as i64)
            .select(DocumentRow::as_select())
            .into_boxed();
        if let Some(last) = &self.last {
            query = query.filter(documents::id.gt(last.clone()));
        }

        let rows: Vec<DocumentRow> = query
            .load(&mut conn)
            .map_err(|e| Error::storage(operation(), e))?;

        if rows.len() < SCAN_BATCH {
            self.done = true;
        }
        if let Some(row) = rows.last() {
            self.last = Some(row.id.clone());
        }
        self.buffer
            .extend(rows.into_iter().map(|row| (row.id, row.body)));
        Ok(())
    }
}

impl Iterator for DocumentScan {
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
