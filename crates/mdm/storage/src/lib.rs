//! MDM Storage Layer
//!
//! A [`KeyedStore`] abstraction with two backends, an embedded redb file
//! ([`RedbStore`]) and a SQLite document table ([`DocumentStore`]), plus the
//! entity stores implemented on top of either by [`Storage`].

mod blueprint;
mod bucket;
mod dep;
mod device;
mod document;
mod embedded;
mod kv;
mod lock;
mod models;
mod profile;
mod push;
mod schema;
mod storage;
mod traits;

pub use bucket::Bucket;
pub use document::{DEFAULT_POOL_SIZE, DocumentScan, DocumentStore};
pub use embedded::{RedbScan, RedbStore};
pub use kv::*;
pub use lock::WriteLock;
pub use storage::{DEFAULT_WRITE_TIMEOUT, Storage};
pub use traits::*;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
