// ── Subscriber persistence ──
//
// The registry owns allocation; stores only persist records keyed by IMSI.
// Two backends ship: an in-memory map for tests and embedding, and a
// directory of JSON documents for the CLI. The directory can be shared by
// several processes, so it also provides a lock the registry holds for
// the whole of every mutation.

mod json_file;
mod memory;

use std::fs::File;
use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::model::{Imsi, Subscriber};

/// Backend failure. Surfaces to callers as
/// [`CoreError::StoreFailure`](crate::CoreError::StoreFailure).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("record {imsi} already exists")]
    Exists { imsi: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Exclusive access to a store's backing storage. Released on drop.
#[derive(Debug, Default)]
pub struct StoreLock {
    _file: Option<File>,
}

impl StoreLock {
    pub(crate) fn file(file: File) -> Self {
        Self { _file: Some(file) }
    }
}

/// Durable subscriber records keyed by IMSI.
pub trait SubscriberStore: Send + Sync {
    fn get(&self, imsi: &Imsi) -> impl Future<Output = Result<Option<Subscriber>, StoreError>> + Send;

    /// Insert or replace the record for `subscriber.imsi`.
    fn put(&self, subscriber: &Subscriber) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert a new record; [`StoreError::Exists`] if one is already there.
    fn create(&self, subscriber: &Subscriber) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a record, reporting whether one existed.
    fn delete(&self, imsi: &Imsi) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Every record, ordered by IMSI.
    fn list(&self) -> impl Future<Output = Result<Vec<Subscriber>, StoreError>> + Send;

    /// Shut out every other writer of the same storage, including other
    /// processes. Storage private to one process needs no lock.
    fn lock(&self) -> impl Future<Output = Result<StoreLock, StoreError>> + Send {
        async { Ok(StoreLock::default()) }
    }
}
