use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, trace, warn};

use super::{StoreError, StoreLock, SubscriberStore};
use crate::model::{Imsi, Subscriber};

const EXTENSION: &str = "json";
const LOCK_FILE: &str = ".lock";

/// One pretty-printed JSON document per subscriber, named `<imsi>.json`.
///
/// Writes go to a sibling temp file and are renamed (or, for new records,
/// hard-linked) into place, so a crash never leaves a half-written record
/// behind. [`lock`](SubscriberStore::lock) takes an advisory `flock` on
/// `.lock` in the directory, shared by every process using it.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) the store directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, imsi: &Imsi) -> PathBuf {
        self.dir.join(format!("{imsi}.{EXTENSION}"))
    }

    async fn read_record(path: &Path) -> Result<Option<Subscriber>, StoreError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.to_owned(),
                message: e.to_string(),
            })
    }

    /// Serialize `subscriber` into the temp file next to its record.
    async fn write_temp(&self, subscriber: &Subscriber) -> Result<(PathBuf, PathBuf), StoreError> {
        let path = self.record_path(&subscriber.imsi);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(subscriber).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&tmp, body).await.map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        Ok((tmp, path))
    }
}

impl SubscriberStore for JsonFileStore {
    async fn get(&self, imsi: &Imsi) -> Result<Option<Subscriber>, StoreError> {
        Self::read_record(&self.record_path(imsi)).await
    }

    async fn put(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        let (tmp, path) = self.write_temp(subscriber).await?;
        tokio::fs::rename(&tmp, &path).await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(imsi = %subscriber.imsi, path = %path.display(), "wrote subscriber record");
        Ok(())
    }

    async fn create(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        let (tmp, path) = self.write_temp(subscriber).await?;
        // link(2) fails if the target exists, which rename(2) would not.
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            warn!(path = %tmp.display(), error = %e, "could not remove temp record");
        }

        match linked {
            Ok(()) => {
                debug!(imsi = %subscriber.imsi, path = %path.display(), "created subscriber record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::Exists {
                imsi: subscriber.imsi.to_string(),
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn delete(&self, imsi: &Imsi) -> Result<bool, StoreError> {
        let path = self.record_path(imsi);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn list(&self) -> Result<Vec<Subscriber>, StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;

        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(subscriber)) => all.push(subscriber),
                Ok(None) => {}
                Err(StoreError::Corrupt { path, message }) => {
                    warn!(path = %path.display(), %message, "skipping unreadable subscriber record");
                }
                Err(e) => return Err(e),
            }
        }

        all.sort_by(|a, b| a.imsi.cmp(&b.imsi));
        Ok(all)
    }

    async fn lock(&self) -> Result<StoreLock, StoreError> {
        let path = self.dir.join(LOCK_FILE);
        let opened = path.clone();
        let locked = tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&opened)?;
            FileExt::lock_exclusive(&file)?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store lock task failed: {e}")))?;

        let file = locked.map_err(|source| StoreError::Io { path, source })?;
        trace!(dir = %self.dir.display(), "store lock acquired");
        Ok(StoreLock::file(file))
    }
}
