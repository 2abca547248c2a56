use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::{
    core::{DeviceId, PersistedRecord, RecordId, Sample},
    error::StorageError,
    prelude::*,
    storage::Storage,
};

/// Append-only [JSON Lines](https://jsonlines.org/) file, one record per line.
///
/// Every append is followed by `fsync`, a failed append is truncated away. The last record of
/// each device is indexed in memory, the index is rebuilt from the file on open. A torn trailing
/// line (crash in the middle of an append) is skipped.
pub struct JsonLinesStorage {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    next_id: RecordId,
    last_saved: HashMap<DeviceId, PersistedRecord>,

    /// Previous append may have left a partial line behind.
    is_torn: bool,
}

impl JsonLinesStorage {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => String::new(),
            Err(error) => {
                return Err(error).with_context(|| format!("failed to read `{}`", path.display()));
            }
        };

        let mut last_saved = HashMap::new();
        let mut max_id = 0;
        for (line_number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PersistedRecord>(line) {
                Ok(record) => {
                    max_id = max_id.max(record.id.0);
                    last_saved.insert(record.sample.device_id.clone(), record);
                }
                Err(error) => {
                    let line_number = line_number + 1;
                    warn!(line_number, "skipping an unreadable record: {error:#}");
                }
            }
        }
        info!(n_devices = last_saved.len(), max_id, "opened");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open `{}` for appending", path.display()))?;
        let inner = Inner {
            file,
            next_id: RecordId(max_id + 1),
            last_saved,
            is_torn: !contents.is_empty() && !contents.ends_with('\n'),
        };
        Ok(Self { path, inner: Mutex::new(inner) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Inner {
    /// Write the line and wait until it reaches the disk.
    async fn append(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        // `sync_data` does not report the errors of the background write.
        self.file.flush().await?;
        self.file.sync_data().await
    }

    /// Cut off whatever part of a failed append reached the file.
    async fn roll_back(&mut self, length: u64) {
        let truncated = match self.file.set_len(length).await {
            Ok(()) => self.file.sync_data().await,
            Err(error) => Err(error),
        };
        if let Err(error) = truncated {
            error!(length, "failed to roll back the append: {error:#}");
            // The record may still turn up on reopen: never hand out its identifier again,
            // and start the next append on a fresh line.
            self.next_id = RecordId(self.next_id.0 + 1);
            self.is_torn = true;
        }
    }
}

#[async_trait]
impl Storage for JsonLinesStorage {
    #[instrument(skip_all, fields(device_id = %sample.device_id))]
    async fn save(&self, sample: &Sample) -> Result<PersistedRecord, StorageError> {
        let mut inner = self.inner.lock().await;
        let record =
            PersistedRecord { id: inner.next_id, created_at: Utc::now(), sample: sample.clone() };

        let mut line = Vec::new();
        if inner.is_torn {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, &record)?;
        line.push(b'\n');

        let length = inner.file.metadata().await?.len();
        if let Err(error) = inner.append(&line).await {
            inner.roll_back(length).await;
            return Err(error.into());
        }
        inner.is_torn = false;

        inner.next_id = RecordId(record.id.0 + 1);
        inner.last_saved.insert(record.sample.device_id.clone(), record.clone());
        drop(inner);
        debug!(id = %record.id, "appended");
        Ok(record)
    }

    async fn get_last_saved(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<PersistedRecord>, StorageError> {
        Ok(self.inner.lock().await.last_saved.get(device_id).cloned())
    }
}
