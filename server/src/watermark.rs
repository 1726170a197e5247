//! File-backed watermark persistence.

use chrono::{DateTime, SecondsFormat, Utc};
use geolab_engine::clock::epoch;
use geolab_engine::error::Result;
use geolab_engine::{Error, Timestamp, WatermarkStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Keeps the watermark as a single RFC 3339 line in a file.
///
/// A missing or unreadable file reads as the epoch, which forces a full
/// resync on the next cycle.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn parse(contents: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(contents.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

impl WatermarkStore for FileWatermarkStore {
    async fn read(&self) -> Result<Timestamp> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(epoch()),
            Err(e) => return Err(Error::watermark_store(e)),
        };

        match parse(&contents) {
            Some(at) => Ok(at),
            None => {
                tracing::warn!(
                    path = %self.path.display(),
                    "unparseable watermark, starting from the epoch"
                );
                Ok(epoch())
            }
        }
    }

    async fn write(&self, at: Timestamp) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(Error::watermark_store)?;
        }

        let tmp = self.temp_path();
        let line = format!("{}\n", at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        tokio::fs::write(&tmp, line)
            .await
            .map_err(Error::watermark_store)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(Error::watermark_store)?;

        tracing::debug!(watermark = %at, "watermark persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolab_engine::clock::millis_to_timestamp;

    #[tokio::test]
    async fn missing_file_reads_as_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("last_sync.txt"));

        assert_eq!(store.read().await.unwrap(), epoch());
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("state").join("last_sync.txt"));
        let at = millis_to_timestamp(1_706_745_600_123);

        store.write(at).await.unwrap();

        assert_eq!(store.read().await.unwrap(), at);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn sub_microsecond_instants_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("last_sync.txt"));
        let at = DateTime::from_timestamp(1_706_745_600, 123_456_789).unwrap();

        store.write(at).await.unwrap();

        assert_eq!(store.read().await.unwrap(), at);
    }

    #[tokio::test]
    async fn garbage_reads_as_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_sync.txt");
        std::fs::write(&path, "yesterday-ish").unwrap();

        let store = FileWatermarkStore::new(path);
        assert_eq!(store.read().await.unwrap(), epoch());
    }

    #[tokio::test]
    async fn accepts_offset_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_sync.txt");
        std::fs::write(&path, "2024-02-01T05:00:00+05:00\n").unwrap();

        let store = FileWatermarkStore::new(path);
        assert_eq!(
            store.read().await.unwrap(),
            millis_to_timestamp(1_706_745_600_000)
        );
    }

    #[tokio::test]
    async fn unwritable_path_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let store = FileWatermarkStore::new(blocker.join("last_sync.txt"));
        let err = store.write(epoch()).await.unwrap_err();

        assert!(err.is_connectivity());
    }
}
