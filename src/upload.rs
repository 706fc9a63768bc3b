use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::UploadError;

/// How long an uploaded file is kept before the sweep removes it
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(72 * 60 * 60);

/// How often the sweep runs
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of one retention sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Files deleted because they were older than the retention window
    pub removed: Vec<PathBuf>,
    /// Files still within the retention window
    pub kept: usize,
}

/// Directory-backed store for uploaded export files
///
/// Every stored file gets a fresh UUID name so uploads never overwrite each
/// other; the original extension is kept (lowercased) so downstream tools can
/// still tell a `.json` from anything else.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        UploadStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the upload directory if it doesn't exist
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Generate the on-disk name for an upload
    ///
    /// # Examples
    /// ```
    /// use heatmap::upload::UploadStore;
    ///
    /// let name = UploadStore::unique_filename("Records.JSON");
    /// assert!(name.ends_with(".json"));
    /// ```
    pub fn unique_filename(original_name: &str) -> String {
        let id = Uuid::new_v4();
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| !e.is_empty());

        match extension {
            Some(ext) => format!("{id}.{ext}"),
            None => id.to_string(),
        }
    }

    /// Persist one uploaded file and return where it was written
    ///
    /// # Arguments
    /// * `original_name` - File name as sent by the client, used only for its extension
    /// * `contents` - File body
    ///
    /// # Returns
    /// * `Result<PathBuf, UploadError>` - Path of the stored file
    pub async fn store(&self, original_name: &str, contents: &[u8]) -> Result<PathBuf, UploadError> {
        self.ensure_dir().await?;
        let path = self.dir.join(Self::unique_filename(original_name));
        tokio::fs::write(&path, contents).await?;
        log::debug!("stored upload {} ({} bytes)", path.display(), contents.len());
        Ok(path)
    }

    /// Persist two files that only make sense together
    ///
    /// If the second write fails the first file is removed again, so a failed
    /// upload leaves nothing behind for the sweep to find.
    pub async fn store_pair(
        &self,
        first: (&str, &[u8]),
        second: (&str, &[u8]),
    ) -> Result<(PathBuf, PathBuf), UploadError> {
        let first_path = self.store(first.0, first.1).await?;
        match self.store(second.0, second.1).await {
            Ok(second_path) => Ok((first_path, second_path)),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&first_path).await {
                    log::warn!("failed to remove {}: {}", first_path.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    /// Delete every regular file whose modification time is older than `retention`
    ///
    /// Files that cannot be inspected or removed are logged and skipped so a
    /// single bad entry doesn't stop the sweep.
    pub async fn sweep(&self, retention: Duration) -> std::io::Result<SweepReport> {
        self.sweep_at(SystemTime::now(), retention).await
    }

    async fn sweep_at(&self, now: SystemTime, retention: Duration) -> std::io::Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("cannot inspect {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age <= retention {
                report.kept += 1;
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::info!("removed expired upload {}", path.display());
                    report.removed.push(path);
                }
                Err(e) => log::warn!("failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(report)
    }

    /// Run [`UploadStore::sweep`] periodically on the tokio runtime
    ///
    /// The first sweep happens immediately, then once every `interval`.
    pub fn spawn_sweeper(self, interval: Duration, retention: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.sweep(retention).await {
                    Ok(report) => log::debug!(
                        "upload sweep: {} removed, {} kept",
                        report.removed.len(),
                        report.kept
                    ),
                    Err(e) => log::error!("upload sweep of {} failed: {}", self.dir.display(), e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_filename_keeps_lowercased_extension() {
        let name = UploadStore::unique_filename("Records.JSON");
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "json");
        assert!(Uuid::parse_str(stem).is_ok());

        assert_ne!(
            UploadStore::unique_filename("a.json"),
            UploadStore::unique_filename("a.json")
        );
    }

    #[test]
    fn test_unique_filename_without_extension() {
        let name = UploadStore::unique_filename("Settings");
        assert!(Uuid::parse_str(&name).is_ok());
    }

    #[tokio::test]
    async fn test_store_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"));

        let path = store.store("Records.json", b"{\"locations\": []}").await.unwrap();

        assert!(path.starts_with(store.dir()));
        assert_eq!(path.extension().unwrap(), "json");
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "{\"locations\": []}");
    }

    #[tokio::test]
    async fn test_store_pair_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let (records, settings) = store
            .store_pair(
                ("Records.json", b"[1]".as_slice()),
                ("Settings.json", b"[2]".as_slice()),
            )
            .await
            .unwrap();

        assert_ne!(records, settings);
        assert_eq!(tokio::fs::read(&records).await.unwrap(), b"[1]");
        assert_eq!(tokio::fs::read(&settings).await.unwrap(), b"[2]");
    }

    #[tokio::test]
    async fn test_store_pair_leaves_nothing_when_second_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        // The extension alone is longer than any file system allows for a name
        let too_long = format!("Settings.{}", "j".repeat(300));

        let result = store
            .store_pair(
                ("Records.json", b"{}".as_slice()),
                (too_long.as_str(), b"{}".as_slice()),
            )
            .await;

        assert!(matches!(result, Err(UploadError::Io(_))));
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let old = store.store("old.json", b"{}").await.unwrap();
        let fresh = store.store("fresh.json", b"{}").await.unwrap();
        tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();

        // Pretend the clock moved forward past the retention of `old` only
        let old_mtime = tokio::fs::metadata(&old).await.unwrap().modified().unwrap();
        let fresh_file = std::fs::File::options().write(true).open(&fresh).unwrap();
        fresh_file
            .set_modified(old_mtime + Duration::from_secs(3600))
            .unwrap();
        let now = old_mtime + DEFAULT_RETENTION + Duration::from_secs(60);

        let report = store.sweep_at(now, DEFAULT_RETENTION).await.unwrap();

        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.kept, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_sweep_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("never-created"));
        let report = store.sweep(DEFAULT_RETENTION).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_first_sweep_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let path = store.store("a.json", b"{}").await.unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let handle = store
            .clone()
            .spawn_sweeper(Duration::from_secs(3600), Duration::from_secs(60));

        let mut removed = false;
        for _ in 0..100 {
            if !path.exists() {
                removed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(removed);
    }
}
