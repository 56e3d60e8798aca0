//! File-backed record store.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::{BatchEntry, Ledger, StoreError};

const REFERENCES_FILE: &str = "references.json";
const USED_FILE: &str = "used.json";
const LEDGER_FILE: &str = "ledger.tsv";
const BATCH_DIR: &str = "batches";

/// Owns every on-disk representation of the republishing state.
///
/// The store keeps nothing in memory: each call reads the files it needs and
/// writes them back before returning.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
    ledger: Ledger,
}

impl RecordStore {
    /// Open a store rooted at `root`, creating the directory layout and the
    /// used-list and ledger files if they don't exist.
    #[tracing::instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(BATCH_DIR)).await?;

        let store = Self {
            ledger: Ledger::new(root.join(LEDGER_FILE)),
            root,
        };

        if !fs::try_exists(store.used_path()).await? {
            store.write_json(&store.used_path(), &Vec::<String>::new()).await?;
            debug!("initialized used list");
        }
        store.ledger.initialize().await?;

        info!("record store ready");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn references_path(&self) -> PathBuf {
        self.root.join(REFERENCES_FILE)
    }

    pub fn used_path(&self) -> PathBuf {
        self.root.join(USED_FILE)
    }

    /// Path of the queue file for `date`.
    pub fn batch_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(BATCH_DIR)
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Every known reference, in file order.
    pub async fn all_items(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read_json::<Vec<String>>(&self.references_path())
            .await?
            .unwrap_or_default())
    }

    /// Replace the list of known references.
    pub async fn set_all_items(&self, items: &[String]) -> Result<(), StoreError> {
        self.write_json(&self.references_path(), &items).await
    }

    /// References already consumed by some batch.
    pub async fn used_items(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read_json::<Vec<String>>(&self.used_path())
            .await?
            .unwrap_or_default())
    }

    /// Append references to the used list in a single write.
    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub async fn append_used(&self, items: &[String]) -> Result<(), StoreError> {
        let mut used = self.used_items().await?;
        used.extend_from_slice(items);
        self.write_json(&self.used_path(), &used).await
    }

    /// Whether a queue file exists for `date` (even an empty one).
    pub async fn has_batch(&self, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.batch_path(date)).await?)
    }

    /// Load the queue for `date`, or `None` if it was never created.
    pub async fn load_batch(&self, date: NaiveDate) -> Result<Option<Vec<BatchEntry>>, StoreError> {
        self.read_json(&self.batch_path(date)).await
    }

    /// Persist the queue for `date`.
    #[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn save_batch(&self, date: NaiveDate, entries: &[BatchEntry]) -> Result<(), StoreError> {
        self.write_json(&self.batch_path(date), &entries).await
    }

    /// Read a JSON file. Missing files read as `None`; malformed files are
    /// logged and read as `Some(default)`.
    async fn read_json<T>(&self, path: &Path) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let err = StoreError::Corrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                };
                error!(error = %err, "treating corrupt file as empty");
                Ok(Some(T::default()))
            }
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(value)?;
        write_atomic(path, content.as_bytes()).await
    }
}

/// Write `content` to a sibling temp file, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;

    fs::rename(&temp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(reference: &str) -> BatchEntry {
        BatchEntry {
            reference: reference.to_string(),
            media_path: PathBuf::from(format!("media/{reference}.mp4")),
            caption: format!("caption for {reference}"),
            source_url: reference.to_string(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    #[tokio::test]
    async fn open_initializes_layout() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();

        assert!(store.used_path().exists());
        assert!(store.ledger().path().exists());
        assert!(dir.path().join(BATCH_DIR).is_dir());
        assert!(store.used_items().await.unwrap().is_empty());
        // The operator supplies references.json; it is never created for them
        assert!(!store.references_path().exists());
        assert!(store.all_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_preserves_existing_used_list() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(USED_FILE), r#"["a","b"]"#).unwrap();

        let store = RecordStore::open(dir.path()).await.unwrap();
        assert_eq!(store.used_items().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn append_used_extends_in_order() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();

        store.append_used(&["a".into(), "b".into()]).await.unwrap();
        store.append_used(&["c".into()]).await.unwrap();

        assert_eq!(store.used_items().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn corrupt_list_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        std::fs::write(store.references_path(), "{not json").unwrap();

        assert!(store.all_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_absent_vs_empty() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();

        assert!(!store.has_batch(date()).await.unwrap());
        assert_eq!(store.load_batch(date()).await.unwrap(), None);

        store.save_batch(date(), &[]).await.unwrap();
        assert!(store.has_batch(date()).await.unwrap());
        assert_eq!(store.load_batch(date()).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn batch_round_trip_keeps_order() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let entries = vec![entry("a"), entry("b"), entry("c")];

        store.save_batch(date(), &entries).await.unwrap();

        assert_eq!(store.load_batch(date()).await.unwrap(), Some(entries));
        assert!(
            store
                .batch_path(date())
                .ends_with("batches/2024-05-06.json")
        );
    }

    #[tokio::test]
    async fn corrupt_batch_reads_as_empty_queue() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        std::fs::write(store.batch_path(date()), "[{\"reference\":").unwrap();

        assert_eq!(store.load_batch(date()).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        store.save_batch(date(), &[entry("a")]).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join(BATCH_DIR))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
