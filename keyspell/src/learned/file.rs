use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tempfile::NamedTempFile;

use super::memory::{MemoryStorage, Snapshot};
use super::storage::{LearnedWordEntry, LearningStats, VocabularyStorage, WordUpsert};
use crate::error::StorageError;

/// Learned words kept in memory and written to a JSON file after every
/// mutation.
///
/// Writes go to a temporary file in the same directory which then replaces
/// the target, so a crash mid-write leaves the previous file intact.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    inner: MemoryStorage,
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Opens `path`, starting empty if it does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<JsonFileStorage, StorageError> {
        let path = path.as_ref().to_path_buf();

        let inner = match File::open(&path) {
            Ok(file) => {
                let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
                    .map_err(|e| StorageError::Corrupted(format!("{}: {}", path.display(), e)))?;
                debug!("loaded {} learned words from {}", snapshot.entries.len(), path.display());
                MemoryStorage::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => MemoryStorage::new(),
            Err(e) => return Err(StorageError::from_io(e)),
        };

        Ok(JsonFileStorage {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(StorageError::from_io)?;

        let tmp = NamedTempFile::new_in(dir).map_err(StorageError::from_io)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &self.inner.snapshot())
                .map_err(|e| StorageError::from_io(e.into()))?;
            writer.flush().map_err(StorageError::from_io)?;
        }
        tmp.persist(&self.path)
            .map_err(|e| StorageError::from_io(e.error))?;
        Ok(())
    }

    /// Applies `f` and writes the result out. If the write fails the
    /// in-memory state is rolled back so it never runs ahead of the file.
    fn mutate<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&MemoryStorage) -> Result<T, StorageError>,
    {
        let _guard = self.write_lock.lock();
        let before = self.inner.snapshot();
        let out = f(&self.inner)?;

        if let Err(e) = self.persist() {
            warn!("writing {} failed, discarding change: {}", self.path.display(), e);
            self.inner.restore(before);
            return Err(e);
        }
        Ok(out)
    }
}

impl VocabularyStorage for JsonFileStorage {
    fn upsert(&self, word: &WordUpsert<'_>) -> Result<LearnedWordEntry, StorageError> {
        self.mutate(|inner| inner.upsert(word))
    }

    fn find(
        &self,
        language: &str,
        normalized: &str,
    ) -> Result<Option<LearnedWordEntry>, StorageError> {
        self.inner.find(language, normalized)
    }

    fn find_many(
        &self,
        language: &str,
        normalized: &[SmolStr],
    ) -> Result<Vec<LearnedWordEntry>, StorageError> {
        self.inner.find_many(language, normalized)
    }

    fn find_by_prefix(
        &self,
        language: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<LearnedWordEntry>, StorageError> {
        self.inner.find_by_prefix(language, prefix, limit)
    }

    fn top_by_frequency(
        &self,
        language: &str,
        limit: usize,
    ) -> Result<Vec<LearnedWordEntry>, StorageError> {
        self.inner.top_by_frequency(language, limit)
    }

    fn delete(&self, language: &str, normalized: &str) -> Result<bool, StorageError> {
        self.mutate(|inner| inner.delete(language, normalized))
    }

    fn delete_stale(
        &self,
        max_frequency: u32,
        unused_since: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        self.mutate(|inner| inner.delete_stale(max_frequency, unused_since))
    }

    fn stats(&self, language: Option<&str>) -> Result<LearningStats, StorageError> {
        self.inner.stats(language)
    }
}
