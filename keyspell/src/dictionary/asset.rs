//! Sources of dictionary word lists.
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::error::AssetError;

/// Supplies the `word frequency` list for a language tag.
pub trait AssetSource: Send + Sync {
    fn open(&self, language: &str) -> Result<Box<dyn BufRead + Send>, AssetError>;
}

/// Reads `<root>/<tag>.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub const FILE_EXT: &'static str = "txt";

    pub fn new<P: AsRef<Path>>(root: P) -> DirectoryAssets {
        DirectoryAssets {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, language: &str) -> PathBuf {
        self.root.join(format!("{}.{}", language, Self::FILE_EXT))
    }
}

impl AssetSource for DirectoryAssets {
    fn open(&self, language: &str) -> Result<Box<dyn BufRead + Send>, AssetError> {
        // Tags are used as file names; refuse anything that could escape root.
        if language.is_empty() || language.contains(|c: char| c == '/' || c == '\\' || c == '.') {
            return Err(AssetError::NotFound(language.into()));
        }

        let file = std::fs::File::open(self.path_for(language))
            .map_err(|e| AssetError::from_io(language, e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Word lists held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssets {
    files: Arc<RwLock<HashMap<SmolStr, Arc<str>>>>,
}

impl MemoryAssets {
    pub fn new() -> MemoryAssets {
        MemoryAssets::default()
    }

    pub fn insert(&self, language: &str, contents: &str) {
        self.files.write().insert(language.into(), Arc::from(contents));
    }

    pub fn remove(&self, language: &str) {
        self.files.write().remove(language);
    }
}

impl AssetSource for MemoryAssets {
    fn open(&self, language: &str) -> Result<Box<dyn BufRead + Send>, AssetError> {
        match self.files.read().get(language) {
            Some(contents) => Ok(Box::new(Cursor::new(contents.as_bytes().to_vec()))),
            None => Err(AssetError::NotFound(language.into())),
        }
    }
}
