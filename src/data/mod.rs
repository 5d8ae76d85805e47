/// Shared winnow helpers and offset/table resolution
pub mod parser_utils;
/// File-backed asset sources
pub mod wrappers;

use std::collections::HashMap;
use std::io;

use crate::error::AssetFile;

pub use wrappers::mmap::MmapAssetSource;

/// Access to the three files of a compiled model.
///
/// `Ok(None)` means the file does not exist, which the loader treats as a
/// missing companion rather than an I/O failure. Returned buffers are dropped
/// by the stage that opened them.
pub trait AssetSource {
    fn open(&self, file: AssetFile) -> io::Result<Option<impl AsRef<[u8]>>>;

    /// Human-readable name of the asset, used in reports.
    fn describe(&self) -> String;
}

impl<S: AssetSource> AssetSource for &S {
    fn open(&self, file: AssetFile) -> io::Result<Option<impl AsRef<[u8]>>> {
        (**self).open(file)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// An asset held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetSource {
    name: String,
    files: HashMap<AssetFile, Vec<u8>>,
}

impl MemoryAssetSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: HashMap::new(),
        }
    }

    /// Add (or replace) the bytes for one of the asset's files.
    pub fn with(mut self, file: AssetFile, data: Vec<u8>) -> Self {
        self.files.insert(file, data);
        self
    }

    pub fn insert(&mut self, file: AssetFile, data: Vec<u8>) {
        self.files.insert(file, data);
    }

    pub fn remove(&mut self, file: AssetFile) -> Option<Vec<u8>> {
        self.files.remove(&file)
    }
}

impl AssetSource for MemoryAssetSource {
    fn open(&self, file: AssetFile) -> io::Result<Option<impl AsRef<[u8]>>> {
        Ok(self.files.get(&file).map(Vec::as_slice))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
