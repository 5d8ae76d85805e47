//! Memory-mapped model source.
//!
//! Companion files are located next to the primary `.mdl` by swapping its
//! extension. Each call to [`AssetSource::open`] maps the file afresh; the
//! mapping is released when the caller drops it.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::data::AssetSource;
use crate::error::AssetFile;

/// Topology extensions in lookup order. The DirectX 9 variant is what current
/// compilers write; the others are identical in layout.
const TOPOLOGY_EXTENSIONS: [&str; 4] = ["dx90.vtx", "vtx", "dx80.vtx", "sw.vtx"];

/// A model read from disk through memory maps.
#[derive(Debug, Clone)]
pub struct MmapAssetSource {
    model_path: PathBuf,
}

/// Bytes of an opened file. Empty files cannot be mapped, so they are held
/// as an empty buffer instead.
#[derive(Debug)]
pub enum MappedFile {
    Mapped(Mmap),
    Empty,
}

impl AsRef<[u8]> for MappedFile {
    fn as_ref(&self) -> &[u8] {
        match self {
            MappedFile::Mapped(mmap) => &mmap[..],
            MappedFile::Empty => &[],
        }
    }
}

impl MmapAssetSource {
    /// Create a source for the `.mdl` at `model_path`.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_owned(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Path on disk for one of the model's files, if it exists.
    pub fn path_for(&self, file: AssetFile) -> Option<PathBuf> {
        match file {
            AssetFile::Model => Some(self.model_path.clone()),
            AssetFile::Vertices => {
                Some(self.model_path.with_extension("vvd")).filter(|path| path.is_file())
            }
            AssetFile::Topology => TOPOLOGY_EXTENSIONS
                .iter()
                .map(|ext| self.model_path.with_extension(ext))
                .find(|path| path.is_file()),
        }
    }
}

impl AssetSource for MmapAssetSource {
    fn open(&self, file: AssetFile) -> io::Result<Option<impl AsRef<[u8]>>> {
        let Some(path) = self.path_for(file) else {
            return Ok(None);
        };

        let handle = match File::open(&path) {
            Ok(handle) => handle,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if handle.metadata()?.len() == 0 {
            return Ok(Some(MappedFile::Empty));
        }

        // Safety: the mapping is read-only and dropped before the stage that
        // requested it returns. Concurrent truncation by another process is
        // outside what this loader defends against.
        let mmap = unsafe { MmapOptions::new().map(&handle)? };
        debug!(path = %path.display(), len = mmap.len(), "mapped {file}");
        Ok(Some(MappedFile::Mapped(mmap)))
    }

    fn describe(&self) -> String {
        self.model_path.display().to_string()
    }
}
