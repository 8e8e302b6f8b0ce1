//! File-backed regions mapped with `memmap2`.
//!
//! A handle resolves to `<dir>/<prefix><HANDLE as 4 hex digits>`; on Linux
//! pointing `dir` at `/dev/shm` gives POSIX shared memory semantics.

use std::fs::OpenOptions;
use std::path::PathBuf;

use memmap2::MmapMut;

use super::{RegionHandle, RegionMapping, RegionSource};
use crate::error::MapError;

/// Default name prefix for file-backed regions.
pub const DEFAULT_PREFIX: &str = "uipc-";

/// Resolves handles to files inside one directory.
#[derive(Debug, Clone)]
pub struct DirRegionSource {
    dir: PathBuf,
    prefix: String,
}

impl DirRegionSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Object name for `handle`.
    pub fn name_for(&self, handle: RegionHandle) -> String {
        format!("{}{:04X}", self.prefix, handle.raw())
    }

    /// Full path of the file backing `handle`.
    pub fn path_for(&self, handle: RegionHandle) -> PathBuf {
        self.dir.join(self.name_for(handle))
    }
}

impl RegionSource for DirRegionSource {
    type Mapping = FileMapping;

    fn resolve(&self, handle: RegionHandle) -> Result<String, MapError> {
        Ok(self.name_for(handle))
    }

    fn open(&mut self, name: &str) -> Result<FileMapping, MapError> {
        let map_failed = |e: std::io::Error| MapError::MapFailed {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.dir.join(name))
            .map_err(map_failed)?;

        // SAFETY: the file is shared with the writing process on purpose;
        // the view is only ever handed out as a byte slice and is never
        // truncated by this process.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(map_failed)?;
        Ok(FileMapping { mmap })
    }
}

/// A memory-mapped region file.
pub struct FileMapping {
    mmap: MmapMut,
}

impl RegionMapping for FileMapping {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }
}

// ── Tests ────────────────────────────────────────────────────────
