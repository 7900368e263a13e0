//! ISO 9660 file lookup.
//!
//! Editing never parses more of the image than it needs: a path is resolved
//! to its extent (first sector and byte size), and everything else is byte
//! arithmetic on the raw image stream.
//!
//! [`IsoFilesystem`] is the seam the rest of the crate talks to;
//! [`IsoImage`] is the implementation backed by a readable, seekable stream.

mod reader;

pub use reader::IsoImage;

use crate::error::Result;

/// Logical block size of every ISO 9660 image this crate handles.
pub const SECTOR_SIZE: u64 = 2048;

/// Location of a file's data inside the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExtent {
    /// Path as requested
    pub path: String,
    /// First logical sector of the data
    pub sector: u32,
    /// Data length in bytes
    pub size: u64,
}

impl FileExtent {
    /// Absolute byte offset of the file data in the image.
    pub fn offset(&self) -> u64 {
        u64::from(self.sector) * SECTOR_SIZE
    }
}

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// File lookup inside an ISO image.
pub trait IsoFilesystem {
    /// Resolve `path` to the extent holding its data.
    fn lookup(&mut self, path: &str) -> Result<FileExtent>;

    /// List the entries of a directory.
    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>>;

    /// Read a whole file into memory.
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>>;
}
