//! Gzip-compressed "newc" CPIO archives built in memory.
//!
//! The kernel unpacks these as initramfs fragments, and since it accepts
//! concatenated archives they can be appended to an existing initramfs or
//! dropped into a fixed-size embed area.
//!
//! # Layout
//!
//! ```text
//! [110-byte ASCII header][path NUL][pad to 4][content][pad to 4]   per entry
//! [header for TRAILER!!!][TRAILER!!! NUL][pad to 4]                 end of archive
//! ```

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};

use crate::config::DEFAULT_GZIP_LEVEL;
use crate::error::{IoResultExt, IsoEditorError, Result};

/// "newc" magic.
const NEWC_MAGIC: &str = "070701";
/// Fixed header size for the newc format.
const HEADER_SIZE: usize = 110;
const TRAILER_NAME: &str = "TRAILER!!!";

/// Regular file type bits.
pub const S_IFREG: u32 = 0o100_000;
/// Directory type bits.
pub const S_IFDIR: u32 = 0o040_000;

/// One file to place into an archive.
///
/// `mode` is written verbatim, so it carries both the type bits and the
/// permission bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioEntry {
    pub path: String,
    pub content: Vec<u8>,
    pub mode: u32,
}

impl CpioEntry {
    /// A regular file with the given permission bits.
    pub fn file(path: impl Into<String>, content: impl Into<Vec<u8>>, perm: u32) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mode: S_IFREG | (perm & 0o7777),
        }
    }

    /// A directory with the given permission bits.
    pub fn directory(path: impl Into<String>, perm: u32) -> Self {
        Self {
            path: path.into(),
            content: Vec::new(),
            mode: S_IFDIR | (perm & 0o7777),
        }
    }

    fn is_dir(&self) -> bool {
        self.mode & 0o170_000 == S_IFDIR
    }
}

/// Build a gzip-compressed newc archive with the default compression level.
///
/// An empty `entries` slice still yields a valid archive holding only the
/// trailer record.
pub fn build_cpio(entries: &[CpioEntry]) -> Result<Vec<u8>> {
    build_cpio_with_level(entries, DEFAULT_GZIP_LEVEL)
}

/// Build a gzip-compressed newc archive at a specific gzip level (0-9).
pub fn build_cpio_with_level(entries: &[CpioEntry], gzip_level: u32) -> Result<Vec<u8>> {
    for entry in entries {
        validate_entry(entry)?;
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(gzip_level.min(9)));
    write_newc(&mut encoder, entries).io_context(|| "writing cpio archive".to_string())?;
    encoder
        .finish()
        .io_context(|| "compressing cpio archive".to_string())
}

/// Write the uncompressed archive, trailer included.
fn write_newc<W: Write>(writer: &mut W, entries: &[CpioEntry]) -> io::Result<()> {
    for (index, entry) in entries.iter().enumerate() {
        let nlink = if entry.is_dir() { 2 } else { 1 };
        // inodes start at 1; entries sharing one are hardlinked on unpack
        let ino = index as u32 + 1;
        write_header(writer, &entry.path, ino, entry.mode, nlink, entry.content.len() as u32)?;
        writer.write_all(&entry.content)?;
        write_padding(writer, entry.content.len())?;
    }

    write_header(writer, TRAILER_NAME, 0, 0, 1, 0)
}

fn write_header<W: Write>(
    writer: &mut W,
    name: &str,
    ino: u32,
    mode: u32,
    nlink: u32,
    file_size: u32,
) -> io::Result<()> {
    let namesize = name.len() as u32 + 1;

    write!(
        writer,
        "{NEWC_MAGIC}{ino:08x}{mode:08x}{uid:08x}{gid:08x}{nlink:08x}{mtime:08x}{file_size:08x}{devmajor:08x}{devminor:08x}{rdevmajor:08x}{rdevminor:08x}{namesize:08x}{check:08x}",
        uid = 0u32,
        gid = 0u32,
        mtime = 0u32,
        devmajor = 0u32,
        devminor = 0u32,
        rdevmajor = 0u32,
        rdevminor = 0u32,
        check = 0u32,
    )?;

    writer.write_all(name.as_bytes())?;
    writer.write_all(&[0])?;
    write_padding(writer, HEADER_SIZE + namesize as usize)
}

fn write_padding<W: Write>(writer: &mut W, len: usize) -> io::Result<()> {
    let pad = (4 - len % 4) % 4;
    writer.write_all(&[0u8; 3][..pad])
}

fn validate_entry(entry: &CpioEntry) -> Result<()> {
    if entry.path.is_empty() || entry.path == TRAILER_NAME {
        return Err(IsoEditorError::InvalidInput(format!(
            "invalid cpio entry name {:?}",
            entry.path
        )));
    }

    if entry.path.split('/').any(|part| part == "..") {
        return Err(IsoEditorError::InvalidInput(format!(
            "cpio entry {} escapes the archive root",
            entry.path
        )));
    }

    if u32::try_from(entry.content.len()).is_err() {
        return Err(IsoEditorError::InvalidInput(format!(
            "cpio entry {} is larger than 4 GiB",
            entry.path
        )));
    }

    Ok(())
}
