//! Directory walking over a raw ISO 9660 stream.
//!
//! # Image layout used here
//!
//! ```text
//! sector 0-15   system area (ignored)
//! sector 16+    volume descriptors, terminated by type 255
//!               the primary descriptor (type 1) embeds the root directory record at byte 156
//! extent N      directory data: variable-length records, never crossing a sector boundary
//! ```
//!
//! Names come from Rock Ridge `NM` entries when present, otherwise from the
//! ISO name with its `;1` version suffix and trailing dot removed. Matching
//! is ASCII case-insensitive against either form.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::{DirEntry, FileExtent, IsoFilesystem, SECTOR_SIZE};
use crate::error::{IoResultExt, IsoEditorError, Result};

const DESCRIPTOR_START_SECTOR: u64 = 16;
const MAX_DESCRIPTORS: u64 = 64;
const STANDARD_ID: &[u8] = b"CD001";
const ROOT_RECORD_OFFSET: usize = 156;
const ROOT_RECORD_LEN: usize = 34;
const FLAG_DIRECTORY: u8 = 0x02;

#[derive(Debug, Clone)]
struct Record {
    name: String,
    iso_name: String,
    extent: u32,
    size: u64,
    is_dir: bool,
}

impl Record {
    fn matches(&self, component: &str) -> bool {
        self.name.eq_ignore_ascii_case(component) || self.iso_name.eq_ignore_ascii_case(component)
    }

    fn is_special(&self) -> bool {
        self.iso_name == "." || self.iso_name == ".."
    }
}

/// An ISO 9660 image opened for lookups.
pub struct IsoImage<R> {
    reader: R,
    name: String,
    root: Record,
}

impl IsoImage<File> {
    /// Open the image file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).io_context(|| format!("opening {}", path.display()))?;
        Self::new(file, path.display().to_string())
    }
}

impl<R: Read + Seek> IsoImage<R> {
    /// Read the volume descriptors from `reader`. `name` labels errors.
    pub fn new(mut reader: R, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut sector = vec![0u8; SECTOR_SIZE as usize];

        for index in 0..MAX_DESCRIPTORS {
            let offset = (DESCRIPTOR_START_SECTOR + index) * SECTOR_SIZE;
            reader
                .seek(SeekFrom::Start(offset))
                .and_then(|_| reader.read_exact(&mut sector))
                .map_err(|_| {
                    IsoEditorError::FormatIncompatible(format!(
                        "{} has no primary volume descriptor",
                        name
                    ))
                })?;

            if &sector[1..6] != STANDARD_ID {
                return Err(IsoEditorError::FormatIncompatible(format!(
                    "{} is not an ISO 9660 image",
                    name
                )));
            }

            match sector[0] {
                1 => {
                    let root = parse_record(
                        &sector[ROOT_RECORD_OFFSET..ROOT_RECORD_OFFSET + ROOT_RECORD_LEN],
                    )
                    .filter(|r| r.is_dir)
                    .ok_or_else(|| {
                        IsoEditorError::FormatIncompatible(format!(
                            "{} has a malformed root directory record",
                            name
                        ))
                    })?;
                    return Ok(Self { reader, name, root });
                }
                255 => break,
                _ => {}
            }
        }

        Err(IsoEditorError::FormatIncompatible(format!(
            "{} has no primary volume descriptor",
            name
        )))
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.reader
            .seek(SeekFrom::Start(offset))
            .io_context(|| format!("seeking to {} in {}", offset, self.name))?;
        self.reader
            .read_exact(&mut buf)
            .io_context(|| format!("reading {} bytes at {} in {}", len, offset, self.name))?;
        Ok(buf)
    }

    fn read_dir(&mut self, dir: &Record) -> Result<Vec<Record>> {
        let data = self.read_at(u64::from(dir.extent) * SECTOR_SIZE, dir.size)?;
        let sector = SECTOR_SIZE as usize;
        let mut records = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let len = data[pos] as usize;
            if len == 0 {
                // records never span sectors; the rest of this one is padding
                pos = (pos / sector + 1) * sector;
                continue;
            }

            let record = parse_record(&data[pos..]).ok_or_else(|| {
                IsoEditorError::FormatIncompatible(format!(
                    "malformed directory record in {} at extent {}",
                    self.name, dir.extent
                ))
            })?;
            if !record.is_special() {
                records.push(record);
            }
            pos += len;
        }

        Ok(records)
    }

    fn resolve(&mut self, path: &str) -> Result<Record> {
        let mut current = self.root.clone();

        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_dir {
                return Err(IsoEditorError::not_found(path, &self.name));
            }
            current = self
                .read_dir(&current)?
                .into_iter()
                .find(|r| r.matches(component))
                .ok_or_else(|| IsoEditorError::not_found(path, &self.name))?;
        }

        Ok(current)
    }
}

impl<R: Read + Seek> IsoFilesystem for IsoImage<R> {
    fn lookup(&mut self, path: &str) -> Result<FileExtent> {
        let record = self.resolve(path)?;
        Ok(FileExtent {
            path: path.to_string(),
            sector: record.extent,
            size: record.size,
        })
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(path)?;
        if !dir.is_dir {
            return Err(IsoEditorError::InvalidInput(format!(
                "{} in {} is not a directory",
                path, self.name
            )));
        }

        Ok(self
            .read_dir(&dir)?
            .into_iter()
            .map(|r| DirEntry {
                name: r.name,
                is_dir: r.is_dir,
                size: r.size,
            })
            .collect())
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let record = self.resolve(path)?;
        if record.is_dir {
            return Err(IsoEditorError::InvalidInput(format!(
                "{} in {} is a directory",
                path, self.name
            )));
        }
        self.read_at(u64::from(record.extent) * SECTOR_SIZE, record.size)
    }
}

/// Parse one directory record starting at `buf[0]`.
fn parse_record(buf: &[u8]) -> Option<Record> {
    let len = *buf.first()? as usize;
    if len < 34 || len > buf.len() {
        return None;
    }
    let rec = &buf[..len];

    let extent = u32::from_le_bytes(rec[2..6].try_into().ok()?);
    let size = u32::from_le_bytes(rec[10..14].try_into().ok()?);
    let is_dir = rec[25] & FLAG_DIRECTORY != 0;
    let name_len = rec[32] as usize;
    let raw_name = rec.get(33..33 + name_len)?;

    let iso_name = match raw_name {
        [0] => ".".to_string(),
        [1] => "..".to_string(),
        _ => {
            let name = String::from_utf8_lossy(raw_name);
            let name = name.split(';').next().unwrap_or_default();
            name.trim_end_matches('.').to_string()
        }
    };

    // system use area starts after the name and its padding byte
    let su_start = 33 + name_len + (1 - name_len % 2);
    let name = rec
        .get(su_start..)
        .and_then(rock_ridge_name)
        .unwrap_or_else(|| iso_name.clone());

    Some(Record {
        name,
        iso_name,
        extent,
        size: u64::from(size),
        is_dir,
    })
}

/// Collect a Rock Ridge alternate name from SUSP entries.
fn rock_ridge_name(su: &[u8]) -> Option<String> {
    let mut name = String::new();
    let mut found = false;
    let mut i = 0;

    while i + 4 <= su.len() {
        let sig = &su[i..i + 2];
        let len = su[i + 2] as usize;
        if len < 4 || i + len > su.len() {
            break;
        }

        if sig == b"NM" && len >= 5 {
            let flags = su[i + 4];
            // CURRENT / PARENT names carry no text
            if flags & 0x06 == 0 {
                name.push_str(&String::from_utf8_lossy(&su[i + 5..i + len]));
                found = true;
            }
        } else if sig == b"ST" {
            break;
        }
        i += len;
    }

    found.then_some(name)
}
