//! Test fixtures: a tiny ISO 9660 writer.
//!
//! Produces images with nested directories, uppercase ISO names (`;1` on
//! files) and Rock Ridge `NM` entries carrying the real names. Every
//! directory fits in one sector; file data starts on sector boundaries in
//! the order files were given.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const SECTOR: usize = 2048;
const FIRST_DIR_SECTOR: usize = 18;

pub(crate) struct TestFile {
    path: String,
    data: Vec<u8>,
}

impl TestFile {
    pub(crate) fn new(path: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.trim_start_matches('/').to_string(),
            data: data.into(),
        }
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path)
}

fn sectors_for(len: usize) -> usize {
    len.div_ceil(SECTOR)
}

/// Build an image holding `files`.
pub(crate) fn build_iso(files: &[TestFile]) -> Vec<u8> {
    let mut dirs = BTreeSet::new();
    dirs.insert(String::new());
    for file in files {
        let mut dir = parent_of(&file.path);
        while !dir.is_empty() {
            dirs.insert(dir.to_string());
            dir = parent_of(dir);
        }
    }
    let dirs: Vec<String> = dirs.into_iter().collect();
    let dir_sector = |path: &str| FIRST_DIR_SECTOR + dirs.iter().position(|d| d == path).unwrap();

    let mut next = FIRST_DIR_SECTOR + dirs.len();
    let mut file_sectors = Vec::new();
    for file in files {
        file_sectors.push(next);
        next += sectors_for(file.data.len());
    }
    let total = next;

    let mut iso = vec![0u8; total * SECTOR];

    // primary volume descriptor
    let pvd = &mut iso[16 * SECTOR..17 * SECTOR];
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;
    put_u32_both(&mut pvd[80..88], total as u32);
    put_u16_both(&mut pvd[120..124], 1);
    put_u16_both(&mut pvd[124..128], 1);
    put_u16_both(&mut pvd[128..132], SECTOR as u16);
    let root = dir_record(FIRST_DIR_SECTOR as u32, SECTOR as u32, &[0], true, &[]);
    pvd[156..156 + root.len()].copy_from_slice(&root);
    pvd[881] = 1;

    // terminator
    let vdst = &mut iso[17 * SECTOR..18 * SECTOR];
    vdst[0] = 255;
    vdst[1..6].copy_from_slice(b"CD001");
    vdst[6] = 1;

    for dir in &dirs {
        let own = dir_sector(dir) as u32;
        let parent = if dir.is_empty() { own } else { dir_sector(parent_of(dir)) as u32 };

        let mut records = dir_record(own, SECTOR as u32, &[0], true, &[]);
        records.extend(dir_record(parent, SECTOR as u32, &[1], true, &[]));

        for sub in dirs.iter().filter(|d| !d.is_empty() && parent_of(d) == dir) {
            let name = name_of(sub);
            records.extend(dir_record(
                dir_sector(sub) as u32,
                SECTOR as u32,
                name.to_ascii_uppercase().as_bytes(),
                true,
                &rrip_nm(name),
            ));
        }

        for (file, sector) in files.iter().zip(&file_sectors) {
            if parent_of(&file.path) != dir {
                continue;
            }
            let name = name_of(&file.path);
            let iso_name = format!("{};1", name.to_ascii_uppercase());
            records.extend(dir_record(
                *sector as u32,
                file.data.len() as u32,
                iso_name.as_bytes(),
                false,
                &rrip_nm(name),
            ));
        }

        assert!(records.len() <= SECTOR, "test directory {} overflows a sector", dir);
        let start = own as usize * SECTOR;
        iso[start..start + records.len()].copy_from_slice(&records);
    }

    for (file, sector) in files.iter().zip(&file_sectors) {
        let start = sector * SECTOR;
        iso[start..start + file.data.len()].copy_from_slice(&file.data);
    }

    iso
}

/// Build an image and write it as `test.iso` inside `dir`.
pub(crate) fn write_iso(dir: &Path, files: &[TestFile]) -> PathBuf {
    let path = dir.join("test.iso");
    std::fs::write(&path, build_iso(files)).unwrap();
    path
}

fn dir_record(extent: u32, size: u32, name: &[u8], is_dir: bool, su: &[u8]) -> Vec<u8> {
    let pad = 1 - name.len() % 2;
    let mut len = 33 + name.len() + pad + su.len();
    len += len % 2;

    let mut rec = vec![0u8; len];
    rec[0] = len as u8;
    put_u32_both(&mut rec[2..10], extent);
    put_u32_both(&mut rec[10..18], size);
    rec[25] = if is_dir { 0x02 } else { 0 };
    put_u16_both(&mut rec[28..32], 1);
    rec[32] = name.len() as u8;
    rec[33..33 + name.len()].copy_from_slice(name);
    let su_start = 33 + name.len() + pad;
    rec[su_start..su_start + su.len()].copy_from_slice(su);
    rec
}

fn rrip_nm(name: &str) -> Vec<u8> {
    let mut entry = vec![b'N', b'M', (5 + name.len()) as u8, 1, 0];
    entry.extend_from_slice(name.as_bytes());
    entry
}

fn put_u32_both(buf: &mut [u8], val: u32) {
    buf[0..4].copy_from_slice(&val.to_le_bytes());
    buf[4..8].copy_from_slice(&val.to_be_bytes());
}

fn put_u16_both(buf: &mut [u8], val: u16) {
    buf[0..2].copy_from_slice(&val.to_le_bytes());
    buf[2..4].copy_from_slice(&val.to_be_bytes());
}
