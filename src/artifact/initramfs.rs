//! Initramfs with an ignition archive appended.
//!
//! Some boot flows load a standalone initramfs instead of the ISO's embed
//! area. The kernel unpacks concatenated CPIO archives, so ignition content
//! can ride along as a trailing archive:
//!
//! ```text
//! [original initramfs][zero pad to 4 bytes][gzipped ignition cpio]
//! ```
//!
//! Platforms that load the initramfs by address also need `initrd.addrsize`
//! updated: an 8-byte load address followed by the big-endian initramfs size.

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::config::DEFAULT_GZIP_LEVEL;
use crate::embed::IgnitionContent;
use crate::error::{IoResultExt, IsoEditorError, Result};
use crate::overlay::stream_len;
use crate::stream::AppendReader;

/// Size of the load address that precedes the length in `initrd.addrsize`.
pub const ADDRSIZE_PREAMBLE_LEN: usize = 8;

const CPIO_ALIGN: u64 = 4;

/// The base initramfs, zero-padded to a 4-byte boundary.
pub struct AlignedInitramfs<R> {
    inner: AppendReader<R, Cursor<Vec<u8>>>,
}

impl<R: Read + Seek> AlignedInitramfs<R> {
    pub fn new(mut initramfs: R) -> Result<Self> {
        let len = stream_len(&mut initramfs, "initramfs")?;
        let pad = (CPIO_ALIGN - len % CPIO_ALIGN) % CPIO_ALIGN;
        Ok(Self {
            inner: AppendReader::new(initramfs, Cursor::new(vec![0u8; pad as usize]))?,
        })
    }
}

impl<R: Read + Seek> Read for AlignedInitramfs<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> Seek for AlignedInitramfs<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// The reader returned by [`new_initramfs_append_reader`].
pub type InitramfsAppendReader<R> = AppendReader<AlignedInitramfs<R>, Cursor<Vec<u8>>>;

/// `initramfs` followed by the ignition archive built from `content`.
pub fn new_initramfs_append_reader<R: Read + Seek>(
    initramfs: R,
    content: &IgnitionContent,
) -> Result<InitramfsAppendReader<R>> {
    new_initramfs_append_reader_with_level(initramfs, content, DEFAULT_GZIP_LEVEL)
}

pub fn new_initramfs_append_reader_with_level<R: Read + Seek>(
    initramfs: R,
    content: &IgnitionContent,
    gzip_level: u32,
) -> Result<InitramfsAppendReader<R>> {
    let archive = content.archive_with_level(gzip_level)?;
    let base = AlignedInitramfs::new(initramfs)?;

    tracing::debug!(archive = archive.len(), "Appending ignition archive to initramfs");
    AppendReader::new(base, Cursor::new(archive))
}

/// New `initrd.addrsize` contents for `initramfs`.
///
/// Keeps the original 8-byte load address and replaces the size with the
/// length of `initramfs`, which is left positioned at 0.
pub fn patch_initrd_addrsize<A: Read, S: Seek + ?Sized>(mut original: A, initramfs: &mut S) -> Result<Vec<u8>> {
    let mut preamble = [0u8; ADDRSIZE_PREAMBLE_LEN];
    original.read_exact(&mut preamble).map_err(|e| {
        IsoEditorError::FormatIncompatible(format!(
            "initrd.addrsize is shorter than its {}-byte address: {}",
            ADDRSIZE_PREAMBLE_LEN, e
        ))
    })?;

    let size = initramfs
        .seek(SeekFrom::End(0))
        .io_context(|| "measuring initramfs".to_string())?;
    initramfs
        .seek(SeekFrom::Start(0))
        .io_context(|| "rewinding initramfs".to_string())?;

    let mut patched = Vec::with_capacity(ADDRSIZE_PREAMBLE_LEN + 8);
    patched.extend_from_slice(&preamble);
    patched.extend_from_slice(&size.to_be_bytes());
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::cpio::tests::read_archive;

    /// Seekable stream of a given length without the allocation.
    struct FixedLen(u64, u64);

    impl Seek for FixedLen {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.1 = match pos {
                SeekFrom::Start(p) => p,
                SeekFrom::End(d) => (self.0 as i64 + d) as u64,
                SeekFrom::Current(d) => (self.1 as i64 + d) as u64,
            };
            Ok(self.1)
        }
    }

    const PREAMBLE: [u8; 8] = [0, 0, 0, 0, 0x02, 0, 0, 0];

    #[test]
    fn test_addrsize_patching() {
        for n in [0u64, 1, 1 << 32, 94_371_840] {
            let mut stream = FixedLen(n, 0);
            let patched = patch_initrd_addrsize(&PREAMBLE[..], &mut stream).unwrap();

            let mut expected = PREAMBLE.to_vec();
            expected.extend_from_slice(&n.to_be_bytes());
            assert_eq!(patched, expected, "n = {}", n);
            assert_eq!(stream.1, 0);
        }
    }

    #[test]
    fn test_addrsize_ignores_old_size() {
        let mut original = PREAMBLE.to_vec();
        original.extend_from_slice(&77u64.to_be_bytes());
        let patched = patch_initrd_addrsize(&original[..], &mut Cursor::new(vec![0u8; 10])).unwrap();
        assert_eq!(&patched[8..], &10u64.to_be_bytes());
    }

    #[test]
    fn test_addrsize_truncated() {
        let err = patch_initrd_addrsize(&PREAMBLE[..5], &mut FixedLen(1, 0)).unwrap_err();
        assert!(matches!(err, IsoEditorError::FormatIncompatible(_)));
    }

    #[test]
    fn test_append_aligns_and_appends() {
        let initramfs = b"0707010000".to_vec();
        let content = IgnitionContent::new(b"{\"ignition\":{}}".to_vec());
        let mut reader = new_initramfs_append_reader(Cursor::new(initramfs.clone()), &content).unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len() as u64, reader.len());

        assert_eq!(&out[..10], &initramfs[..]);
        assert_eq!(&out[10..12], &[0, 0]);
        let entries = read_archive(&out[12..]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "config.ign");
    }

    #[test]
    fn test_aligned_base_gets_no_padding() {
        let content = IgnitionContent::new(b"{}".to_vec());
        let archive = content.archive().unwrap();
        let reader = new_initramfs_append_reader(Cursor::new(vec![7u8; 8]), &content).unwrap();
        assert_eq!(reader.len(), 8 + archive.len() as u64);
    }

    #[test]
    fn test_addrsize_for_appended_initramfs() {
        let content = IgnitionContent::new(b"{}".to_vec());
        let mut reader = new_initramfs_append_reader(Cursor::new(vec![1u8; 5]), &content).unwrap();
        let len = reader.len();
        let patched = patch_initrd_addrsize(&PREAMBLE[..], &mut reader).unwrap();
        assert_eq!(u64::from_be_bytes(patched[8..].try_into().unwrap()), len);
    }
}
