//! Stream adapters besides overlays.
//!
//! - [`SectionReader`] - a window `[offset, offset + length)` of another stream
//! - [`AppendReader`] - two streams back to back
//!
//! Both are `Read + Seek` over their own logical length.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::Result;
use crate::overlay::{resolve_seek, stream_len};

/// A bounded window into another stream.
///
/// Reads stop at the window end, or earlier if the inner stream ends first.
pub struct SectionReader<R> {
    inner: R,
    offset: u64,
    length: u64,
    position: u64,
}

impl<R: Read + Seek> SectionReader<R> {
    pub fn new(inner: R, offset: u64, length: u64) -> Self {
        Self {
            inner,
            offset,
            length,
            position: 0,
        }
    }

    /// Window length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for SectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.length {
            return Ok(0);
        }
        let want = (self.length - self.position).min(buf.len() as u64) as usize;
        self.inner
            .seek(SeekFrom::Start(self.offset + self.position))?;
        let n = self.inner.read(&mut buf[..want])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R> Seek for SectionReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = resolve_seek(pos, self.position, self.length)?;
        Ok(self.position)
    }
}

/// `first` followed by `second`.
///
/// Models trailing-appended content (e.g. an extra initramfs archive); no
/// byte of `first` is replaced.
pub struct AppendReader<A, B> {
    first: A,
    second: B,
    first_len: u64,
    total: u64,
    position: u64,
}

impl<A: Read + Seek, B: Read + Seek> AppendReader<A, B> {
    pub fn new(mut first: A, mut second: B) -> Result<Self> {
        let first_len = stream_len(&mut first, "leading stream")?;
        let second_len = stream_len(&mut second, "appended stream")?;
        Ok(Self {
            first,
            second,
            first_len,
            total: first_len + second_len,
            position: 0,
        })
    }

    /// Combined length.
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: Read + Seek, B: Read + Seek> Read for AppendReader<A, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() && self.position < self.total {
            let dest = &mut buf[filled..];
            let n = if self.position < self.first_len {
                let len = (self.first_len - self.position).min(dest.len() as u64) as usize;
                self.first.seek(SeekFrom::Start(self.position))?;
                self.first.read(&mut dest[..len])?
            } else {
                let relative = self.position - self.first_len;
                let len = (self.total - self.position).min(dest.len() as u64) as usize;
                self.second.seek(SeekFrom::Start(relative))?;
                self.second.read(&mut dest[..len])?
            };

            if n == 0 {
                break;
            }
            filled += n;
            self.position += n as u64;
        }

        Ok(filled)
    }
}

impl<A, B> Seek for AppendReader<A, B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = resolve_seek(pos, self.position, self.total)?;
        Ok(self.position)
    }
}
