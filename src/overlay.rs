//! Byte-range substitution over a seekable stream.
//!
//! An [`OverlayReader`] presents `base` with the bytes of
//! `[offset, offset + length)` taken from a content block instead. Nothing
//! is copied up front: each read is served from whichever source owns the
//! requested bytes, and a read straddling a boundary blends both.
//!
//! ```text
//! base:     |--------------------------------------------------|
//! overlay:               |#########|
//! result:   |-- base ----|# content#|------------ base ---------|
//!           0         offset   offset+length                 total
//! ```
//!
//! Readers chain: an `OverlayReader` is itself `Read + Seek`, so a second
//! overlay can wrap the first. Dropping the outermost reader drops every
//! stream it owns.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{IsoEditorError, Result};

/// Anything that can back an overlay.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Type-erased stream, used where overlays are chained dynamically.
pub type BoxedReader = Box<dyn ReadSeek + Send>;

/// "At absolute `offset`, the next `length` bytes come from `content`."
///
/// `content` is read from its own position 0.
#[derive(Debug, Clone)]
pub struct Overlay<C> {
    pub content: C,
    pub offset: u64,
    pub length: u64,
}

impl<C> Overlay<C> {
    pub fn new(content: C, offset: u64, length: u64) -> Self {
        Self {
            content,
            offset,
            length,
        }
    }

    fn end(&self) -> u64 {
        self.offset + self.length
    }
}

impl Overlay<io::Cursor<Vec<u8>>> {
    /// Overlay an in-memory buffer, covering exactly its length.
    pub fn from_bytes(bytes: Vec<u8>, offset: u64) -> Self {
        let length = bytes.len() as u64;
        Self::new(io::Cursor::new(bytes), offset, length)
    }
}

/// Which source owns a position.
enum Segment {
    Base { remaining: u64 },
    Content { relative: u64, remaining: u64 },
}

/// `base` with one byte range substituted.
pub struct OverlayReader<R, C> {
    base: R,
    overlay: Overlay<C>,
    total: u64,
    position: u64,
}

impl<R: Read + Seek, C: Read + Seek> OverlayReader<R, C> {
    /// Wrap `base`, which must contain the whole overlay range.
    ///
    /// The content block must hold at least `overlay.length` bytes.
    pub fn new(mut base: R, mut overlay: Overlay<C>) -> Result<Self> {
        let total = stream_len(&mut base, "base stream")?;

        let fits = overlay
            .offset
            .checked_add(overlay.length)
            .is_some_and(|end| end <= total);
        if !fits {
            return Err(IsoEditorError::OutOfBounds {
                offset: overlay.offset,
                length: overlay.length,
                total,
            });
        }

        let available = stream_len(&mut overlay.content, "overlay content")?;
        if available < overlay.length {
            return Err(IsoEditorError::InvalidInput(format!(
                "overlay content holds {} bytes but covers {}",
                available, overlay.length
            )));
        }

        tracing::debug!(
            offset = overlay.offset,
            length = overlay.length,
            total,
            "Created overlay"
        );

        Ok(Self {
            base,
            overlay,
            total,
            position: 0,
        })
    }

    /// Logical length of the composed stream (same as the base).
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Give back the base stream and the overlay.
    pub fn into_parts(self) -> (R, Overlay<C>) {
        (self.base, self.overlay)
    }

    fn segment_at(&self, pos: u64) -> Segment {
        if pos < self.overlay.offset {
            Segment::Base {
                remaining: self.overlay.offset - pos,
            }
        } else if pos < self.overlay.end() {
            Segment::Content {
                relative: pos - self.overlay.offset,
                remaining: self.overlay.end() - pos,
            }
        } else {
            Segment::Base {
                remaining: self.total - pos,
            }
        }
    }
}

impl<R: Read + Seek, C: Read + Seek> Read for OverlayReader<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() && self.position < self.total {
            let want = (buf.len() - filled) as u64;
            let dest = &mut buf[filled..];

            let n = match self.segment_at(self.position) {
                Segment::Base { remaining } => {
                    let len = want.min(remaining) as usize;
                    self.base.seek(SeekFrom::Start(self.position))?;
                    self.base.read(&mut dest[..len])?
                }
                Segment::Content {
                    relative,
                    remaining,
                } => {
                    let len = want.min(remaining) as usize;
                    self.overlay.content.seek(SeekFrom::Start(relative))?;
                    self.overlay.content.read(&mut dest[..len])?
                }
            };

            if n == 0 {
                if filled == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("source ended early at offset {}", self.position),
                    ));
                }
                break;
            }

            filled += n;
            self.position += n as u64;
        }

        Ok(filled)
    }
}

impl<R, C> Seek for OverlayReader<R, C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = resolve_seek(pos, self.position, self.total)?;
        Ok(self.position)
    }
}

/// Compute a seek target inside `[0, total]`.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, total: u64) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(p) => i128::from(p),
        SeekFrom::Current(d) => i128::from(current) + i128::from(d),
        SeekFrom::End(d) => i128::from(total) + i128::from(d),
    };

    if target < 0 || target > i128::from(total) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("seek to {} outside stream of length {}", target, total),
        ));
    }

    Ok(target as u64)
}

/// Length of a stream, leaving it positioned at 0.
pub(crate) fn stream_len<S: Seek + ?Sized>(stream: &mut S, what: &str) -> Result<u64> {
    use crate::error::IoResultExt;

    let len = stream
        .seek(SeekFrom::End(0))
        .io_context(|| format!("measuring {}", what))?;
    stream
        .seek(SeekFrom::Start(0))
        .io_context(|| format!("rewinding {}", what))?;
    Ok(len)
}
