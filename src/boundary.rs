//! Locating embed regions inside an image.
//!
//! A region is either a whole file (the placeholder files reserved for
//! ignition and ramdisk content) or a sub-span of a file found with a
//! marker regex (the kernel argument area in bootloader configs). Offsets
//! are always absolute within the image.

use regex::bytes::Regex;
use std::path::Path;

use crate::config::KARG_EMBED_AREA_PATTERN;
use crate::error::{IsoEditorError, Result};
use crate::iso::{IsoFilesystem, IsoImage};

/// A contiguous byte range of an image eligible for substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedRegion {
    pub file_path: String,
    pub offset: u64,
    pub length: u64,
}

impl EmbedRegion {
    /// First byte past the region.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// A named regex whose first capture group delimits a region.
#[derive(Debug, Clone)]
pub struct Marker {
    name: String,
    regex: Regex,
}

impl Marker {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| IsoEditorError::InvalidInput(format!("bad marker pattern: {}", e)))?;
        if regex.captures_len() < 2 {
            return Err(IsoEditorError::InvalidInput(format!(
                "marker pattern {:?} has no capture group",
                pattern
            )));
        }
        Ok(Self {
            name: name.into(),
            regex,
        })
    }

    /// The kernel argument embed area: a newline followed by `#` padding,
    /// just before `# COREOS_KARG_EMBED_AREA`.
    pub fn karg_embed_area() -> Result<Self> {
        Self::new("COREOS_KARG_EMBED_AREA", KARG_EMBED_AREA_PATTERN)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset and length of capture group 1 of the first match.
    fn locate(&self, data: &[u8]) -> Option<(u64, u64)> {
        let group = self.regex.captures(data)?.get(1)?;
        Some((group.start() as u64, group.len() as u64))
    }
}

/// Region covering the whole of `file_path`.
pub fn find_region(file_path: &str, image_path: &Path) -> Result<EmbedRegion> {
    let mut iso = IsoImage::open(image_path)?;
    find_region_in(&mut iso, file_path)
}

/// Region covering the marker's capture group inside `file_path`.
pub fn find_marker_region(
    file_path: &str,
    image_path: &Path,
    marker: &Marker,
) -> Result<EmbedRegion> {
    let mut iso = IsoImage::open(image_path)?;
    find_marker_region_in(&mut iso, file_path, marker, &image_path.display().to_string())
}

/// [`find_region`] against an already opened image.
pub fn find_region_in<F: IsoFilesystem + ?Sized>(iso: &mut F, file_path: &str) -> Result<EmbedRegion> {
    let extent = iso.lookup(file_path)?;
    let region = EmbedRegion {
        file_path: file_path.to_string(),
        offset: extent.offset(),
        length: extent.size,
    };

    tracing::debug!(
        path = %file_path,
        offset = region.offset,
        length = region.length,
        "Located file region"
    );
    Ok(region)
}

/// [`find_marker_region`] against an already opened image. `image` labels errors.
pub fn find_marker_region_in<F: IsoFilesystem + ?Sized>(
    iso: &mut F,
    file_path: &str,
    marker: &Marker,
    image: &str,
) -> Result<EmbedRegion> {
    let extent = iso.lookup(file_path)?;
    let data = iso.read_file(file_path)?;

    let (start, length) = marker.locate(&data).ok_or_else(|| {
        IsoEditorError::FormatIncompatible(format!(
            "failed to find {} in {} of {}",
            marker.name, file_path, image
        ))
    })?;

    let region = EmbedRegion {
        file_path: file_path.to_string(),
        offset: extent.offset() + start,
        length,
    };

    tracing::debug!(
        path = %file_path,
        marker = %marker.name,
        offset = region.offset,
        length = region.length,
        "Located marker region"
    );
    Ok(region)
}
