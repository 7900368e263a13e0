//! Cutting single files out of a composed image.
//!
//! A file's extent is looked up in the unmodified image and the same range
//! is read from the composed stream. When new content outgrows the file the
//! range is extended, the result is flagged as expanded, and any metadata
//! that recorded the old size has to be shipped alongside it.

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::artifact::initramfs::patch_initrd_addrsize;
use crate::boundary::find_region_in;
use crate::config::{EditorConfig, IGNITION_INFO_PATH, INITRAMFS_PATH, INITRD_ADDRSIZE_PATH};
use crate::embed::{
    compose, fill_region, find_ignition_target, place_layers, EmbedPlan, IgnitionContent,
    IgnitionInfo, IgnitionTarget, KernelArgument,
};
use crate::error::{IoResultExt, Result};
use crate::iso::{IsoFilesystem, IsoImage};
use crate::overlay::BoxedReader;
use crate::stream::{AppendReader, SectionReader};

/// One standalone output file.
pub struct FileData {
    /// Path of the file inside the image
    pub filename: String,
    pub data: BoxedReader,
    pub length: u64,
}

impl FileData {
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            length: bytes.len() as u64,
            data: Box::new(Cursor::new(bytes)),
        }
    }

    /// Read the whole file into memory.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.length as usize);
        self.data
            .read_to_end(&mut out)
            .io_context(|| format!("reading {}", self.filename))?;
        Ok(out)
    }
}

impl std::fmt::Debug for FileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileData")
            .field("filename", &self.filename)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Read `file_path`'s range of the original image out of `composed`.
///
/// The range is `max(original length, min_length)` long; the flag reports
/// whether `min_length` won.
pub fn isolate_file<R>(image_path: &Path, file_path: &str, composed: R, min_length: u64) -> Result<(FileData, bool)>
where
    R: Read + Seek + Send + 'static,
{
    let mut iso = IsoImage::open(image_path)?;
    isolate_file_in(&mut iso, file_path, composed, min_length)
}

/// [`isolate_file`] against an already opened image.
pub fn isolate_file_in<F, R>(iso: &mut F, file_path: &str, composed: R, min_length: u64) -> Result<(FileData, bool)>
where
    F: IsoFilesystem + ?Sized,
    R: Read + Seek + Send + 'static,
{
    let region = find_region_in(iso, file_path)?;
    let expanded = min_length > region.length;
    let length = region.length.max(min_length);

    Ok((
        FileData {
            filename: file_path.to_string(),
            data: Box::new(SectionReader::new(composed, region.offset, length)),
            length,
        },
        expanded,
    ))
}

/// The file holding the ignition area, with `content` embedded.
///
/// Unlike whole-image embedding, an archive larger than the area is
/// accepted here: the file grows, and the output also carries a rewritten
/// `igninfo.json` and, when the grown file is the initramfs, a patched
/// `initrd.addrsize`.
pub fn ignition_image_files(
    image_path: &Path,
    content: &IgnitionContent,
    config: &EditorConfig,
) -> Result<Vec<FileData>> {
    let image = image_path.display().to_string();
    let mut iso = IsoImage::open(image_path)?;
    let target = find_ignition_target(&mut iso, &image)?;
    let archive = content.archive_with_level(config.gzip_level)?;
    let archive_len = archive.len() as u64;
    let file = File::open(image_path).io_context(|| format!("opening {}", image))?;

    if archive_len <= target.region.length {
        let placed = fill_region(target.region.clone(), archive, "ignition config")?;
        let composed = compose(Box::new(file), vec![placed])?;
        let (data, _) = isolate_file_in(&mut iso, &target.file.file_path, composed, 0)?;
        return Ok(vec![data]);
    }

    tracing::info!(
        file = %target.file.file_path,
        area = target.region.length,
        archive = archive_len,
        "Ignition archive exceeds embed area, expanding"
    );
    let mut data = expanded_file(&target, file, archive)?;

    let info = IgnitionInfo {
        file: target.file.file_path.trim_start_matches('/').to_string(),
        offset: target.offset_in_file(),
        length: Some(archive_len),
    };
    let mut extra = vec![FileData::from_bytes(IGNITION_INFO_PATH, info.to_json()?)];

    if target.file.file_path.eq_ignore_ascii_case(INITRAMFS_PATH) {
        match iso.read_file(INITRD_ADDRSIZE_PATH) {
            Ok(original) => {
                let patched = patch_initrd_addrsize(&original[..], &mut data.data)?;
                extra.push(FileData::from_bytes(INITRD_ADDRSIZE_PATH, patched));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    let mut files = vec![data];
    files.append(&mut extra);
    Ok(files)
}

/// The ignition file with its area replaced by `archive`:
///
/// ```text
/// [file start .. area start][archive][area end .. file end]
/// ```
fn expanded_file(target: &IgnitionTarget, image: File, archive: Vec<u8>) -> Result<FileData> {
    let (region, file) = (&target.region, &target.file);
    let tail_image = image
        .try_clone()
        .io_context(|| format!("reopening image for {}", file.file_path))?;
    let length = file.length - region.length + archive.len() as u64;

    let head = SectionReader::new(image, file.offset, target.offset_in_file());
    let tail = SectionReader::new(tail_image, region.end(), file.end() - region.end());
    let data = AppendReader::new(AppendReader::new(head, Cursor::new(archive))?, tail)?;

    Ok(FileData {
        filename: file.file_path.clone(),
        data: Box::new(data),
        length,
    })
}

/// Every kernel argument config file with `args` embedded.
pub fn kargs_files_data(
    image_path: &Path,
    args: &[KernelArgument],
    config: &EditorConfig,
) -> Result<Vec<FileData>> {
    let image = image_path.display().to_string();
    let mut iso = IsoImage::open(image_path)?;
    let plan = EmbedPlan::new().kernel_arguments(args.to_vec());

    let mut files = Vec::new();
    for placed in place_layers(&mut iso, &image, &plan, config)? {
        let path = placed.region.file_path.clone();
        let file = File::open(image_path).io_context(|| format!("opening {}", image))?;
        let composed = compose(Box::new(file), vec![placed])?;
        let (data, _) = isolate_file_in(&mut iso, &path, composed, 0)?;
        files.push(data);
    }
    Ok(files)
}
