//! Composing an image with embedded content.
//!
//! An [`EmbedPlan`] is an ordered list of layers. [`compose_image`] resolves
//! every layer's region against the unmodified image, then wraps the image
//! stream in one overlay per region, in plan order:
//!
//! ```text
//! File(image) -> Overlay(layer 1) -> Overlay(layer 2) -> ... -> returned reader
//! ```
//!
//! Regions that overlap resolve in favour of the later layer.

pub mod ignition;
pub mod kargs;

pub use ignition::{find_ignition_target, IgnitionContent, IgnitionInfo, IgnitionTarget};
pub use kargs::{kargs_content, kargs_files, kargs_regions, parse_kernel_arguments, KargOperation, KernelArgument};

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use crate::boundary::{find_region_in, EmbedRegion};
use crate::config::{EditorConfig, RAMDISK_IMAGE_PATH};
use crate::error::{IoResultExt, IsoEditorError, Result};
use crate::iso::{IsoFilesystem, IsoImage};
use crate::overlay::{BoxedReader, Overlay, OverlayReader};

/// One kind of content to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedLayer {
    /// Ignition archive into the ignition embed area
    Ignition(IgnitionContent),
    /// Pre-built ramdisk archive into the custom ramdisk placeholder
    Ramdisk(Vec<u8>),
    /// Kernel arguments into every kernel argument embed area
    KernelArguments(Vec<KernelArgument>),
}

impl EmbedLayer {
    fn name(&self) -> &'static str {
        match self {
            Self::Ignition(_) => "ignition config",
            Self::Ramdisk(_) => "ramdisk image",
            Self::KernelArguments(_) => "kernel arguments",
        }
    }
}

/// Layers applied in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedPlan {
    layers: Vec<EmbedLayer>,
}

impl EmbedPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, layer: EmbedLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn ignition(self, content: IgnitionContent) -> Self {
        self.layer(EmbedLayer::Ignition(content))
    }

    pub fn ramdisk(self, archive: Vec<u8>) -> Self {
        self.layer(EmbedLayer::Ramdisk(archive))
    }

    pub fn kernel_arguments(self, args: Vec<KernelArgument>) -> Self {
        self.layer(EmbedLayer::KernelArguments(args))
    }

    pub fn layers(&self) -> &[EmbedLayer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Content placed at a resolved region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedContent {
    pub region: EmbedRegion,
    pub content: Vec<u8>,
}

impl PlacedContent {
    fn into_overlay(self) -> Overlay<Cursor<Vec<u8>>> {
        Overlay::from_bytes(self.content, self.region.offset)
    }
}

/// Resolve every layer to concrete bytes at concrete offsets, in plan order.
///
/// Content that does not fit its region fails with
/// [`CapacityExceeded`](IsoEditorError::CapacityExceeded). Archives are
/// zero-padded to fill their region; kernel arguments cover only their own
/// length so the rest of the padding stays a comment.
pub fn place_layers<F: IsoFilesystem + ?Sized>(
    iso: &mut F,
    image: &str,
    plan: &EmbedPlan,
    config: &EditorConfig,
) -> Result<Vec<PlacedContent>> {
    let mut placed = Vec::new();

    for layer in plan.layers() {
        match layer {
            EmbedLayer::Ignition(content) => {
                let target = find_ignition_target(iso, image)?;
                let archive = content.archive_with_level(config.gzip_level)?;
                placed.push(fill_region(target.region, archive, layer.name())?);
            }
            EmbedLayer::Ramdisk(archive) => {
                let region = find_region_in(iso, RAMDISK_IMAGE_PATH)?;
                placed.push(fill_region(region, archive.clone(), layer.name())?);
            }
            EmbedLayer::KernelArguments(args) => {
                let content = kargs_content(args)?;
                for region in kargs_regions(iso, image)? {
                    check_capacity(&region, content.len() as u64, layer.name())?;
                    placed.push(PlacedContent {
                        region,
                        content: content.clone(),
                    });
                }
            }
        }
    }

    Ok(placed)
}

/// Open `image_path` and overlay every layer of `plan` on it.
///
/// The returned stream has the same length as the image; the image file
/// itself is never written.
pub fn compose_image(image_path: &Path, plan: &EmbedPlan, config: &EditorConfig) -> Result<BoxedReader> {
    let image = image_path.display().to_string();
    let mut iso = IsoImage::open(image_path)?;
    let placed = place_layers(&mut iso, &image, plan, config)?;

    let file = File::open(image_path).io_context(|| format!("opening {}", image))?;
    compose(Box::new(file), placed)
}

/// Chain one overlay per placement over `base`.
pub fn compose(base: BoxedReader, placed: Vec<PlacedContent>) -> Result<BoxedReader> {
    let mut reader = base;
    for p in placed {
        tracing::info!(
            path = %p.region.file_path,
            offset = p.region.offset,
            size = p.content.len(),
            "Embedding content"
        );
        reader = Box::new(OverlayReader::new(reader, p.into_overlay())?);
    }
    Ok(reader)
}

fn check_capacity(region: &EmbedRegion, size: u64, what: &str) -> Result<()> {
    if size > region.length {
        return Err(IsoEditorError::CapacityExceeded {
            what: format!("{} for {}", what, region.file_path),
            size,
            capacity: region.length,
        });
    }
    Ok(())
}

pub(crate) fn fill_region(region: EmbedRegion, mut content: Vec<u8>, what: &str) -> Result<PlacedContent> {
    check_capacity(&region, content.len() as u64, what)?;
    content.resize(region.length as usize, 0);
    Ok(PlacedContent { region, content })
}
