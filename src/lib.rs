//! Virtual ISO/initramfs editor library.
//!
//! Embeds ignition configs, ramdisks and kernel arguments into CoreOS
//! installer images without rewriting them. Every edit is a byte-range
//! substitution over the read-only source image, exposed as a
//! `Read + Seek` stream the caller can serve or persist.
//!
//! # Layers
//!
//! ```text
//! iso        path -> extent lookup
//! boundary   path or marker -> EmbedRegion
//! overlay    base stream + substituted range
//! embed      EmbedPlan -> chained overlays over an image
//! isolate    single files cut out of a composed image
//! artifact   CPIO archives, initramfs append, nmstate ramdisk
//! ```

pub mod artifact;
pub mod boundary;
pub mod config;
pub mod embed;
pub mod error;
pub mod iso;
pub mod isolate;
pub mod overlay;
pub mod preflight;
pub mod process;
pub mod stream;

#[cfg(test)]
mod testutil;

pub use boundary::{find_marker_region, find_region, EmbedRegion, Marker};
pub use embed::{compose_image, EmbedLayer, EmbedPlan, IgnitionContent, KernelArgument};
pub use error::{IsoEditorError, Result};
pub use isolate::{ignition_image_files, isolate_file, kargs_files_data, FileData};
pub use overlay::{Overlay, OverlayReader};
