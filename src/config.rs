//! Image layout constants and runtime configuration.
//!
//! The paths below are fixed by the installer image build. Kernel argument
//! fallbacks in particular must stay exactly as they are: images that predate
//! `kargs.json` only carry the marker in these two files.
//!
//! # Example
//!
//! ```rust
//! use isoeditor::config::EditorConfig;
//!
//! let config = EditorConfig::default();
//! assert_eq!(config.gzip_level, 6);
//! ```

use std::env;
use std::path::PathBuf;

use crate::error::{IsoEditorError, Result};

/// Placeholder file holding the ignition embed area.
pub const IGNITION_IMAGE_PATH: &str = "/images/ignition.img";
/// Placeholder file for a custom ramdisk.
pub const RAMDISK_IMAGE_PATH: &str = "/images/assisted_installer_custom.img";
/// Describes an ignition area nested inside another file.
pub const IGNITION_INFO_PATH: &str = "/coreos/igninfo.json";
/// Lists the config files carrying the kernel argument embed area.
pub const KARGS_CONFIG_PATH: &str = "/coreos/kargs.json";
/// Kernel argument file used when `kargs.json` is absent.
pub const DEFAULT_GRUB_CONFIG_PATH: &str = "/EFI/redhat/grub.cfg";
/// Kernel argument file used when `kargs.json` is absent.
pub const DEFAULT_ISOLINUX_CONFIG_PATH: &str = "/isolinux/isolinux.cfg";
/// PXE initramfs shipped inside the ISO.
pub const INITRAMFS_PATH: &str = "/images/pxeboot/initrd.img";
/// Address/size descriptor for the initramfs on platforms that load it by address.
pub const INITRD_ADDRSIZE_PATH: &str = "/images/initrd.addrsize";

/// Name of the ignition config inside the ignition archive.
pub const IGNITION_CONFIG_NAME: &str = "config.ign";
/// Directory for system configs inside the ignition archive.
pub const SYSTEM_CONFIG_DIR: &str = "usr/lib/ignition/base.d";
/// Location of nmstatectl inside the nmstate ramdisk.
pub const NMSTATECTL_RAMDISK_PATH: &str = "usr/bin/nmstatectl";

/// Kernel argument embed area marker. Group 1 is the embed region.
pub const KARG_EMBED_AREA_PATTERN: &str = r"(\n#*)# COREOS_KARG_EMBED_AREA";

/// Default gzip level for generated archives.
pub const DEFAULT_GZIP_LEVEL: u32 = 6;

const WORKDIR_ENV: &str = "ISOEDITOR_WORKDIR";
const GZIP_LEVEL_ENV: &str = "ISOEDITOR_GZIP_LEVEL";

/// Runtime settings that are not part of the image layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    /// Scratch directory for external extraction tools
    pub workdir: PathBuf,
    /// Gzip level (0-9) for generated archives
    pub gzip_level: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            workdir: env::temp_dir(),
            gzip_level: DEFAULT_GZIP_LEVEL,
        }
    }
}

impl EditorConfig {
    /// Build configuration from `ISOEDITOR_WORKDIR` and `ISOEDITOR_GZIP_LEVEL`,
    /// falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(WORKDIR_ENV).filter(|d| !d.is_empty()) {
            config.workdir = PathBuf::from(dir);
        }

        if let Some(level) = lookup(GZIP_LEVEL_ENV) {
            config.gzip_level = parse_gzip_level(&level)?;
        }

        Ok(config)
    }
}

fn parse_gzip_level(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(level) if level <= 9 => Ok(level),
        _ => Err(IsoEditorError::InvalidInput(format!(
            "{} must be between 0 and 9, got {:?}",
            GZIP_LEVEL_ENV, value
        ))),
    }
}
