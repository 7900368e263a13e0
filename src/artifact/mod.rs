//! Payloads built for embedding.
//!
//! - `cpio` - gzipped newc archives assembled in memory
//! - `initramfs` - an initramfs with an ignition archive appended, and the
//!   matching `initrd.addrsize`
//! - `nmstate` - a ramdisk carrying `nmstatectl` from a rootfs image

pub mod cpio;
pub mod initramfs;
pub mod nmstate;

pub use self::cpio::{build_cpio, build_cpio_with_level, CpioEntry};
pub use initramfs::{new_initramfs_append_reader, patch_initrd_addrsize};
pub use nmstate::NmstateHandler;
